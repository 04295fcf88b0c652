//! Dungeon name and level extraction
//!
//! The canonical dungeon list carries spoken aliases and a table of common
//! transcription mishearings, both with fuzzy fallbacks: full-phrase match
//! at one cutoff, per-word at a stricter one (both configurable).

use std::sync::LazyLock;

use regex::Regex;

use crate::config::IntentConfig;
use crate::fuzzy;

/// Canonical dungeon names with their spoken aliases
const DUNGEON_ALIASES: &[(&str, &[&str])] = &[
    ("Ossuary", &["ossuary", "ossuray"]),
    ("Inferno", &["inferno", "infero"]),
    ("Darkmire", &["darkmire", "dm"]),
    ("Aegis", &["aegis"]),
    ("Cavernam", &["cavernam", "cav"]),
    ("Kraul Hive", &["kraul hive", "kraul"]),
    ("Mount Petram", &["mount petram", "mount p", "mount"]),
    ("Nusero", &["nusero"]),
    ("Pulma", &["pulma"]),
    ("ShadowSpire Cathedral", &["shadowspire cathedral", "ssc"]),
    ("The Mausoleum", &["the mausoleum", "maus"]),
    ("Time Dungeon", &["time dungeon", "time"]),
];

/// Frequent transcription mishearings, mapped to the word actually said
const MISHEARINGS: &[(&str, &str)] = &[
    ("oceawary", "ossuary"),
    ("ossuray", "ossuary"),
    ("infero", "inferno"),
    ("cav", "cavernam"),
    ("mount p", "mount petram"),
    ("mount", "mount petram"),
    ("ssc", "shadowspire cathedral"),
    ("maus", "the mausoleum"),
    ("dm", "darkmire"),
];

/// Spoken ordinals for dungeon levels
const ORDINAL_LEVELS: &[(&str, &str)] = &[
    ("first", "1"),
    ("second", "2"),
    ("third", "3"),
    ("fourth", "4"),
    ("fifth", "5"),
    ("sixth", "6"),
    ("seventh", "7"),
    ("eighth", "8"),
];

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]+").expect("valid regex"));
static LEVEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"level\s*(\d)").expect("valid regex"));

fn all_aliases() -> Vec<&'static str> {
    DUNGEON_ALIASES
        .iter()
        .flat_map(|(_, aliases)| aliases.iter().copied())
        .collect()
}

fn canonical_for_alias(alias: &str) -> Option<&'static str> {
    DUNGEON_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&alias))
        .map(|(canon, _)| *canon)
}

/// Resolve a raw dungeon mention to its canonical name: exact alias first,
/// fuzzy fallback second.
#[must_use]
pub fn fuzzy_match_dungeon(raw: &str, word_cutoff: f32) -> Option<&'static str> {
    let raw = raw.to_lowercase();
    let raw = raw.trim();

    if let Some(canon) = canonical_for_alias(raw) {
        return Some(canon);
    }

    let aliases = all_aliases();
    fuzzy::closest_match(raw, &aliases, word_cutoff).and_then(canonical_for_alias)
}

/// Replace misheard words with the word most likely actually said.
/// Exact lookups first, fuzzy fallback against the mishearing table second.
#[must_use]
pub fn fuzzy_autocorrect(text: &str, word_cutoff: f32) -> String {
    let lowered = text.to_lowercase();
    let mishears: Vec<&str> = MISHEARINGS.iter().map(|(wrong, _)| *wrong).collect();

    let corrected: Vec<&str> = WORD_RE
        .find_iter(&lowered)
        .map(|m| {
            let word = m.as_str();
            if let Some((_, right)) = MISHEARINGS.iter().find(|(wrong, _)| *wrong == word) {
                return *right;
            }
            if let Some(close) = fuzzy::closest_match(word, &mishears, word_cutoff) {
                let (_, right) = MISHEARINGS
                    .iter()
                    .find(|(wrong, _)| *wrong == close)
                    .expect("close match came from the table");
                tracing::debug!(original = word, corrected = right, "autocorrected mishearing");
                return right;
            }
            // no change; borrow from the lowered text
            &lowered[m.range()]
        })
        .collect();

    corrected.join(" ")
}

/// Extract the dungeon level: "level 3" or a spoken ordinal ("third")
#[must_use]
pub fn extract_level(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();

    if let Some(captures) = LEVEL_RE.captures(&lowered) {
        return Some(captures[1].to_string());
    }
    ORDINAL_LEVELS
        .iter()
        .find(|(word, _)| lowered.contains(word))
        .map(|(_, digit)| (*digit).to_string())
}

/// Extract `(canonical dungeon, level)` from free text.
///
/// A full-sentence fuzzy match runs first (stricter than it sounds: the
/// whole utterance must resemble an alias, which catches short commands
/// like "maus three"), then a per-word fallback.
#[must_use]
pub fn extract_dungeon_and_level(text: &str, cfg: &IntentConfig) -> Option<(String, String)> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = WORD_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
    let joined = words.join(" ");

    let aliases = all_aliases();
    let mut matched = fuzzy::closest_match(&joined, &aliases, cfg.dungeon_phrase_cutoff)
        .and_then(canonical_for_alias);

    if matched.is_none() {
        for word in &words {
            if let Some(canon) =
                fuzzy::closest_match(word, &aliases, cfg.dungeon_word_cutoff)
                    .and_then(canonical_for_alias)
            {
                matched = Some(canon);
                break;
            }
        }
    }

    let level = extract_level(&lowered)?;
    matched.map(|dungeon| (dungeon.to_string(), level))
}

/// Autocorrect mishearings, then extract dungeon and level
#[must_use]
pub fn dungeon_from_text(text: &str, cfg: &IntentConfig) -> Option<(String, String)> {
    let corrected = fuzzy_autocorrect(text, cfg.dungeon_word_cutoff);
    extract_dungeon_and_level(&corrected, cfg)
}
