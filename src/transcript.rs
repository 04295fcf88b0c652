//! Transcript normalization
//!
//! STT output arrives with filler hallucinations ("we'll see you in the
//! next video"), comma-grouped numbers, and consistently misheard domain
//! words. Normalization runs before any intent matching; a junk match
//! empties the transcript so the caller treats it as indifferent.

use std::sync::LazyLock;

use regex::Regex;

/// Filler phrases the STT model hallucinates on near-silence; a verbatim
/// match discards the transcript entirely.
const JUNK_PHRASES: &[&str] = &[
    "we'll see you in the next video",
    "okay um let's see here",
    "hello was that going on",
    "okay um",
    "okay so",
    "we're trying to go to",
];

/// Misheard term corrections applied after junk filtering
const CORRECTIONS: &[(&str, &str)] = &[
    (r"\bpanning\b", "panic"),
    (r"\bpoma\b", "pulma"),
    (r"\bpulmy\b", "pulma"),
    (r"\bhoma\b", "pulma"),
    (r"\bauxuary\b", "ossuary"),
    (r"\bossawary\b", "ossuary"),
    (r"\beferno\b", "inferno"),
    (r"\baferna\b", "inferno"),
];

static NUMBER_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d),(\d{3})").expect("valid regex"));
static PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,;]").expect("valid regex"));
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));
static CORRECTION_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    CORRECTIONS
        .iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(&format!("(?i){pattern}")).expect("valid regex"),
                *replacement,
            )
        })
        .collect()
});

/// Normalize a raw transcript. Returns an empty string when the transcript
/// is junk.
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    for junk in JUNK_PHRASES {
        if lowered.contains(junk) {
            tracing::debug!(junk, "discarded filler transcript");
            return String::new();
        }
    }

    // "3,200 2,100" -> "3200 2100"
    let mut text = NUMBER_COMMA_RE.replace_all(text, "$1$2").into_owned();
    text = PUNCT_RE.replace_all(&text, " ").into_owned();
    text = SPACES_RE.replace_all(&text, " ").into_owned();

    for (re, replacement) in CORRECTION_RES.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }

    text.trim().to_string()
}
