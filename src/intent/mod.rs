//! Layered intent detection
//!
//! An ordered chain of matchers, each returning a definite result or no
//! match: literal keyword rules, fuzzy keyword matching, then a bare
//! coordinate-pattern fallback. The external LLM classifier is the final
//! tier and lives behind the [`crate::classify::Classifier`] trait; the
//! pipeline invokes it only when everything here came up empty.
//!
//! The keyword tables are data, not branching code, so each tier can be
//! tested in isolation.

pub mod coords;
pub mod dungeon;

use crate::config::IntentConfig;
use crate::fuzzy;

pub use coords::{Coords, extract_coords, extract_direction};

/// Intent categories a command can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    /// Schedule an event announcement ("announce X happening in N minutes")
    AnnounceEvent,
    /// Cancel the scheduled event
    CancelEvent,
    /// Start the scheduled event immediately
    StartEvent,
    /// One-shot urgent broadcast
    RedAlert,
    /// Stop the speaker's recurring panic alert
    StopPanic,
    /// Start/update a coordinate-based panic alert
    CoordPanic,
    /// Report an unusual sighting (with vendor-location payload)
    Sighting,
    /// Start/update a dungeon-based panic alert
    DungeonPanic,
    /// Greet the assistant
    Greet,
    /// Nothing actionable
    Unknown,
}

/// A detected intent plus whatever fields were extracted alongside it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub kind: Option<IntentKind>,
    pub coords: Option<Coords>,
    pub direction: Option<String>,
    pub dungeon: Option<String>,
    pub level: Option<String>,
    pub event_name: Option<String>,
    pub minutes: Option<u64>,
}

impl Detection {
    /// A bare detection with just the kind set
    #[must_use]
    pub fn of(kind: IntentKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }
}

/// Keyword rules, checked in order; first hit wins. Multi-word keywords
/// only match as substrings, single words also match fuzzily per token.
const KEYWORD_RULES: &[(IntentKind, &[&str])] = &[
    (IntentKind::AnnounceEvent, &["announce", "happening in"]),
    (IntentKind::CancelEvent, &["cancel event"]),
    (IntentKind::StartEvent, &["start event"]),
    (IntentKind::RedAlert, &["red alert"]),
    (IntentKind::StopPanic, &["stop panic"]),
    (
        IntentKind::CoordPanic,
        &["help", "incoming", "attack", "enemy", "pushed", "danger"],
    ),
    (IntentKind::Sighting, &["ocean boss", "sea boss", "ocean", "boss"]),
    (IntentKind::DungeonPanic, &["dungeon", "level", "dungeons"]),
];

/// Phrases that stop an active panic regardless of other content
const STOP_PHRASES: &[&str] = &[
    "stop panic",
    "cancel panic",
    "end panic",
    "stand down",
    "disregard panic",
    "call off",
];

/// Whether the text is a stop-panic command
#[must_use]
pub fn is_stop_command(text: &str) -> bool {
    let lowered = text.to_lowercase();
    STOP_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Keyword tiers: literal substring first, then per-token fuzzy
#[must_use]
pub fn match_keyword_rules(text: &str, fuzzy_cutoff: f32) -> Option<IntentKind> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    for (kind, keywords) in KEYWORD_RULES {
        for keyword in *keywords {
            if lowered.contains(keyword) {
                return Some(*kind);
            }
            if !keyword.contains(' ')
                && fuzzy::closest_match(keyword, &tokens, fuzzy_cutoff).is_some()
            {
                return Some(*kind);
            }
        }
    }
    None
}

/// Run the local matcher tiers (keywords, then coordinate pattern).
///
/// Returns `None` when nothing matched and the external classifier should
/// take over.
#[must_use]
pub fn detect_local(text: &str, cfg: &IntentConfig) -> Option<Detection> {
    if let Some(kind) = match_keyword_rules(text, cfg.fuzzy_cutoff) {
        let mut detection = Detection::of(kind);
        match kind {
            IntentKind::CoordPanic => {
                detection.coords = extract_coords(text);
                detection.direction = extract_direction(text);
            }
            IntentKind::Sighting => {
                detection.coords = extract_coords(text);
            }
            IntentKind::DungeonPanic => {
                if let Some((dungeon, level)) = dungeon::dungeon_from_text(text, cfg) {
                    detection.dungeon = Some(dungeon);
                    detection.level = Some(level);
                }
            }
            _ => {}
        }
        return Some(detection);
    }

    // bare coordinates with no keyword still read as a coordinate panic
    extract_coords(text).map(|coords| {
        let mut detection = Detection::of(IntentKind::CoordPanic);
        detection.coords = Some(coords);
        detection.direction = extract_direction(text);
        detection
    })
}
