//! Wake-phrase watch state
//!
//! Tracks, per speaker, whether the wake phrase was recently heard in a
//! preview transcription and the resulting hold deadline during which
//! finalization is forbidden. Matching is fuzzy: transcripts regularly
//! mangle the phrase ("garvis", "jarbis"), so tokens are compared against
//! an alias set with an edit-distance cutoff.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::fuzzy;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z]+").expect("valid regex"));

/// Per-speaker wake window
#[derive(Debug, Clone, Copy)]
pub struct WakeState {
    /// When the wake phrase was first detected in the current window
    pub watch_since: Instant,
    /// Finalization is forbidden before this, regardless of silence
    pub hold_until: Instant,
}

/// Tracks wake windows for all speakers
#[derive(Debug)]
pub struct WakeWatch {
    entries: HashMap<String, WakeState>,
    hold_buffer_time: Duration,
}

impl WakeWatch {
    #[must_use]
    pub fn new(hold_buffer_time: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            hold_buffer_time,
        }
    }

    /// A preview transcription matched the wake phrase: open (or refresh)
    /// the watch window. The caller is responsible for clearing any pending
    /// retry for this speaker — a fresh wake phrase supersedes a stale retry.
    pub fn note_preview_heard(&mut self, speaker: &str, now: Instant) {
        tracing::debug!(speaker, "wake phrase heard in preview");
        self.entries.insert(
            speaker.to_string(),
            WakeState {
                watch_since: now,
                hold_until: now + self.hold_buffer_time,
            },
        );
    }

    /// True while the hold window forbids finalization
    #[must_use]
    pub fn is_held(&self, speaker: &str, now: Instant) -> bool {
        self.entries
            .get(speaker)
            .is_some_and(|state| now < state.hold_until)
    }

    /// Current wake state for a speaker, if any
    #[must_use]
    pub fn get(&self, speaker: &str) -> Option<&WakeState> {
        self.entries.get(speaker)
    }

    /// Remove wake state; called after any finalization and whenever retry
    /// state is cleared.
    pub fn clear(&mut self, speaker: &str) {
        self.entries.remove(speaker);
    }

    /// Re-arm a fresh grace window for a speaker whose retry state was just
    /// cleared, so the trailing buffer is not immediately re-finalized.
    pub fn prime_after_clear(&mut self, speaker: &str, now: Instant) {
        self.note_preview_heard(speaker, now);
    }
}

/// Fuzzy-detect the wake phrase in a transcript: any token matching one of
/// the alias spellings exactly, or with similarity at or above `cutoff`.
#[must_use]
pub fn heard_wake_phrase(text: &str, phrases: &[String], cutoff: f32) -> bool {
    let aliases: Vec<&str> = phrases.iter().map(String::as_str).collect();
    let lowered = text.to_lowercase();

    for token in WORD_RE.find_iter(&lowered) {
        if fuzzy::closest_match(token.as_str(), &aliases, cutoff).is_some() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> Vec<String> {
        vec!["jarvis".to_string(), "garvis".to_string()]
    }

    #[test]
    fn hold_window_tracks_deadline() {
        let mut watch = WakeWatch::new(Duration::from_millis(2500));
        let now = Instant::now();

        assert!(!watch.is_held("alice", now));

        watch.note_preview_heard("alice", now);
        assert!(watch.is_held("alice", now));
        assert!(watch.is_held("alice", now + Duration::from_millis(2499)));
        assert!(!watch.is_held("alice", now + Duration::from_millis(2500)));
    }

    #[test]
    fn clear_removes_state() {
        let mut watch = WakeWatch::new(Duration::from_millis(2500));
        let now = Instant::now();

        watch.note_preview_heard("alice", now);
        watch.clear("alice");
        assert!(watch.get("alice").is_none());
        assert!(!watch.is_held("alice", now));
    }

    #[test]
    fn prime_after_clear_rearms_window() {
        let mut watch = WakeWatch::new(Duration::from_millis(2500));
        let now = Instant::now();

        watch.prime_after_clear("alice", now);
        let state = watch.get("alice").unwrap();
        assert_eq!(state.watch_since, now);
        assert_eq!(state.hold_until, now + Duration::from_millis(2500));
    }

    #[test]
    fn exact_and_fuzzy_wake_detection() {
        assert!(heard_wake_phrase("hey jarvis help", &phrases(), 0.7));
        // close mishearing clears the cutoff
        assert!(heard_wake_phrase("hey jarviss", &phrases(), 0.7));
        assert!(heard_wake_phrase("Jarvis, announce it", &phrases(), 0.7));
        assert!(!heard_wake_phrase("the weather is nice", &phrases(), 0.7));
        assert!(!heard_wake_phrase("", &phrases(), 0.7));
    }
}
