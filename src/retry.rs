//! Retry/backoff state for unresolved commands
//!
//! When intent extraction fails on speech that was clearly addressed to the
//! assistant, the speaker is re-prompted and gets a bounded window to answer.
//! One entry per speaker; cleared on success, on indifference, or when the
//! attempt or elapsed-time limit is hit (abandoned silently, never escalated).

use std::collections::HashMap;
use std::time::Instant;

use crate::config::RetryConfig;
use crate::intent::IntentKind;

/// Whether a dispatch spoke back to the user. A spoken re-prompt earns a
/// longer retry delay because the user needs time to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// A reply was spoken or sent to the user
    Responded,
    /// Action taken (or failed) without prompting the user
    Silent,
}

/// Outcome of one finalized buffer's resolution cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// No wake word / nothing actionable; never retried
    Indifferent,
    /// Command fully resolved
    Success,
    /// Speech was present but fields could not be resolved
    Failure(ResponseKind),
}

/// What became of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// A (re)try is scheduled
    Scheduled,
    /// The episode hit its attempt or elapsed limit and was dropped
    Exhausted,
}

/// Per-speaker retry episode
#[derive(Debug, Clone)]
pub struct RetryEntry {
    /// Failed resolution cycles so far (starts at 1)
    pub attempts: u32,
    /// First failure in this episode
    pub started_at: Instant,
    /// No finalization is attempted before this
    pub next_retry_at: Instant,
    /// Guard window against finalizing an echo of the same utterance
    pub cooldown_until: Instant,
    /// The unresolved intent; routes the next buffer straight to its
    /// resolver, skipping re-classification
    pub pending_intent: Option<IntentKind>,
}

/// Backoff/attempt state for all speakers
#[derive(Debug)]
pub struct RetryLedger {
    entries: HashMap<String, RetryEntry>,
    cfg: RetryConfig,
}

impl RetryLedger {
    #[must_use]
    pub fn new(cfg: RetryConfig) -> Self {
        Self {
            entries: HashMap::new(),
            cfg,
        }
    }

    /// True if a retry is pending and its backoff delay has not elapsed
    #[must_use]
    pub fn should_wait_for_retry(&self, speaker: &str, now: Instant) -> bool {
        self.entries
            .get(speaker)
            .is_some_and(|entry| now < entry.next_retry_at)
    }

    /// Current entry for a speaker, if any
    #[must_use]
    pub fn get(&self, speaker: &str) -> Option<&RetryEntry> {
        self.entries.get(speaker)
    }

    /// Drop any entry for a speaker
    pub fn clear(&mut self, speaker: &str) {
        self.entries.remove(speaker);
    }

    /// Record a failed resolution cycle.
    ///
    /// First failure starts an episode; subsequent failures reschedule until
    /// the attempt cap or the elapsed-time limit clears the entry.
    pub fn record_failure(
        &mut self,
        speaker: &str,
        now: Instant,
        response: ResponseKind,
        pending_intent: Option<IntentKind>,
    ) -> RetryDisposition {
        let delay = match response {
            ResponseKind::Responded => self.cfg.responded_delay,
            ResponseKind::Silent => self.cfg.silent_delay,
        };

        if let Some(entry) = self.entries.get_mut(speaker) {
            let elapsed = now.duration_since(entry.started_at);
            if entry.attempts >= self.cfg.max_attempts || elapsed > self.cfg.max_elapsed {
                tracing::info!(
                    speaker,
                    attempts = entry.attempts,
                    elapsed_secs = elapsed.as_secs(),
                    "retry exhausted, abandoning"
                );
                self.entries.remove(speaker);
                return RetryDisposition::Exhausted;
            }
            entry.attempts += 1;
            entry.next_retry_at = now + delay;
            if pending_intent.is_some() {
                entry.pending_intent = pending_intent;
            }
            tracing::debug!(speaker, attempts = entry.attempts, "retry rescheduled");
        } else {
            self.entries.insert(
                speaker.to_string(),
                RetryEntry {
                    attempts: 1,
                    started_at: now,
                    next_retry_at: now + delay,
                    cooldown_until: now + self.cfg.cooldown,
                    pending_intent,
                },
            );
            tracing::debug!(speaker, ?pending_intent, "retry episode started");
        }

        RetryDisposition::Scheduled
    }
}
