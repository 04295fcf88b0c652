//! Per-speaker session scheduling
//!
//! A fixed one-second tick walks every speaker with buffered audio and
//! decides whether to preview the tail for a wake phrase, keep waiting, or
//! finalize the buffer and run it through the command pipeline. Finalization
//! runs on its own task; an in-progress marker keeps a slow transcription
//! from being re-entered on the next tick and keeps each speaker's
//! finalizations strictly ordered.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::audio::{self, AudioBufferStore};
use crate::config::{BufferConfig, WakeConfig};
use crate::events::EventBoard;
use crate::pipeline::CommandPipeline;
use crate::retry::{CommandOutcome, RetryDisposition, RetryEntry, RetryLedger};
use crate::wake::{WakeState, WakeWatch};

/// Wake and retry state plus the finalization guard, locked as a unit so a
/// tick and a completing finalization never observe each other half-applied.
pub struct Flow {
    pub wake: WakeWatch,
    pub retry: RetryLedger,
    in_progress: HashSet<String>,
}

impl Flow {
    #[must_use]
    pub fn new(wake: WakeWatch, retry: RetryLedger) -> Self {
        Self {
            wake,
            retry,
            in_progress: HashSet::new(),
        }
    }

    /// Apply a finished pipeline resolution to the wake and retry stores.
    pub fn record_outcome(
        &mut self,
        speaker: &str,
        outcome: CommandOutcome,
        pending: Option<crate::intent::IntentKind>,
        now: Instant,
    ) {
        match outcome {
            CommandOutcome::Indifferent | CommandOutcome::Success => {
                self.clear_retry_state(speaker, now);
            }
            CommandOutcome::Failure(response) => {
                match self.retry.record_failure(speaker, now, response, pending) {
                    RetryDisposition::Scheduled => {}
                    RetryDisposition::Exhausted => self.clear_retry_state(speaker, now),
                }
            }
        }
    }

    /// Drop retry state and re-arm a grace window so the trailing buffer is
    /// not immediately re-finalized.
    fn clear_retry_state(&mut self, speaker: &str, now: Instant) {
        self.retry.clear(speaker);
        self.wake.clear(speaker);
        self.wake.prime_after_clear(speaker, now);
    }
}

/// Decide whether a speaker's buffer is ready to finalize.
///
/// A hold window or a retry cooldown blocks outright. Otherwise the buffer
/// must clear a length floor, reduced when a retry is pending since
/// clarification answers run short, and any wake window must be older than
/// the wake timeout, meaning the speaker has stopped talking since the
/// trigger phrase.
#[must_use]
pub fn should_finalize(
    buffer_len: usize,
    wake: Option<&WakeState>,
    retry: Option<&RetryEntry>,
    buffers: &BufferConfig,
    wake_cfg: &WakeConfig,
    now: Instant,
) -> bool {
    if wake.is_some_and(|state| now < state.hold_until) {
        return false;
    }
    if retry.is_some_and(|entry| now < entry.cooldown_until) {
        return false;
    }

    let floor = if retry.is_some() {
        buffers.retry_finalize_floor_bytes
    } else {
        buffers.finalize_floor_bytes
    };
    if buffer_len <= floor {
        return false;
    }

    match wake {
        Some(state) => now.duration_since(state.watch_since) > wake_cfg.wake_timeout,
        None => true,
    }
}

/// The one-second tick driver
pub struct SessionScheduler {
    store: Arc<Mutex<AudioBufferStore>>,
    flow: Arc<Mutex<Flow>>,
    pipeline: Arc<CommandPipeline>,
    events: Arc<EventBoard>,
    buffers: BufferConfig,
    wake_cfg: WakeConfig,
}

impl SessionScheduler {
    #[must_use]
    pub fn new(
        store: Arc<Mutex<AudioBufferStore>>,
        flow: Arc<Mutex<Flow>>,
        pipeline: Arc<CommandPipeline>,
        events: Arc<EventBoard>,
        buffers: BufferConfig,
        wake_cfg: WakeConfig,
    ) -> Self {
        Self {
            store,
            flow,
            pipeline,
            events,
            buffers,
            wake_cfg,
        }
    }

    /// Drive the tick loop forever.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick(Instant::now()).await;
        }
    }

    /// One scheduling pass over all speakers with buffered audio.
    pub async fn tick(&self, now: Instant) {
        self.events.check_trigger(now).await;

        let speakers = self.store.lock().await.speakers();
        for speaker in speakers {
            self.tick_speaker(&speaker, now).await;
        }
    }

    async fn tick_speaker(&self, speaker: &str, now: Instant) {
        {
            let flow = self.flow.lock().await;
            if flow.in_progress.contains(speaker) {
                return;
            }
        }

        let buffer_len = self.store.lock().await.len(speaker);
        if buffer_len < self.buffers.min_buffer_bytes {
            return;
        }

        if buffer_len > self.buffers.preview_floor_bytes {
            self.preview(speaker, now).await;
        }

        let finalize = {
            let flow = self.flow.lock().await;
            if flow.retry.should_wait_for_retry(speaker, now) {
                return;
            }
            let wake = flow.wake.get(speaker);
            let retry = flow.retry.get(speaker);
            if wake.is_none() && retry.is_none() {
                // nobody asked for anything; let silence accumulate
                return;
            }
            should_finalize(buffer_len, wake, retry, &self.buffers, &self.wake_cfg, now)
        };

        if finalize {
            self.finalize(speaker).await;
        }
    }

    /// Non-destructive wake-phrase check over the buffer tail.
    async fn preview(&self, speaker: &str, now: Instant) {
        let tail = {
            let store = self.store.lock().await;
            store
                .peek_tail(speaker, self.buffers.preview_tail_bytes)
                .to_vec()
        };

        if self.pipeline.preview_heard_wake(&tail).await {
            let mut flow = self.flow.lock().await;
            // fresh wake phrase supersedes a stale retry
            flow.retry.clear(speaker);
            flow.wake.note_preview_heard(speaker, now);
        }
    }

    /// Pop the buffer and hand it to the pipeline on its own task.
    async fn finalize(&self, speaker: &str) {
        let Some(pcm) = self.store.lock().await.pop(speaker) else {
            return;
        };
        let pcm = audio::fade_in(pcm, self.buffers.fade_in_ms);

        let pending = {
            let mut flow = self.flow.lock().await;
            flow.in_progress.insert(speaker.to_string());
            // cleared eagerly, whatever transcription makes of the audio
            flow.wake.clear(speaker);
            flow.retry.get(speaker).and_then(|entry| entry.pending_intent)
        };

        tracing::debug!(speaker, bytes = pcm.len(), "finalizing buffer");

        let pipeline = Arc::clone(&self.pipeline);
        let flow = Arc::clone(&self.flow);
        let speaker = speaker.to_string();
        tokio::spawn(async move {
            let (outcome, next_pending) =
                pipeline.handle_utterance(&speaker, &pcm, pending).await;
            let mut flow = flow.lock().await;
            flow.record_outcome(&speaker, outcome, next_pending, Instant::now());
            flow.in_progress.remove(&speaker);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::retry::ResponseKind;

    fn buffers() -> BufferConfig {
        Config::default().buffers
    }

    fn wake_cfg() -> WakeConfig {
        Config::default().wake
    }

    fn retry_ledger() -> RetryLedger {
        RetryLedger::new(Config::default().retry)
    }

    fn flow() -> Flow {
        Flow::new(WakeWatch::new(Duration::from_millis(2500)), retry_ledger())
    }

    #[test]
    fn long_silent_buffer_finalizes() {
        let now = Instant::now();
        assert!(should_finalize(170_000, None, None, &buffers(), &wake_cfg(), now));
        assert!(!should_finalize(160_000, None, None, &buffers(), &wake_cfg(), now));
    }

    #[test]
    fn retry_lowers_the_floor() {
        let now = Instant::now();
        let mut ledger = retry_ledger();
        ledger.record_failure("alice", now, ResponseKind::Silent, None);
        let entry = ledger.get("alice").unwrap();

        let later = now + Duration::from_secs(3);
        assert!(should_finalize(
            100_000,
            None,
            Some(entry),
            &buffers(),
            &wake_cfg(),
            later
        ));
        // without the retry, 100k is under the floor
        assert!(!should_finalize(100_000, None, None, &buffers(), &wake_cfg(), later));
    }

    #[test]
    fn hold_window_blocks_regardless_of_length() {
        let now = Instant::now();
        let mut watch = WakeWatch::new(Duration::from_millis(2500));
        watch.note_preview_heard("alice", now);
        let state = watch.get("alice").unwrap();

        assert!(!should_finalize(
            500_000,
            Some(state),
            None,
            &buffers(),
            &wake_cfg(),
            now + Duration::from_secs(1)
        ));
    }

    #[test]
    fn wake_entry_requires_silence_since_trigger() {
        let now = Instant::now();
        let mut watch = WakeWatch::new(Duration::from_millis(2500));
        watch.note_preview_heard("alice", now);
        let state = watch.get("alice").unwrap();

        // held window passed but wake heard only 3s ago
        assert!(!should_finalize(
            200_000,
            Some(state),
            None,
            &buffers(),
            &wake_cfg(),
            now + Duration::from_secs(3)
        ));
        // 5s of silence since the trigger
        assert!(should_finalize(
            200_000,
            Some(state),
            None,
            &buffers(),
            &wake_cfg(),
            now + Duration::from_secs(5)
        ));
    }

    #[test]
    fn retry_cooldown_blocks_finalization() {
        let now = Instant::now();
        let mut ledger = retry_ledger();
        ledger.record_failure("alice", now, ResponseKind::Silent, None);
        let entry = ledger.get("alice").unwrap();

        assert!(!should_finalize(
            200_000,
            None,
            Some(entry),
            &buffers(),
            &wake_cfg(),
            now + Duration::from_millis(200)
        ));
        assert!(should_finalize(
            200_000,
            None,
            Some(entry),
            &buffers(),
            &wake_cfg(),
            now + Duration::from_millis(600)
        ));
    }

    #[test]
    fn success_clears_and_primes() {
        let mut flow = flow();
        let now = Instant::now();

        flow.retry.record_failure("alice", now, ResponseKind::Silent, None);
        flow.record_outcome("alice", CommandOutcome::Success, None, now);

        assert!(flow.retry.get("alice").is_none());
        // fresh grace window armed
        assert!(flow.wake.is_held("alice", now));
    }

    #[test]
    fn exhausted_retry_clears_state() {
        let mut flow = flow();
        let now = Instant::now();

        for i in 0..3 {
            flow.record_outcome(
                "alice",
                CommandOutcome::Failure(ResponseKind::Silent),
                None,
                now + Duration::from_secs(i * 3),
            );
        }
        assert!(flow.retry.get("alice").is_none());
    }
}
