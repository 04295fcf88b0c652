//! Scheduled event announcements
//!
//! A single global event slot: "announce X happening in N minutes" arms it,
//! the scheduler's tick checks it, and it fires (or is cancelled/started
//! manually) exactly once. A two-minute reminder goes out once per armed
//! event, guarded by the `warned` flag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::relay::{AlertTransport, SpeechSynth};

/// Lead time for the reminder broadcast
const WARN_LEAD: Duration = Duration::from_secs(120);

/// The armed event
#[derive(Debug, Clone)]
pub struct ActiveEvent {
    pub name: String,
    pub trigger_at: Instant,
    pub owner: String,
    /// Whether the two-minute reminder already fired
    pub warned: bool,
}

/// Owns the single scheduled-event slot
pub struct EventBoard {
    slot: Mutex<Option<ActiveEvent>>,
    transport: Arc<dyn AlertTransport>,
    synth: Arc<dyn SpeechSynth>,
}

impl EventBoard {
    #[must_use]
    pub fn new(transport: Arc<dyn AlertTransport>, synth: Arc<dyn SpeechSynth>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            transport,
            synth,
        })
    }

    /// Arm the event slot. A new announcement replaces any prior event.
    pub async fn announce(&self, owner: &str, name: &str, minutes: u64, now: Instant) {
        let event = ActiveEvent {
            name: name.to_string(),
            trigger_at: now + Duration::from_secs(minutes * 60),
            owner: owner.to_string(),
            warned: false,
        };
        tracing::info!(name, minutes, owner, "event scheduled");
        *self.slot.lock().await = Some(event);

        let line = format!("{name} starting in {minutes} minutes.");
        self.transport.broadcast(&line).await;
        self.synth.say(owner, &line).await;
    }

    /// Cancel the armed event; speaks back either way.
    pub async fn cancel(&self, speaker: &str) {
        let cleared = self.slot.lock().await.take();
        match cleared {
            Some(event) => {
                tracing::info!(name = %event.name, "event cancelled");
                self.transport
                    .broadcast(&format!("{} was cancelled.", event.name))
                    .await;
                self.synth
                    .say(speaker, &format!("{} was cancelled.", event.name))
                    .await;
            }
            None => {
                self.synth.say(speaker, "There is no event to cancel.").await;
            }
        }
    }

    /// Start the armed event immediately; speaks back either way.
    pub async fn start_now(&self, speaker: &str) {
        let cleared = self.slot.lock().await.take();
        match cleared {
            Some(event) => {
                tracing::info!(name = %event.name, "event started manually");
                self.transport
                    .broadcast(&format!("{} is starting now!", event.name))
                    .await;
                self.synth
                    .say(speaker, &format!("{} is starting now!", event.name))
                    .await;
            }
            None => {
                self.synth.say(speaker, "There is no event to start.").await;
            }
        }
    }

    /// Called once per scheduler tick: fire the event when due, or emit the
    /// two-minute reminder exactly once.
    pub async fn check_trigger(&self, now: Instant) {
        let mut slot = self.slot.lock().await;
        let Some(event) = slot.as_mut() else {
            return;
        };

        if now >= event.trigger_at {
            let name = event.name.clone();
            *slot = None;
            drop(slot);
            tracing::info!(name = %name, "event auto-started");
            self.transport.broadcast(&format!("{name} is starting now!")).await;
            return;
        }

        if !event.warned && event.trigger_at - now <= WARN_LEAD {
            event.warned = true;
            let name = event.name.clone();
            drop(slot);
            self.transport
                .broadcast(&format!("{name} starts in 2 minutes!"))
                .await;
        }
    }

    /// Current armed event, if any
    pub async fn current(&self) -> Option<ActiveEvent> {
        self.slot.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct Recording {
        lines: std::sync::Mutex<Vec<String>>,
    }

    impl Recording {
        fn all(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AlertTransport for Recording {
        async fn broadcast(&self, text: &str) {
            self.lines.lock().unwrap().push(format!("cast:{text}"));
        }
    }

    #[async_trait]
    impl SpeechSynth for Recording {
        async fn say(&self, speaker: &str, text: &str) {
            self.lines.lock().unwrap().push(format!("say:{speaker}:{text}"));
        }
    }

    fn board() -> (Arc<EventBoard>, Arc<Recording>) {
        let recording = Arc::new(Recording::default());
        let board = EventBoard::new(
            Arc::clone(&recording) as Arc<dyn AlertTransport>,
            Arc::clone(&recording) as Arc<dyn SpeechSynth>,
        );
        (board, recording)
    }

    #[tokio::test]
    async fn announce_arms_and_notifies() {
        let (board, recording) = board();
        let now = Instant::now();

        board.announce("alice", "Ocean Boss", 10, now).await;

        let event = board.current().await.unwrap();
        assert_eq!(event.name, "Ocean Boss");
        assert_eq!(event.trigger_at, now + Duration::from_secs(600));
        assert!(!event.warned);

        let lines = recording.all();
        assert_eq!(lines[0], "cast:Ocean Boss starting in 10 minutes.");
        assert_eq!(lines[1], "say:alice:Ocean Boss starting in 10 minutes.");
    }

    #[tokio::test]
    async fn trigger_fires_once_when_due() {
        let (board, recording) = board();
        let now = Instant::now();

        board.announce("alice", "Corpse Creek", 5, now).await;
        board.check_trigger(now + Duration::from_secs(299)).await;
        assert!(board.current().await.is_some());

        board.check_trigger(now + Duration::from_secs(300)).await;
        assert!(board.current().await.is_none());
        assert!(
            recording
                .all()
                .contains(&"cast:Corpse Creek is starting now!".to_string())
        );

        // slot is empty; further ticks are silent
        let count = recording.all().len();
        board.check_trigger(now + Duration::from_secs(301)).await;
        assert_eq!(recording.all().len(), count);
    }

    #[tokio::test]
    async fn two_minute_warning_fires_exactly_once() {
        let (board, recording) = board();
        let now = Instant::now();

        board.announce("alice", "Ocean Boss", 5, now).await;

        board.check_trigger(now + Duration::from_secs(100)).await;
        assert!(!recording.all().iter().any(|l| l.contains("2 minutes")));

        board.check_trigger(now + Duration::from_secs(181)).await;
        board.check_trigger(now + Duration::from_secs(182)).await;
        let warnings = recording
            .all()
            .iter()
            .filter(|l| l.contains("starts in 2 minutes"))
            .count();
        assert_eq!(warnings, 1);
        assert!(board.current().await.unwrap().warned);
    }

    #[tokio::test]
    async fn cancel_and_start_clear_the_slot() {
        let (board, recording) = board();
        let now = Instant::now();

        board.announce("alice", "Ocean Boss", 5, now).await;
        board.cancel("bob").await;
        assert!(board.current().await.is_none());
        assert!(
            recording
                .all()
                .contains(&"cast:Ocean Boss was cancelled.".to_string())
        );

        board.cancel("bob").await;
        assert!(
            recording
                .all()
                .contains(&"say:bob:There is no event to cancel.".to_string())
        );

        board.announce("alice", "Ocean Boss", 5, now).await;
        board.start_now("alice").await;
        assert!(board.current().await.is_none());
        assert!(
            recording
                .all()
                .contains(&"cast:Ocean Boss is starting now!".to_string())
        );
    }
}
