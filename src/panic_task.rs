//! Recurring panic-alert tasks
//!
//! One cancellable recurring broadcast per speaker. The task re-reads the
//! current payload on every iteration rather than a captured snapshot,
//! which is what lets `update` change the broadcast location without
//! restarting the iteration count. Cancellation is cooperative: the cancel
//! flag is checked before each send and raced against each sleep.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::config::PanicConfig;
use crate::intent::Coords;
use crate::relay::AlertTransport;

/// The two panic flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicKind {
    Coordinates,
    Dungeon,
}

/// Live payload of a running panic; mutable in place while the task runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanicPayload {
    Coordinates {
        coords: Coords,
        direction: Option<String>,
    },
    Dungeon {
        /// Display label, e.g. "Inferno level 2"
        label: String,
    },
}

impl PanicPayload {
    #[must_use]
    pub const fn kind(&self) -> PanicKind {
        match self {
            Self::Coordinates { .. } => PanicKind::Coordinates,
            Self::Dungeon { .. } => PanicKind::Dungeon,
        }
    }

    fn activation_line(&self, speaker: &str) -> String {
        match self {
            Self::Coordinates { coords, direction } => match direction {
                Some(d) => format!("PANIC ACTIVATED at {coords} by {speaker} (moving {d})!"),
                None => format!("PANIC ACTIVATED at {coords} by {speaker}!"),
            },
            Self::Dungeon { label } => format!("{speaker} is panicking in {label}!"),
        }
    }

    fn alert_line(&self, speaker: &str) -> String {
        match self {
            Self::Coordinates { coords, direction } => match direction {
                Some(d) => format!("{speaker} is panicking at {coords} (moving {d})"),
                None => format!("{speaker} is panicking at {coords}"),
            },
            Self::Dungeon { label } => format!("{speaker} is panicking in {label}!"),
        }
    }

    fn update_line(&self, speaker: &str) -> String {
        match self {
            Self::Coordinates { coords, direction } => match direction {
                Some(d) => format!("{speaker} updated panic location to {coords} (moving {d})"),
                None => format!("{speaker} updated panic location to {coords}"),
            },
            Self::Dungeon { label } => format!("{speaker} moved deeper in {label}."),
        }
    }
}

struct PanicEntry {
    payload: Arc<RwLock<PanicPayload>>,
    cancel: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// Starts, updates, and cancels one recurring alert task per speaker
pub struct PanicTaskManager {
    entries: Mutex<HashMap<String, PanicEntry>>,
    transport: Arc<dyn AlertTransport>,
    cfg: PanicConfig,
}

impl PanicTaskManager {
    #[must_use]
    pub fn new(transport: Arc<dyn AlertTransport>, cfg: PanicConfig) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            transport,
            cfg,
        })
    }

    /// Whether a panic task is running for this speaker
    pub async fn is_active(&self, speaker: &str) -> bool {
        self.entries.lock().await.contains_key(speaker)
    }

    /// Kind of the running panic, if any
    pub async fn kind(&self, speaker: &str) -> Option<PanicKind> {
        let entries = self.entries.lock().await;
        let entry = entries.get(speaker)?;
        Some(entry.payload.read().await.kind())
    }

    /// Current payload of the running panic, if any
    pub async fn payload(&self, speaker: &str) -> Option<PanicPayload> {
        let entries = self.entries.lock().await;
        let entry = entries.get(speaker)?;
        Some(entry.payload.read().await.clone())
    }

    /// Start a panic for a speaker, implicitly stopping any prior one.
    pub async fn start(self: &Arc<Self>, speaker: &str, payload: PanicPayload) {
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.remove(speaker) {
            self.cancel_entry(speaker, previous).await;
        }

        tracing::info!(speaker, kind = ?payload.kind(), "panic activated");
        self.transport
            .broadcast(&payload.activation_line(speaker))
            .await;

        let payload = Arc::new(RwLock::new(payload));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = {
            let payload = Arc::clone(&payload);
            let transport = Arc::clone(&self.transport);
            let speaker = speaker.to_string();
            let interval = self.cfg.interval;
            let iterations = self.cfg.max_iterations;
            tokio::spawn(async move {
                for _ in 0..iterations {
                    if *cancel_rx.borrow() {
                        break;
                    }
                    let line = payload.read().await.alert_line(&speaker);
                    transport.broadcast(&line).await;
                    tokio::select! {
                        () = tokio::time::sleep(interval) => {}
                        _ = cancel_rx.changed() => break,
                    }
                }
            })
        };

        entries.insert(
            speaker.to_string(),
            PanicEntry {
                payload,
                cancel: cancel_tx,
                task,
            },
        );
    }

    /// Update the running panic's payload in place; behaves as `start` when
    /// no task is running. The running task picks up the new payload on its
    /// next iteration without resetting its count.
    pub async fn update(self: &Arc<Self>, speaker: &str, payload: PanicPayload) {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(speaker) {
                *entry.payload.write().await = payload.clone();
                tracing::debug!(speaker, "panic payload updated in place");
                self.transport.broadcast(&payload.update_line(speaker)).await;
                return;
            }
        }
        self.start(speaker, payload).await;
    }

    /// Stop the speaker's panic. A no-op (beyond a debug log) when none is
    /// active: nothing is sent, no state is touched.
    pub async fn stop(&self, speaker: &str) -> bool {
        let removed = self.entries.lock().await.remove(speaker);
        match removed {
            Some(entry) => {
                self.cancel_entry(speaker, entry).await;
                true
            }
            None => {
                tracing::debug!(speaker, "stop requested but no panic active");
                false
            }
        }
    }

    async fn cancel_entry(&self, speaker: &str, entry: PanicEntry) {
        // setting the flag precedes our own notice, so the task cannot
        // slip another alert in after the cancellation is visible
        let _ = entry.cancel.send(true);
        entry.task.abort();
        self.transport
            .broadcast(&format!("Panic canceled for {speaker}."))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        messages: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn all(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AlertTransport for RecordingTransport {
        async fn broadcast(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
    }

    fn manager(
        interval_ms: u64,
        max_iterations: u32,
    ) -> (Arc<PanicTaskManager>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let manager = PanicTaskManager::new(
            Arc::clone(&transport) as Arc<dyn AlertTransport>,
            PanicConfig {
                interval: Duration::from_millis(interval_ms),
                max_iterations,
            },
        );
        (manager, transport)
    }

    fn coords(x: u16, y: u16) -> Coords {
        Coords::new(x, y).unwrap()
    }

    #[tokio::test]
    async fn stop_without_active_panic_is_a_noop() {
        let (manager, transport) = manager(10, 5);

        assert!(!manager.stop("alice").await);
        assert!(transport.all().is_empty());
        assert!(!manager.is_active("alice").await);
    }

    #[tokio::test]
    async fn start_broadcasts_and_repeats() {
        let (manager, transport) = manager(20, 3);

        manager
            .start(
                "alice",
                PanicPayload::Coordinates {
                    coords: coords(3200, 2100),
                    direction: Some("east".into()),
                },
            )
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let messages = transport.all();
        assert_eq!(
            messages[0],
            "PANIC ACTIVATED at 3200 2100 by alice (moving east)!"
        );
        // three recurring alerts after the activation line
        assert_eq!(messages.len(), 4);
        assert!(messages[1].contains("alice is panicking at 3200 2100"));
    }

    #[tokio::test]
    async fn update_changes_subsequent_broadcasts_in_place() {
        let (manager, transport) = manager(30, 10);

        manager
            .start(
                "alice",
                PanicPayload::Coordinates {
                    coords: coords(1000, 1000),
                    direction: None,
                },
            )
            .await;

        tokio::time::sleep(Duration::from_millis(45)).await;
        manager
            .update(
                "alice",
                PanicPayload::Coordinates {
                    coords: coords(2000, 2000),
                    direction: Some("north".into()),
                },
            )
            .await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.stop("alice").await;

        let messages = transport.all();
        assert!(messages.iter().any(|m| m.contains("panicking at 1000 1000")));
        assert!(
            messages
                .iter()
                .any(|m| m.contains("updated panic location to 2000 2000"))
        );
        assert!(
            messages
                .iter()
                .any(|m| m.contains("panicking at 2000 2000 (moving north)"))
        );
        // still the same task: payload swap did not restart it
        assert!(manager.payload("alice").await.is_none());
    }

    #[tokio::test]
    async fn update_without_task_behaves_as_start() {
        let (manager, transport) = manager(50, 2);

        manager
            .update("bob", PanicPayload::Dungeon { label: "Inferno level 2".into() })
            .await;

        assert!(manager.is_active("bob").await);
        assert_eq!(manager.kind("bob").await, Some(PanicKind::Dungeon));
        assert_eq!(transport.all()[0], "bob is panicking in Inferno level 2!");
    }

    #[tokio::test]
    async fn stop_halts_broadcasts_immediately() {
        let (manager, transport) = manager(30, 20);

        manager
            .start(
                "alice",
                PanicPayload::Coordinates {
                    coords: coords(500, 500),
                    direction: None,
                },
            )
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manager.stop("alice").await);

        let at_stop = transport.all().len();
        assert_eq!(transport.all().last().unwrap(), "Panic canceled for alice.");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.all().len(), at_stop);
        assert!(!manager.is_active("alice").await);
    }

    #[tokio::test]
    async fn restart_implicitly_stops_the_prior_task() {
        let (manager, transport) = manager(50, 20);

        manager
            .start(
                "alice",
                PanicPayload::Coordinates {
                    coords: coords(100, 100),
                    direction: None,
                },
            )
            .await;
        manager
            .start("alice", PanicPayload::Dungeon { label: "Pulma level 1".into() })
            .await;

        assert_eq!(manager.kind("alice").await, Some(PanicKind::Dungeon));
        let messages = transport.all();
        assert!(messages.contains(&"Panic canceled for alice.".to_string()));
    }

    #[tokio::test]
    async fn task_retires_after_max_iterations() {
        let (manager, transport) = manager(10, 2);

        manager
            .start(
                "alice",
                PanicPayload::Coordinates {
                    coords: coords(100, 100),
                    direction: None,
                },
            )
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // activation + exactly two alerts
        assert_eq!(transport.all().len(), 3);
    }
}
