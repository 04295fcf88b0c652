//! Scheduler tick integration tests
//!
//! Drives the tick loop by hand with controlled clocks and scripted
//! collaborators: buffers accumulate, wake previews hold, retries gate,
//! and finalization hands off to the pipeline exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use vigil_gateway::classify::Classifier;
use vigil_gateway::config::{Config, PanicConfig};
use vigil_gateway::intent::{Detection, IntentKind};
use vigil_gateway::model_tier::{ModelTier, TierHandle};
use vigil_gateway::panic_task::PanicTaskManager;
use vigil_gateway::relay::{AlertTransport, SpeechSynth};
use vigil_gateway::retry::ResponseKind;
use vigil_gateway::stt::Transcriber;
use vigil_gateway::{
    AudioBufferStore, CommandPipeline, EventBoard, Flow, RetryLedger, SessionScheduler, WakeWatch,
};

mod common;
use common::{CountingClassifier, RecordingSynth, RecordingTransport, ScriptedTranscriber};

struct Harness {
    scheduler: SessionScheduler,
    store: Arc<Mutex<AudioBufferStore>>,
    flow: Arc<Mutex<Flow>>,
    transcriber: Arc<ScriptedTranscriber>,
    transport: Arc<RecordingTransport>,
    panics: Arc<PanicTaskManager>,
    events: Arc<EventBoard>,
}

fn harness(lines: &[&str]) -> Harness {
    let cfg = Config::default();
    let transcriber = Arc::new(ScriptedTranscriber::new(lines));
    let classifier = Arc::new(CountingClassifier::returning(Detection::of(
        IntentKind::Unknown,
    )));
    let transport = Arc::new(RecordingTransport::default());
    let synth = Arc::new(RecordingSynth::default());

    let transport_dyn: Arc<dyn AlertTransport> = Arc::clone(&transport) as _;
    let synth_dyn: Arc<dyn SpeechSynth> = Arc::clone(&synth) as _;

    let panics = PanicTaskManager::new(
        Arc::clone(&transport_dyn),
        PanicConfig {
            interval: Duration::from_millis(50),
            max_iterations: 3,
        },
    );
    let events = EventBoard::new(Arc::clone(&transport_dyn), synth_dyn.clone());

    let pipeline = CommandPipeline::new(
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        classifier as Arc<dyn Classifier>,
        transport_dyn,
        synth_dyn,
        TierHandle::new(ModelTier::Primary),
        Arc::clone(&panics),
        Arc::clone(&events),
        cfg.wake.clone(),
        cfg.intent,
    );

    let store = Arc::new(Mutex::new(AudioBufferStore::new(
        cfg.buffers.max_buffer_bytes,
    )));
    let flow = Arc::new(Mutex::new(Flow::new(
        WakeWatch::new(cfg.wake.hold_buffer_time),
        RetryLedger::new(cfg.retry),
    )));

    let scheduler = SessionScheduler::new(
        Arc::clone(&store),
        Arc::clone(&flow),
        pipeline,
        Arc::clone(&events),
        cfg.buffers,
        cfg.wake,
    );

    Harness {
        scheduler,
        store,
        flow,
        transcriber,
        transport,
        panics,
        events,
    }
}

async fn append(h: &Harness, speaker: &str, bytes: usize, now: Instant) {
    h.store.lock().await.append(speaker, &vec![0u8; bytes], now);
}

/// Give a spawned finalization task time to complete.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn short_buffer_is_left_alone() {
    let h = harness(&["jarvis help"]);
    let now = Instant::now();

    append(&h, "alice", 50_000, now).await;
    h.scheduler.tick(now).await;
    settle().await;

    assert_eq!(h.transcriber.calls(), 0);
    assert_eq!(h.store.lock().await.len("alice"), 50_000);
}

#[tokio::test]
async fn silence_without_wake_or_retry_accumulates() {
    let h = harness(&["just chatting with friends"]);
    let now = Instant::now();

    append(&h, "alice", 200_000, now).await;
    h.scheduler.tick(now).await;
    settle().await;

    // the preview ran, found no wake phrase, and nothing was finalized
    assert_eq!(h.transcriber.calls(), 1);
    assert_eq!(h.store.lock().await.len("alice"), 200_000);
    assert!(h.transport.lines().is_empty());
}

#[tokio::test]
async fn wake_preview_holds_then_finalizes_after_silence() {
    let h = harness(&["jarvis", "", "jarvis help at 3220 2140"]);
    let t0 = Instant::now();

    append(&h, "alice", 200_000, t0).await;

    // preview hears the wake phrase and opens a hold window
    h.scheduler.tick(t0).await;
    settle().await;
    assert_eq!(h.store.lock().await.len("alice"), 200_000);
    assert!(h.flow.lock().await.wake.is_held("alice", t0));

    // 5s later the window has lapsed and the speaker has gone quiet
    h.scheduler.tick(t0 + Duration::from_secs(5)).await;
    settle().await;

    assert!(h.panics.is_active("alice").await);
    assert_eq!(h.store.lock().await.len("alice"), 0);
    assert!(h.transport.contains("3220 2140"));
}

#[tokio::test]
async fn hold_window_defers_even_past_the_floor() {
    let h = harness(&["jarvis", "jarvis"]);
    let t0 = Instant::now();

    append(&h, "alice", 300_000, t0).await;
    h.scheduler.tick(t0).await;
    settle().await;

    // one second later the hold is still open; no finalization
    h.scheduler.tick(t0 + Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(h.store.lock().await.len("alice"), 300_000);
}

#[tokio::test]
async fn retry_lowers_floor_and_routes_pending_intent() {
    let h = harness(&["3220 2140"]);
    let t0 = Instant::now();

    {
        let mut flow = h.flow.lock().await;
        flow.retry.record_failure(
            "alice",
            t0,
            ResponseKind::Responded,
            Some(IntentKind::CoordPanic),
        );
    }

    // 100k is under the normal floor but over the retry floor; small enough
    // that no preview runs, so the scripted line goes to the pipeline
    append(&h, "alice", 100_000, t0).await;
    h.scheduler.tick(t0 + Duration::from_secs(7)).await;
    settle().await;

    assert!(h.panics.is_active("alice").await);
    assert_eq!(h.store.lock().await.len("alice"), 0);
    // resolved; the retry is gone and a fresh grace window is armed
    let flow = h.flow.lock().await;
    assert!(flow.retry.get("alice").is_none());
}

#[tokio::test]
async fn retry_backoff_gates_finalization() {
    let h = harness(&["3220 2140"]);
    let t0 = Instant::now();

    {
        let mut flow = h.flow.lock().await;
        flow.retry
            .record_failure("alice", t0, ResponseKind::Responded, None);
    }

    append(&h, "alice", 100_000, t0).await;
    // 6s delay for a spoken re-prompt; 3s in, nothing may happen
    h.scheduler.tick(t0 + Duration::from_secs(3)).await;
    settle().await;

    assert_eq!(h.transcriber.calls(), 0);
    assert_eq!(h.store.lock().await.len("alice"), 100_000);
}

#[tokio::test]
async fn speakers_are_isolated() {
    let h = harness(&["jarvis help at 3220 2140", "whatever"]);
    let t0 = Instant::now();

    // bob's buffer is retry-eligible; alice is below every floor
    {
        let mut flow = h.flow.lock().await;
        flow.retry.record_failure(
            "bob",
            t0,
            ResponseKind::Silent,
            Some(IntentKind::CoordPanic),
        );
    }
    append(&h, "alice", 50_000, t0).await;
    append(&h, "bob", 100_000, t0).await;

    h.scheduler.tick(t0 + Duration::from_secs(3)).await;
    settle().await;

    assert_eq!(h.store.lock().await.len("alice"), 50_000);
    assert_eq!(h.store.lock().await.len("bob"), 0);
    assert!(h.panics.is_active("bob").await);
    assert!(!h.panics.is_active("alice").await);
}

#[tokio::test]
async fn tick_fires_event_trigger() {
    let h = harness(&[]);
    let t0 = Instant::now();

    h.events.announce("alice", "ocean boss", 3, t0).await;

    // two-minute warning fires exactly once
    h.scheduler.tick(t0 + Duration::from_secs(61)).await;
    h.scheduler.tick(t0 + Duration::from_secs(62)).await;
    let warnings = h
        .transport
        .lines()
        .iter()
        .filter(|line| line.contains("2 minutes"))
        .count();
    assert_eq!(warnings, 1);

    h.scheduler.tick(t0 + Duration::from_secs(181)).await;
    assert!(h.transport.contains("ocean boss is starting now!"));
    assert!(h.events.current().await.is_none());
}
