//! Shared test utilities
#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use vigil_gateway::Result;
use vigil_gateway::classify::Classifier;
use vigil_gateway::intent::{Coords, Detection};
use vigil_gateway::model_tier::ModelTier;
use vigil_gateway::relay::{AlertTransport, SpeechSynth};
use vigil_gateway::stt::Transcriber;

/// Transcriber returning scripted lines in order, then empty strings
pub struct ScriptedTranscriber {
    lines: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    #[must_use]
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(ToString::to_string).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Total transcribe invocations, previews included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _pcm: &[u8], _tier: ModelTier) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut lines = self.lines.lock().unwrap();
        if lines.is_empty() {
            String::new()
        } else {
            lines.remove(0)
        }
    }

    async fn load_tier(&self, _tier: ModelTier) -> Result<()> {
        Ok(())
    }
}

/// Classifier returning a fixed detection and counting invocations
#[derive(Default)]
pub struct CountingClassifier {
    pub detection: Mutex<Detection>,
    calls: AtomicUsize,
}

impl CountingClassifier {
    #[must_use]
    pub fn returning(detection: Detection) -> Self {
        Self {
            detection: Mutex::new(detection),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for CountingClassifier {
    async fn classify(&self, _text: &str) -> Detection {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.detection.lock().unwrap().clone()
    }

    async fn extract_coords(&self, _text: &str) -> Option<Coords> {
        None
    }

    async fn extract_dungeon(&self, _text: &str) -> Option<(String, String)> {
        None
    }
}

/// Transport collecting every broadcast line
#[derive(Default)]
pub struct RecordingTransport {
    lines: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    async fn broadcast(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

/// Speech sink collecting (speaker, text) pairs
#[derive(Default)]
pub struct RecordingSynth {
    lines: Mutex<Vec<(String, String)>>,
}

impl RecordingSynth {
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<(String, String)> {
        self.lines.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SpeechSynth for RecordingSynth {
    async fn say(&self, speaker: &str, text: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((speaker.to_string(), text.to_string()));
    }
}
