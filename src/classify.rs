//! LLM intent classifier collaborator
//!
//! Final tier of the intent chain, called only when the local matchers came
//! up empty. Talks to an ollama-style chat endpoint and salvages JSON from
//! noisy completions. Fails closed: any error yields `Unknown`, never a
//! crash or a retry.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::config::ClassifierConfig;
use crate::intent::{Coords, Detection, IntentKind};
use crate::Result;

static JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
static COORD_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3,4} \d{3,4}$").expect("valid regex"));

/// Classifies transcripts into intents and extracts fields
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Full intent classification; fails closed to `Unknown`
    async fn classify(&self, text: &str) -> Detection;

    /// Extract a coordinate pair when the regex tier failed
    async fn extract_coords(&self, text: &str) -> Option<Coords>;

    /// Extract `(dungeon, level)` when the fuzzy tier failed
    async fn extract_dungeon(&self, text: &str) -> Option<(String, String)>;
}

/// HTTP classifier against an ollama-style `/api/chat` endpoint
pub struct HttpClassifier {
    client: reqwest::Client,
    cfg: ClassifierConfig,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(serde::Deserialize)]
struct ChatMessage {
    content: String,
}

/// JSON shape the classification prompt asks for
#[derive(Debug, serde::Deserialize)]
struct ClassifiedIntent {
    intent: String,
    coords: Option<String>,
    direction: Option<String>,
    dungeon: Option<String>,
    level: Option<serde_json::Value>,
    event_name: Option<String>,
    time_until_start: Option<String>,
}

const CLASSIFY_PROMPT: &str = r#"You are a voice assistant for a game guild. Analyze the player speech and return a JSON object:

- "intent": one of ["coord_panic", "dungeon_panic", "red_alert", "stop_panic", "greet", "announce_event", "cancel_event", "start_event", "sighting", "unknown"]
- if "coord_panic": "coords" as two numbers like "3200 2100", optional "direction"
- if "dungeon_panic" or "red_alert": "dungeon" and optional "level" (1-8)
- if "announce_event": "event_name" and "time_until_start" in minutes
- if "sighting": "coords" as two numbers

Only include fields matching the intent. No explanations.

Transcript: "{transcript}"
JSON:"#;

impl HttpClassifier {
    #[must_use]
    pub fn new(cfg: ClassifierConfig) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            cfg,
        })
    }

    async fn chat(&self, prompt: String) -> Result<String> {
        let body = serde_json::json!({
            "model": self.cfg.model,
            "stream": false,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.cfg.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: ChatResponse = response.json().await?;
        Ok(parsed.message.content)
    }
}

/// Salvage a JSON object from a noisy completion
fn extract_json(raw: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }
    let candidate = JSON_RE.find(raw)?;
    serde_json::from_str(candidate.as_str()).ok()
}

fn intent_kind(name: &str) -> IntentKind {
    match name {
        "coord_panic" => IntentKind::CoordPanic,
        "dungeon_panic" => IntentKind::DungeonPanic,
        "red_alert" => IntentKind::RedAlert,
        "stop_panic" => IntentKind::StopPanic,
        "greet" => IntentKind::Greet,
        "announce_event" => IntentKind::AnnounceEvent,
        "cancel_event" => IntentKind::CancelEvent,
        "start_event" => IntentKind::StartEvent,
        "sighting" => IntentKind::Sighting,
        _ => IntentKind::Unknown,
    }
}

/// Map salvaged JSON to a [`Detection`]
fn detection_from_json(value: &serde_json::Value) -> Detection {
    let Ok(parsed) = serde_json::from_value::<ClassifiedIntent>(value.clone()) else {
        return Detection::of(IntentKind::Unknown);
    };

    let mut detection = Detection::of(intent_kind(&parsed.intent));
    detection.coords = parsed.coords.as_deref().and_then(Coords::parse);
    detection.direction = parsed.direction;
    detection.dungeon = parsed.dungeon;
    detection.level = parsed.level.map(|v| match v {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });
    detection.event_name = parsed.event_name;
    detection.minutes = parsed
        .time_until_start
        .as_deref()
        .and_then(parse_leading_number);
    detection
}

/// "10 minutes" -> 10
fn parse_leading_number(raw: &str) -> Option<u64> {
    raw.split_whitespace().next()?.parse().ok()
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Detection {
        let prompt = CLASSIFY_PROMPT.replace("{transcript}", text.trim());
        match self.chat(prompt).await {
            Ok(raw) => extract_json(&raw)
                .map_or_else(|| Detection::of(IntentKind::Unknown), |v| detection_from_json(&v)),
            Err(e) => {
                tracing::warn!(error = %e, "LLM classification failed");
                Detection::of(IntentKind::Unknown)
            }
        }
    }

    async fn extract_coords(&self, text: &str) -> Option<Coords> {
        let prompt = format!(
            "Extract the two coordinate numbers (e.g. \"3400 2500\") from this message. \
             Return ONLY the two numbers separated by a space, nothing else.\n\n\
             Message: \"{}\"\nCoords:",
            text.trim()
        );
        match self.chat(prompt).await {
            Ok(raw) => {
                let raw = raw.trim();
                COORD_PAIR_RE.is_match(raw).then(|| Coords::parse(raw)).flatten()
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM coordinate extraction failed");
                None
            }
        }
    }

    async fn extract_dungeon(&self, text: &str) -> Option<(String, String)> {
        let prompt = format!(
            "Which dungeon and level does this message mention? \
             Answer as \"<dungeon> level <n>\" or \"none\".\n\nMessage: \"{}\"\nAnswer:",
            text.trim()
        );
        match self.chat(prompt).await {
            Ok(raw) => {
                let corrected = crate::intent::dungeon::fuzzy_autocorrect(&raw, 0.8);
                let dungeon = crate::intent::dungeon::fuzzy_match_dungeon(
                    corrected.split(" level ").next()?,
                    0.8,
                )?;
                let level = crate::intent::dungeon::extract_level(&raw)?;
                Some((dungeon.to_string(), level))
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM dungeon extraction failed");
                None
            }
        }
    }
}
