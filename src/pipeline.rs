//! Finalized-utterance pipeline
//!
//! Takes one popped buffer through transcription, normalization, and
//! intent dispatch, and reports the outcome the retry ledger needs. A
//! buffer from a speaker with an active panic is routed as a panic update,
//! bypassing general classification; a pending retry intent routes
//! straight to its resolver.

use std::sync::{Arc, LazyLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;

use crate::classify::Classifier;
use crate::config::{IntentConfig, WakeConfig};
use crate::events::EventBoard;
use crate::intent::{self, Coords, Detection, IntentKind, dungeon};
use crate::model_tier::TierHandle;
use crate::panic_task::{PanicKind, PanicPayload, PanicTaskManager};
use crate::relay::{AlertTransport, SpeechSynth};
use crate::retry::{CommandOutcome, ResponseKind};
use crate::stt::Transcriber;
use crate::{transcript, wake};

static ANNOUNCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)announce (.+?) happening in (\d+)").expect("valid regex")
});

/// Vendor-location pin template understood by the game client. Fields 4 and
/// 5 carry the X/Y coordinates; the payload goes out base64-encoded.
const VENDOR_PIN_TEMPLATE: &str =
    "#uooutlands\u{241f}vendorlocation\u{241f}Ocean_Boss\u{241f}new item name\u{241f}0\u{241f}0\u{241f}11331355\u{241f}0x449BAB01\u{241f}1322683753";

const FIELD_SEP: char = '\u{241f}';

/// What one finalized buffer resolved to: the outcome for the retry ledger
/// plus the intent to carry as pending if the outcome was a failure.
pub type Resolution = (CommandOutcome, Option<IntentKind>);

/// The transcription+classification pipeline
pub struct CommandPipeline {
    transcriber: Arc<dyn Transcriber>,
    classifier: Arc<dyn Classifier>,
    transport: Arc<dyn AlertTransport>,
    synth: Arc<dyn SpeechSynth>,
    tier: TierHandle,
    panics: Arc<PanicTaskManager>,
    events: Arc<EventBoard>,
    wake_cfg: WakeConfig,
    intent_cfg: IntentConfig,
}

impl CommandPipeline {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        classifier: Arc<dyn Classifier>,
        transport: Arc<dyn AlertTransport>,
        synth: Arc<dyn SpeechSynth>,
        tier: TierHandle,
        panics: Arc<PanicTaskManager>,
        events: Arc<EventBoard>,
        wake_cfg: WakeConfig,
        intent_cfg: IntentConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            transcriber,
            classifier,
            transport,
            synth,
            tier,
            panics,
            events,
            wake_cfg,
            intent_cfg,
        })
    }

    /// Preview transcription over a buffer tail, for wake-phrase detection.
    /// Non-destructive; the scheduler passes a copy of the tail.
    pub async fn preview_heard_wake(&self, tail: &[u8]) -> bool {
        let text = self.transcriber.transcribe(tail, self.tier.current()).await;
        wake::heard_wake_phrase(&text, &self.wake_cfg.phrases, self.wake_cfg.similarity_cutoff)
    }

    /// Run one finalized buffer through the full pipeline.
    pub async fn handle_utterance(
        &self,
        speaker: &str,
        pcm: &[u8],
        pending: Option<IntentKind>,
    ) -> Resolution {
        let raw = self.transcriber.transcribe(pcm, self.tier.current()).await;
        let text = transcript::normalize(&raw);

        if text.is_empty() {
            return (CommandOutcome::Indifferent, None);
        }

        // without a pending retry, speech not addressed to the assistant
        // is nobody's business
        if pending.is_none()
            && !wake::heard_wake_phrase(
                &text,
                &self.wake_cfg.phrases,
                self.wake_cfg.similarity_cutoff,
            )
        {
            tracing::debug!(speaker, "no wake phrase, ignoring");
            return (CommandOutcome::Indifferent, None);
        }

        tracing::info!(speaker, text, "processing utterance");

        if self.panics.is_active(speaker).await {
            return self.handle_active_panic(speaker, &text).await;
        }

        if let Some(kind) = pending {
            return self.resolve_pending(speaker, kind, &text).await;
        }

        let detection = match intent::detect_local(&text, &self.intent_cfg) {
            Some(detection) => detection,
            None => {
                tracing::debug!(speaker, "local matchers empty, deferring to classifier");
                self.classifier.classify(&text).await
            }
        };

        self.dispatch(speaker, &text, detection).await
    }

    /// Speech from a speaker with a running panic is either a stop command
    /// or an update to the running alert.
    async fn handle_active_panic(&self, speaker: &str, text: &str) -> Resolution {
        if intent::is_stop_command(text) {
            tracing::info!(speaker, "stop phrase during active panic");
            self.panics.stop(speaker).await;
            return (CommandOutcome::Success, None);
        }

        match self.panics.kind(speaker).await {
            Some(PanicKind::Coordinates) => self.resolve_coord_panic(speaker, text, None, None).await,
            Some(PanicKind::Dungeon) => self.resolve_dungeon_panic(speaker, text, None, None).await,
            // task retired between the check and here; nothing to update
            None => (CommandOutcome::Indifferent, None),
        }
    }

    /// Route a retry's follow-up utterance straight to the unresolved
    /// intent's resolver, skipping re-classification.
    async fn resolve_pending(&self, speaker: &str, kind: IntentKind, text: &str) -> Resolution {
        tracing::debug!(speaker, ?kind, "routing to pending intent resolver");
        match kind {
            IntentKind::CoordPanic => self.resolve_coord_panic(speaker, text, None, None).await,
            IntentKind::DungeonPanic => self.resolve_dungeon_panic(speaker, text, None, None).await,
            IntentKind::Sighting => {
                // retry path is regex-only and fails silently
                match intent::extract_coords(text) {
                    Some(coords) => self.emit_sighting(coords).await,
                    None => (
                        CommandOutcome::Failure(ResponseKind::Silent),
                        Some(IntentKind::Sighting),
                    ),
                }
            }
            other => self.dispatch(speaker, text, Detection::of(other)).await,
        }
    }

    async fn dispatch(&self, speaker: &str, text: &str, detection: Detection) -> Resolution {
        match detection.kind.unwrap_or(IntentKind::Unknown) {
            IntentKind::AnnounceEvent => self.handle_announce(speaker, text, &detection).await,
            IntentKind::CancelEvent => {
                self.events.cancel(speaker).await;
                (CommandOutcome::Success, None)
            }
            IntentKind::StartEvent => {
                self.events.start_now(speaker).await;
                (CommandOutcome::Success, None)
            }
            IntentKind::RedAlert => self.handle_red_alert(speaker, text).await,
            IntentKind::StopPanic => {
                self.panics.stop(speaker).await;
                (CommandOutcome::Success, None)
            }
            IntentKind::CoordPanic => {
                self.resolve_coord_panic(speaker, text, detection.coords, detection.direction)
                    .await
            }
            IntentKind::DungeonPanic => {
                self.resolve_dungeon_panic(speaker, text, detection.dungeon, detection.level)
                    .await
            }
            IntentKind::Sighting => match detection.coords.or_else(|| intent::extract_coords(text)) {
                Some(coords) => self.emit_sighting(coords).await,
                None => {
                    self.synth.say(speaker, "Where is the ocean boss?").await;
                    (
                        CommandOutcome::Failure(ResponseKind::Responded),
                        Some(IntentKind::Sighting),
                    )
                }
            },
            IntentKind::Greet => {
                self.synth.say(speaker, "Hi, how may I help you?").await;
                (CommandOutcome::Success, None)
            }
            IntentKind::Unknown => (CommandOutcome::Indifferent, None),
        }
    }

    async fn handle_announce(
        &self,
        speaker: &str,
        text: &str,
        detection: &Detection,
    ) -> Resolution {
        let parsed = match (&detection.event_name, detection.minutes) {
            (Some(name), Some(minutes)) => Some((name.clone(), minutes)),
            _ => ANNOUNCE_RE.captures(text).and_then(|captures| {
                let minutes = captures[2].parse().ok()?;
                Some((captures[1].trim().to_string(), minutes))
            }),
        };

        match parsed {
            Some((name, minutes)) => {
                self.events
                    .announce(speaker, &name, minutes, std::time::Instant::now())
                    .await;
                (CommandOutcome::Success, None)
            }
            None => {
                self.synth
                    .say(speaker, "I didn't understand the event announcement.")
                    .await;
                (
                    CommandOutcome::Failure(ResponseKind::Responded),
                    Some(IntentKind::AnnounceEvent),
                )
            }
        }
    }

    async fn handle_red_alert(&self, speaker: &str, text: &str) -> Resolution {
        let line = match intent::extract_coords(text) {
            Some(coords) => match intent::extract_direction(text) {
                Some(direction) => {
                    format!("RED ALERT from {speaker} in {coords} moving {direction}!")
                }
                None => format!("RED ALERT from {speaker} in {coords}!"),
            },
            None => format!("RED ALERT from {speaker}! (no coords)"),
        };
        self.transport.broadcast(&line).await;
        (CommandOutcome::Success, None)
    }

    /// Start or update a coordinate panic; regex extraction first, then the
    /// LLM fallback for coordinates garbled past the pattern tier.
    async fn resolve_coord_panic(
        &self,
        speaker: &str,
        text: &str,
        known_coords: Option<Coords>,
        known_direction: Option<String>,
    ) -> Resolution {
        let mut coords = known_coords.or_else(|| intent::extract_coords(text));
        if coords.is_none() {
            coords = self.classifier.extract_coords(text).await;
        }
        let direction = known_direction.or_else(|| intent::extract_direction(text));

        match coords {
            Some(coords) => {
                self.panics
                    .update(speaker, PanicPayload::Coordinates { coords, direction })
                    .await;
                (CommandOutcome::Success, None)
            }
            None => {
                self.synth.say(speaker, "Please repeat the coordinates.").await;
                (
                    CommandOutcome::Failure(ResponseKind::Responded),
                    Some(IntentKind::CoordPanic),
                )
            }
        }
    }

    /// Start or update a dungeon panic; fuzzy alias matching first, then
    /// the LLM fallback.
    async fn resolve_dungeon_panic(
        &self,
        speaker: &str,
        text: &str,
        known_dungeon: Option<String>,
        known_level: Option<String>,
    ) -> Resolution {
        let mut resolved = match (known_dungeon, known_level) {
            (Some(dungeon), Some(level)) => Some((dungeon, level)),
            _ => dungeon::dungeon_from_text(text, &self.intent_cfg),
        };
        if resolved.is_none() {
            resolved = self.classifier.extract_dungeon(text).await;
        }

        match resolved {
            Some((dungeon, level)) => {
                let label = format!("{dungeon} level {level}");
                self.panics
                    .update(speaker, PanicPayload::Dungeon { label })
                    .await;
                (CommandOutcome::Success, None)
            }
            None => {
                self.synth
                    .say(speaker, "I couldn't understand the dungeon and level. Please repeat.")
                    .await;
                (
                    CommandOutcome::Failure(ResponseKind::Responded),
                    Some(IntentKind::DungeonPanic),
                )
            }
        }
    }

    async fn emit_sighting(&self, coords: Coords) -> Resolution {
        self.transport
            .broadcast(&format!("Ocean Boss sighted at {coords}!"))
            .await;
        self.transport.broadcast(&vendor_pin_payload(coords)).await;
        (CommandOutcome::Success, None)
    }
}

/// Substitute the coordinates into the vendor-pin template and encode it
/// for the client.
#[must_use]
pub fn vendor_pin_payload(coords: Coords) -> String {
    let mut parts: Vec<String> = VENDOR_PIN_TEMPLATE
        .split(FIELD_SEP)
        .map(ToString::to_string)
        .collect();
    parts[4] = coords.x().to_string();
    parts[5] = coords.y().to_string();
    let joined = parts.join(&FIELD_SEP.to_string());
    BASE64.encode(joined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_pin_substitutes_coordinates() {
        let coords = Coords::new(1133, 1355).unwrap();
        let encoded = vendor_pin_payload(coords);
        let decoded = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();

        let parts: Vec<&str> = decoded.split(FIELD_SEP).collect();
        assert_eq!(parts[0], "#uooutlands");
        assert_eq!(parts[4], "1133");
        assert_eq!(parts[5], "1355");
        assert_eq!(parts.len(), 9);
    }

    #[test]
    fn announce_pattern_parses() {
        let captures = ANNOUNCE_RE
            .captures("jarvis announce Ocean Boss happening in 10 minutes")
            .unwrap();
        assert_eq!(captures[1].trim(), "Ocean Boss");
        assert_eq!(&captures[2], "10");
    }
}
