//! Configuration for the Vigil gateway
//!
//! Defaults cover a 48 kHz mono 16-bit PCM stream. A TOML file at
//! `~/.config/omni/vigil/config.toml` (or `--config`) is a partial overlay on
//! top of the defaults — every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Bytes per second of 48 kHz mono 16-bit PCM
pub const BYTES_PER_SECOND: usize = 96_000;

/// Vigil gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the websocket audio ingress server
    pub listen_port: u16,

    /// Wake-phrase detection settings
    pub wake: WakeConfig,

    /// Per-speaker buffer thresholds
    pub buffers: BufferConfig,

    /// Retry/backoff settings
    pub retry: RetryConfig,

    /// Recurring panic-alert settings
    pub panic: PanicConfig,

    /// Transcription model tier selection settings
    pub tier: TierConfig,

    /// Intent matching settings
    pub intent: IntentConfig,

    /// Transcription service settings
    pub stt: SttConfig,

    /// Classifier service settings
    pub classifier: ClassifierConfig,

    /// Optional webhook URL for alert broadcasts; absent means log-only
    pub webhook_url: Option<String>,
}

/// Wake-phrase detection settings
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Accepted spellings of the wake phrase, mishearings included
    pub phrases: Vec<String>,

    /// Per-token similarity cutoff for a fuzzy wake match
    pub similarity_cutoff: f32,

    /// Hold window after a wake phrase is heard mid-buffer
    pub hold_buffer_time: Duration,

    /// How long after the wake phrase the speaker must stay silent
    /// before finalization is allowed
    pub wake_timeout: Duration,
}

/// Per-speaker audio buffer thresholds, in bytes of PCM
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Below this the buffer is too short to contain speech (~1s)
    pub min_buffer_bytes: usize,

    /// Above this a wake-phrase preview transcription runs (~1.5s)
    pub preview_floor_bytes: usize,

    /// Finalization floor with no retry pending (~1.67s)
    pub finalize_floor_bytes: usize,

    /// Reduced finalization floor while a retry is pending (~1s)
    pub retry_finalize_floor_bytes: usize,

    /// Tail length handed to the preview transcription
    pub preview_tail_bytes: usize,

    /// Hard cap per speaker; oldest audio is evicted beyond this
    pub max_buffer_bytes: usize,

    /// Linear fade-in applied to a finalized buffer, in milliseconds
    pub fade_in_ms: u64,
}

/// Retry/backoff settings for unresolved commands
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Failed resolution cycles before the episode is abandoned
    pub max_attempts: u32,

    /// Wall-clock limit on a retry episode
    pub max_elapsed: Duration,

    /// Delay before re-finalizing when the failure spoke back to the user
    pub responded_delay: Duration,

    /// Delay before re-finalizing when the failure was silent
    pub silent_delay: Duration,

    /// Guard window after an episode starts, against echo of the
    /// same utterance
    pub cooldown: Duration,
}

/// Recurring panic-alert settings
#[derive(Debug, Clone)]
pub struct PanicConfig {
    /// Interval between alert re-broadcasts
    pub interval: Duration,

    /// Re-broadcast count before the task retires (20 × 15s = 5 min)
    pub max_iterations: u32,
}

/// Model tier selection settings
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Load sampling cadence
    pub cadence: Duration,

    /// Trailing smoothing window, in samples
    pub window: usize,

    /// Smoothed load at or above this switches Primary -> Degraded
    pub high_threshold: f32,

    /// Smoothed load at or below this switches Degraded -> Primary
    pub low_threshold: f32,
}

/// Intent matching settings
#[derive(Debug, Clone)]
pub struct IntentConfig {
    /// Keyword fuzzy-match cutoff
    pub fuzzy_cutoff: f32,

    /// Dungeon full-phrase fuzzy cutoff
    pub dungeon_phrase_cutoff: f32,

    /// Dungeon per-word fuzzy cutoff
    pub dungeon_word_cutoff: f32,
}

/// Transcription service settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Base URL of the transcription service
    pub base_url: String,

    /// Optional bearer token
    pub api_key: Option<String>,

    /// Model id used on the Primary tier
    pub primary_model: String,

    /// Model id used on the Degraded tier
    pub degraded_model: String,
}

/// Classifier service settings (ollama-style chat endpoint)
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the classifier service
    pub base_url: String,

    /// Chat model id
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 8765,
            wake: WakeConfig {
                phrases: [
                    "jarvis", "garvis", "jarvus", "jarviz", "darvis", "garves", "jervis",
                    "jarbis", "jarviss", "charvis",
                ]
                .iter()
                .map(ToString::to_string)
                .collect(),
                similarity_cutoff: 0.7,
                hold_buffer_time: Duration::from_millis(2500),
                wake_timeout: Duration::from_secs(4),
            },
            buffers: BufferConfig {
                min_buffer_bytes: BYTES_PER_SECOND,
                preview_floor_bytes: 144_000,
                finalize_floor_bytes: 160_000,
                retry_finalize_floor_bytes: BYTES_PER_SECOND,
                preview_tail_bytes: BYTES_PER_SECOND,
                max_buffer_bytes: 1024 * 1024,
                fade_in_ms: 200,
            },
            retry: RetryConfig {
                max_attempts: 2,
                max_elapsed: Duration::from_secs(30),
                responded_delay: Duration::from_secs(6),
                silent_delay: Duration::from_secs(2),
                cooldown: Duration::from_millis(500),
            },
            panic: PanicConfig {
                interval: Duration::from_secs(15),
                max_iterations: 20,
            },
            tier: TierConfig {
                cadence: Duration::from_secs(5),
                window: 12,
                high_threshold: 85.0,
                low_threshold: 60.0,
            },
            intent: IntentConfig {
                fuzzy_cutoff: 0.8,
                dungeon_phrase_cutoff: 0.75,
                dungeon_word_cutoff: 0.8,
            },
            stt: SttConfig {
                base_url: "http://localhost:8090".to_string(),
                api_key: None,
                primary_model: "whisper-small.en".to_string(),
                degraded_model: "whisper-base.en".to_string(),
            },
            classifier: ClassifierConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "mistral:7b-instruct".to_string(),
            },
            webhook_url: None,
        }
    }
}

impl Config {
    /// Load configuration: defaults, overlaid with the TOML file if present.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given config path does not exist or
    /// fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let file = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("cannot read {}: {e}", p.display())))?;
                Some(toml::from_str::<ConfigFile>(&raw)?)
            }
            None => match default_config_path() {
                Some(p) if p.exists() => {
                    let raw = std::fs::read_to_string(&p)?;
                    Some(toml::from_str::<ConfigFile>(&raw)?)
                }
                _ => None,
            },
        };

        if let Some(file) = file {
            config.apply_file(file);
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(port) = file.server.port {
            self.listen_port = port;
        }
        if let Some(url) = file.server.webhook_url {
            self.webhook_url = Some(url);
        }

        if let Some(phrases) = file.wake.phrases {
            self.wake.phrases = phrases;
        }
        if let Some(cutoff) = file.wake.similarity_cutoff {
            self.wake.similarity_cutoff = cutoff;
        }
        if let Some(secs) = file.wake.hold_buffer_secs {
            self.wake.hold_buffer_time = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = file.wake.wake_timeout_secs {
            self.wake.wake_timeout = Duration::from_secs_f64(secs);
        }

        if let Some(v) = file.buffers.min_buffer_bytes {
            self.buffers.min_buffer_bytes = v;
        }
        if let Some(v) = file.buffers.preview_floor_bytes {
            self.buffers.preview_floor_bytes = v;
        }
        if let Some(v) = file.buffers.finalize_floor_bytes {
            self.buffers.finalize_floor_bytes = v;
        }
        if let Some(v) = file.buffers.retry_finalize_floor_bytes {
            self.buffers.retry_finalize_floor_bytes = v;
        }
        if let Some(v) = file.buffers.max_buffer_bytes {
            self.buffers.max_buffer_bytes = v;
        }

        if let Some(v) = file.retry.max_attempts {
            self.retry.max_attempts = v;
        }
        if let Some(secs) = file.retry.max_elapsed_secs {
            self.retry.max_elapsed = Duration::from_secs_f64(secs);
        }

        if let Some(secs) = file.tier.cadence_secs {
            self.tier.cadence = Duration::from_secs_f64(secs);
        }
        if let Some(v) = file.tier.window {
            self.tier.window = v;
        }
        if let Some(v) = file.tier.high_threshold {
            self.tier.high_threshold = v;
        }
        if let Some(v) = file.tier.low_threshold {
            self.tier.low_threshold = v;
        }

        if let Some(v) = file.intent.fuzzy_cutoff {
            self.intent.fuzzy_cutoff = v;
        }
        if let Some(v) = file.intent.dungeon_phrase_cutoff {
            self.intent.dungeon_phrase_cutoff = v;
        }
        if let Some(v) = file.intent.dungeon_word_cutoff {
            self.intent.dungeon_word_cutoff = v;
        }

        if let Some(url) = file.stt.base_url {
            self.stt.base_url = url;
        }
        if let Some(key) = file.stt.api_key {
            self.stt.api_key = Some(key);
        }
        if let Some(model) = file.stt.primary_model {
            self.stt.primary_model = model;
        }
        if let Some(model) = file.stt.degraded_model {
            self.stt.degraded_model = model;
        }

        if let Some(url) = file.classifier.base_url {
            self.classifier.base_url = url;
        }
        if let Some(model) = file.classifier.model {
            self.classifier.model = model;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.wake.phrases.is_empty() {
            return Err(Error::Config("at least one wake phrase required".into()));
        }
        if self.tier.low_threshold >= self.tier.high_threshold {
            return Err(Error::Config(
                "tier low_threshold must be below high_threshold".into(),
            ));
        }
        if self.buffers.max_buffer_bytes < self.buffers.finalize_floor_bytes {
            return Err(Error::Config(
                "max_buffer_bytes must be at least finalize_floor_bytes".into(),
            ));
        }
        Ok(())
    }
}

/// Default config file location under the platform config dir
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "omni", "vigil")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Top-level TOML configuration file schema — a partial overlay on defaults
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerFileConfig,

    #[serde(default)]
    wake: WakeFileConfig,

    #[serde(default)]
    buffers: BuffersFileConfig,

    #[serde(default)]
    retry: RetryFileConfig,

    #[serde(default)]
    tier: TierFileConfig,

    #[serde(default)]
    intent: IntentFileConfig,

    #[serde(default)]
    stt: SttFileConfig,

    #[serde(default)]
    classifier: ClassifierFileConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ServerFileConfig {
    port: Option<u16>,
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WakeFileConfig {
    phrases: Option<Vec<String>>,
    similarity_cutoff: Option<f32>,
    hold_buffer_secs: Option<f64>,
    wake_timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct BuffersFileConfig {
    min_buffer_bytes: Option<usize>,
    preview_floor_bytes: Option<usize>,
    finalize_floor_bytes: Option<usize>,
    retry_finalize_floor_bytes: Option<usize>,
    max_buffer_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryFileConfig {
    max_attempts: Option<u32>,
    max_elapsed_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TierFileConfig {
    cadence_secs: Option<f64>,
    window: Option<usize>,
    high_threshold: Option<f32>,
    low_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentFileConfig {
    fuzzy_cutoff: Option<f32>,
    dungeon_phrase_cutoff: Option<f32>,
    dungeon_word_cutoff: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct SttFileConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    primary_model: Option<String>,
    degraded_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierFileConfig {
    base_url: Option<String>,
    model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffers.min_buffer_bytes, 96_000);
        assert_eq!(config.buffers.finalize_floor_bytes, 160_000);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn file_overlay_is_partial() {
        let raw = r#"
            [wake]
            similarity_cutoff = 0.8

            [tier]
            high_threshold = 90.0
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        let mut config = Config::default();
        config.apply_file(file);

        assert!((config.wake.similarity_cutoff - 0.8).abs() < f32::EPSILON);
        assert!((config.tier.high_threshold - 90.0).abs() < f32::EPSILON);
        // untouched fields keep their defaults
        assert_eq!(config.listen_port, 8765);
        assert_eq!(config.tier.window, 12);
    }

    #[test]
    fn inverted_tier_thresholds_rejected() {
        let mut config = Config::default();
        config.tier.low_threshold = 95.0;
        assert!(config.validate().is_err());
    }
}
