//! Vigil Gateway - Live voice-command orchestrator
//!
//! This library turns a continuous stream of per-speaker audio chunks into
//! discrete, confirmed commands:
//! - Per-speaker audio buffering with silence-based finalization
//! - Fuzzy wake-phrase detection with a post-detection hold window
//! - A retry/backoff machine that re-prompts when intent extraction fails
//! - Cancellable recurring panic-alert tasks, one per speaker
//! - Resource-adaptive transcription model tier selection with hysteresis
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 Audio relay (ws)                 │
//! └───────────────────────┬──────────────────────────┘
//!                         │ per-speaker PCM chunks
//! ┌───────────────────────▼──────────────────────────┐
//! │ AudioBufferStore ── SessionScheduler (1 Hz tick) │
//! │    WakeWatch │ RetryLedger │ CommandPipeline     │
//! └───────────────────────┬──────────────────────────┘
//!                         │ finalized utterances
//! ┌───────────────────────▼──────────────────────────┐
//! │  Transcriber (tiered) │ Classifier │ Transport   │
//! │  PanicTaskManager │ EventBoard │ TierSelector    │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod fuzzy;
pub mod ingress;
pub mod intent;
pub mod model_tier;
pub mod panic_task;
pub mod pipeline;
pub mod relay;
pub mod retry;
pub mod scheduler;
pub mod stt;
pub mod transcript;
pub mod wake;

pub use audio::AudioBufferStore;
pub use config::Config;
pub use error::{Error, Result};
pub use events::EventBoard;
pub use ingress::IngressState;
pub use model_tier::{ModelTier, ModelTierSelector, TierHandle};
pub use panic_task::{PanicKind, PanicPayload, PanicTaskManager};
pub use pipeline::CommandPipeline;
pub use retry::{CommandOutcome, ResponseKind, RetryLedger};
pub use scheduler::{Flow, SessionScheduler};
pub use wake::WakeWatch;
