//! Speech-to-text collaborator
//!
//! The scheduler treats transcription as an opaque function routed through
//! the currently selected model tier. An internal failure yields an empty
//! transcript — the caller treats that as indifferent, never as a
//! retryable failure.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SttConfig;
use crate::model_tier::ModelTier;
use crate::{Error, Result};

/// Sample rate of ingress PCM
pub const SAMPLE_RATE: u32 = 48_000;

/// Transcribes PCM audio via one of two model tiers
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe raw PCM. Returns an empty string on internal error.
    async fn transcribe(&self, pcm: &[u8], tier: ModelTier) -> String;

    /// Load (or verify) the model backing a tier. Synchronous from the
    /// caller's view and may fail; the tier selector keeps the prior tier
    /// active on failure.
    async fn load_tier(&self, tier: ModelTier) -> Result<()>;
}

/// HTTP transcriber against a Whisper-style `/v1/audio/transcriptions`
/// endpoint, with one model id per tier
pub struct HttpTranscriber {
    client: reqwest::Client,
    cfg: SttConfig,
}

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl HttpTranscriber {
    #[must_use]
    pub fn new(cfg: SttConfig) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            cfg,
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Primary => &self.cfg.primary_model,
            ModelTier::Degraded => &self.cfg.degraded_model,
        }
    }

    async fn request(&self, pcm: &[u8], tier: ModelTier) -> Result<String> {
        let wav = pcm_to_wav(pcm)?;
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model_for(tier).to_string())
            .part("file", part);

        let mut req = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.cfg.base_url))
            .multipart(form);
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?.error_for_status()?;
        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text)
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, pcm: &[u8], tier: ModelTier) -> String {
        match self.request(pcm, tier).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, tier = ?tier, "transcription failed");
                String::new()
            }
        }
    }

    async fn load_tier(&self, tier: ModelTier) -> Result<()> {
        let model = self.model_for(tier).to_string();
        let mut req = self
            .client
            .post(format!("{}/v1/models/load", self.cfg.base_url))
            .json(&serde_json::json!({ "model": model }));
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        req.send()
            .await
            .map_err(|e| Error::Stt(format!("model {model} load request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Stt(format!("model {model} load rejected: {e}")))?;
        Ok(())
    }
}

/// Wrap raw PCM (48 kHz mono 16-bit LE) into a WAV container for upload
///
/// # Errors
///
/// Returns [`Error::Audio`] on encoder failure or odd-length input.
pub fn pcm_to_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    if pcm.len() % 2 != 0 {
        return Err(Error::Audio("PCM byte length must be even".into()));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Audio(e.to_string()))?;
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
