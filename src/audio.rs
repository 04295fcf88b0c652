//! Per-speaker audio buffering
//!
//! The ingress transport appends raw PCM chunks here; the scheduler pops a
//! whole buffer at finalization. Buffers are capped, with oldest audio
//! evicted on overflow so a silent-but-connected speaker cannot grow
//! unbounded.

use std::collections::HashMap;
use std::time::Instant;

/// One speaker's in-flight audio
#[derive(Debug)]
pub struct AudioSession {
    buffer: Vec<u8>,
    last_activity: Instant,
}

impl AudioSession {
    /// Timestamp of the last appended chunk
    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Current buffer length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Per-speaker append-only byte buffers with pop/peek
#[derive(Debug)]
pub struct AudioBufferStore {
    sessions: HashMap<String, AudioSession>,
    max_buffer_bytes: usize,
}

impl AudioBufferStore {
    /// Create a store with the given per-speaker byte cap
    #[must_use]
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_buffer_bytes,
        }
    }

    /// Append a chunk for a speaker, creating the session on first write.
    ///
    /// Never blocks and never fails. On overflow the oldest bytes are
    /// evicted so the buffer stays within the cap.
    pub fn append(&mut self, speaker: &str, bytes: &[u8], now: Instant) {
        let session = self
            .sessions
            .entry(speaker.to_string())
            .or_insert_with(|| AudioSession {
                buffer: Vec::new(),
                last_activity: now,
            });

        session.buffer.extend_from_slice(bytes);
        session.last_activity = now;

        if session.buffer.len() > self.max_buffer_bytes {
            let excess = session.buffer.len() - self.max_buffer_bytes;
            session.buffer.drain(..excess);
            tracing::warn!(speaker, evicted = excess, "buffer cap hit, dropped oldest audio");
        }
    }

    /// Atomically remove and return a speaker's buffer; `None` if no
    /// session exists. A subsequent pop returns `None` until more audio
    /// is appended.
    pub fn pop(&mut self, speaker: &str) -> Option<Vec<u8>> {
        self.sessions.remove(speaker).map(|s| s.buffer)
    }

    /// Read the last `n` bytes without mutating state. Returns the whole
    /// buffer when shorter than `n`, and an empty slice for an unknown
    /// speaker.
    #[must_use]
    pub fn peek_tail(&self, speaker: &str, n: usize) -> &[u8] {
        self.sessions.get(speaker).map_or(&[], |s| {
            let start = s.buffer.len().saturating_sub(n);
            &s.buffer[start..]
        })
    }

    /// Buffer length for a speaker; 0 if no session exists
    #[must_use]
    pub fn len(&self, speaker: &str) -> usize {
        self.sessions.get(speaker).map_or(0, AudioSession::len)
    }

    /// Whether no sessions exist at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Speakers with any buffered audio, in no particular order
    #[must_use]
    pub fn speakers(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Last-activity timestamp for a speaker
    #[must_use]
    pub fn last_activity(&self, speaker: &str) -> Option<Instant> {
        self.sessions.get(speaker).map(AudioSession::last_activity)
    }
}

/// Apply a linear fade-in over the first `ms` milliseconds of 48 kHz mono
/// 16-bit little-endian PCM, softening the clipped onset a buffer boundary
/// leaves behind.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn fade_in(mut pcm: Vec<u8>, ms: u64) -> Vec<u8> {
    let ramp_samples = (crate::config::BYTES_PER_SECOND as u64 * ms / 1000 / 2) as usize;
    let available = pcm.len() / 2;
    let ramp = ramp_samples.min(available);

    for i in 0..ramp {
        let lo = pcm[i * 2];
        let hi = pcm[i * 2 + 1];
        let sample = i16::from_le_bytes([lo, hi]);
        let gain = i as f32 / ramp as f32;
        let scaled = (f32::from(sample) * gain) as i16;
        let [lo, hi] = scaled.to_le_bytes();
        pcm[i * 2] = lo;
        pcm[i * 2 + 1] = hi;
    }

    pcm
}
