//! Resource-adaptive transcription model tier selection
//!
//! A background loop samples system load on a fixed cadence, keeps a
//! trailing smoothing window, and swaps the active transcription tier with
//! hysteresis: two distinct thresholds so single-sample spikes never flap
//! the model. Swaps are atomic to readers; the scheduler observes either
//! the old or the new tier, never a partial state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use sysinfo::System;

use crate::config::TierConfig;
use crate::stt::Transcriber;
use crate::{Error, Result};

/// Quality/cost level of the transcription engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Higher-quality model, used while the host has headroom
    Primary,
    /// Cheaper model, used under sustained load
    Degraded,
}

/// Shared view of the currently active tier
#[derive(Debug, Clone)]
pub struct TierHandle {
    inner: Arc<RwLock<ModelTier>>,
}

impl TierHandle {
    #[must_use]
    pub fn new(tier: ModelTier) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tier)),
        }
    }

    /// The currently bound tier
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned, which requires a prior panic while
    /// holding the write side.
    #[must_use]
    pub fn current(&self) -> ModelTier {
        *self.inner.read().expect("tier lock poisoned")
    }

    fn set(&self, tier: ModelTier) {
        *self.inner.write().expect("tier lock poisoned") = tier;
    }
}

/// One load measurement
#[derive(Debug, Clone, Copy)]
pub struct LoadSample {
    /// Memory in use, percent of total
    pub mem_percent: f32,
    /// CPU/GPU load, percent
    pub load_percent: f32,
}

/// Source of load measurements; swapped for a stub in tests
pub trait LoadSampler: Send + Sync {
    fn sample(&mut self) -> LoadSample;
}

/// sysinfo-backed sampler
pub struct SystemLoadSampler {
    sys: System,
}

impl SystemLoadSampler {
    #[must_use]
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SystemLoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSampler for SystemLoadSampler {
    #[allow(clippy::cast_precision_loss)]
    fn sample(&mut self) -> LoadSample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let mem_percent = if total == 0 {
            0.0
        } else {
            self.sys.used_memory() as f32 / total as f32 * 100.0
        };

        LoadSample {
            mem_percent,
            load_percent: self.sys.global_cpu_info().cpu_usage(),
        }
    }
}

/// Manual tier pin, suspending automatic switching while set
#[derive(Debug, Clone, Default)]
pub struct TierOverrideHandle {
    slot: Arc<Mutex<Option<ModelTier>>>,
}

impl TierOverrideHandle {
    /// Pin a tier; the selector applies it on its next cadence
    pub fn force(&self, tier: ModelTier) {
        *self.slot.lock().expect("override lock poisoned") = Some(tier);
    }

    /// Resume automatic switching
    pub fn release(&self) {
        *self.slot.lock().expect("override lock poisoned") = None;
    }

    fn get(&self) -> Option<ModelTier> {
        *self.slot.lock().expect("override lock poisoned")
    }
}

/// Background tier selector
pub struct ModelTierSelector {
    handle: TierHandle,
    transcriber: Arc<dyn Transcriber>,
    sampler: Box<dyn LoadSampler>,
    window: VecDeque<f32>,
    cfg: TierConfig,
    override_handle: TierOverrideHandle,
}

impl ModelTierSelector {
    /// Load an initial tier and build the selector.
    ///
    /// Primary is preferred; a failed Primary load falls back to Degraded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stt`] if no tier is loadable at all — the system
    /// cannot transcribe and must not start.
    pub async fn init(
        cfg: TierConfig,
        transcriber: Arc<dyn Transcriber>,
        sampler: Box<dyn LoadSampler>,
    ) -> Result<Self> {
        let initial = match transcriber.load_tier(ModelTier::Primary).await {
            Ok(()) => ModelTier::Primary,
            Err(e) => {
                tracing::warn!(error = %e, "primary model failed to load, trying degraded");
                transcriber
                    .load_tier(ModelTier::Degraded)
                    .await
                    .map_err(|e| {
                        Error::Stt(format!("no transcription model loadable at startup: {e}"))
                    })?;
                ModelTier::Degraded
            }
        };

        tracing::info!(tier = ?initial, "transcription model loaded");

        Ok(Self {
            handle: TierHandle::new(initial),
            transcriber,
            sampler,
            window: VecDeque::new(),
            cfg,
            override_handle: TierOverrideHandle::default(),
        })
    }

    /// Shared view of the active tier, read by the scheduler per call
    #[must_use]
    pub fn handle(&self) -> TierHandle {
        self.handle.clone()
    }

    /// Handle for manual tier pinning
    #[must_use]
    pub fn override_handle(&self) -> TierOverrideHandle {
        self.override_handle.clone()
    }

    /// Run the watchdog loop until the task is dropped
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.cfg.cadence);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.step().await;
        }
    }

    /// One sampling/decision step
    pub async fn step(&mut self) {
        if let Some(pinned) = self.override_handle.get() {
            if pinned != self.handle.current() {
                self.swap_to(pinned).await;
            }
            return;
        }

        let sample = self.sampler.sample();
        let value = sample.load_percent.max(sample.mem_percent);
        self.window.push_back(value);
        while self.window.len() > self.cfg.window {
            self.window.pop_front();
        }

        // no decisions on a partial window; a lone spike must not switch
        if self.window.len() < self.cfg.window {
            return;
        }

        let smoothed = self.smoothed();
        if let Some(target) = self.decide(smoothed, self.handle.current()) {
            tracing::info!(smoothed, target = ?target, "load threshold crossed, switching tier");
            self.swap_to(target).await;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn smoothed(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f32>() / self.window.len() as f32
    }

    fn decide(&self, smoothed: f32, current: ModelTier) -> Option<ModelTier> {
        match current {
            ModelTier::Primary if smoothed >= self.cfg.high_threshold => {
                Some(ModelTier::Degraded)
            }
            ModelTier::Degraded if smoothed <= self.cfg.low_threshold => {
                Some(ModelTier::Primary)
            }
            _ => None,
        }
    }

    /// Load the target tier; on failure the prior tier stays active.
    async fn swap_to(&self, target: ModelTier) {
        match self.transcriber.load_tier(target).await {
            Ok(()) => self.handle.set(target),
            Err(e) => {
                tracing::warn!(error = %e, target = ?target, "tier load failed, keeping prior tier");
            }
        }
    }
}
