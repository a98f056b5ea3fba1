//! Speech synthesis control.
//!
//! [`SpeechOutputController`] owns the single active utterance. Starting a
//! new one cancels whatever is playing. The platform synthesizer gets no
//! end-of-speech callback from us; instead every utterance carries an
//! estimated duration from a [`DurationModel`], which the avatar uses to time
//! its talking animation.

use crate::cohort::AgeCohort;
use crate::config::SpeechConfig;
use crate::error::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

// ── Voice parameters ─────────────────────────────────────────────────────────

/// Rate, pitch and volume handed to the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceParams {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl VoiceParams {
    /// Fixed per-cohort voice table. Young adults and adults use the defaults.
    #[must_use]
    pub fn for_cohort(cohort: AgeCohort) -> Self {
        match cohort {
            AgeCohort::Kids => Self {
                rate: 0.9,
                pitch: 1.2,
                volume: 1.0,
            },
            AgeCohort::Teens => Self {
                rate: 1.1,
                pitch: 1.0,
                volume: 1.0,
            },
            AgeCohort::Senior => Self {
                rate: 0.85,
                pitch: 1.0,
                volume: 1.0,
            },
            AgeCohort::YoungAdult | AgeCohort::Adult => Self::default(),
        }
    }
}

// ── Duration model ───────────────────────────────────────────────────────────

/// Strategy for estimating how long an utterance will take to speak.
pub trait DurationModel: Send + Sync {
    fn estimate(&self, text: &str) -> Duration;
}

/// `len × ms_per_char + base_ms`, with `len` counted in UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearDurationModel {
    pub ms_per_char: u64,
    pub base_ms: u64,
}

impl Default for LinearDurationModel {
    fn default() -> Self {
        Self {
            ms_per_char: 60,
            base_ms: 1000,
        }
    }
}

impl From<&SpeechConfig> for LinearDurationModel {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            ms_per_char: config.ms_per_char,
            base_ms: config.base_ms,
        }
    }
}

impl DurationModel for LinearDurationModel {
    fn estimate(&self, text: &str) -> Duration {
        let units = text.encode_utf16().count() as u64;
        Duration::from_millis(
            units
                .saturating_mul(self.ms_per_char)
                .saturating_add(self.base_ms),
        )
    }
}

// ── Synthesizer seam ─────────────────────────────────────────────────────────

/// One synthesized speech request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub cohort: AgeCohort,
    pub params: VoiceParams,
    #[serde(rename = "estimated_ms", serialize_with = "as_millis")]
    pub estimated: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Platform text-to-speech capability.
///
/// `speak` starts playback and returns immediately; `cancel` stops whatever
/// the platform is currently saying.
pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, utterance: &Utterance) -> Result<()>;
    fn cancel(&self);
}

/// Synthesizer that records requests instead of producing audio.
///
/// Used by tests and by hosts running without an audio device.
#[derive(Debug, Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<Utterance>>,
    cancels: AtomicU64,
}

impl RecordingSynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[must_use]
    pub fn cancel_count(&self) -> u64 {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn speak(&self, utterance: &Utterance) -> Result<()> {
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(utterance.clone());
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Result of [`SpeechOutputController::speak`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpokenUtterance {
    pub id: u64,
    pub estimated: Duration,
    pub params: VoiceParams,
}

#[derive(Debug, Clone, Copy)]
struct ActiveUtterance {
    id: u64,
    started: Instant,
    estimated: Duration,
}

/// Owns the single active utterance.
pub struct SpeechOutputController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    model: Arc<dyn DurationModel>,
    active: Mutex<Option<ActiveUtterance>>,
    next_id: AtomicU64,
}

impl SpeechOutputController {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, model: Arc<dyn DurationModel>) -> Self {
        Self {
            synthesizer,
            model,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Controller using the linear model from configuration.
    pub fn from_config(synthesizer: Arc<dyn SpeechSynthesizer>, config: &SpeechConfig) -> Self {
        Self::new(synthesizer, Arc::new(LinearDurationModel::from(config)))
    }

    #[must_use]
    pub fn estimate_duration(&self, text: &str) -> Duration {
        self.model.estimate(text)
    }

    /// Cancel any in-flight utterance and start `text` with the cohort's voice.
    ///
    /// Empty text still cancels the previous utterance and reports the base
    /// duration.
    ///
    /// # Errors
    ///
    /// Returns the synthesizer's error if playback could not start. The
    /// previous utterance has been cancelled either way.
    pub fn speak(&self, text: &str, cohort: AgeCohort) -> Result<SpokenUtterance> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.take() {
            debug!(utterance = previous.id, "cancelling previous utterance");
            self.synthesizer.cancel();
        }

        let utterance = Utterance {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            text: text.to_owned(),
            cohort,
            params: VoiceParams::for_cohort(cohort),
            estimated: self.model.estimate(text),
        };

        if let Err(e) = self.synthesizer.speak(&utterance) {
            warn!(utterance = utterance.id, error = %e, "speech synthesis failed to start");
            return Err(e);
        }

        *active = Some(ActiveUtterance {
            id: utterance.id,
            started: Instant::now(),
            estimated: utterance.estimated,
        });
        debug!(
            utterance = utterance.id,
            cohort = %cohort,
            estimated_ms = utterance.estimated.as_millis() as u64,
            "utterance started"
        );
        Ok(SpokenUtterance {
            id: utterance.id,
            estimated: utterance.estimated,
            params: utterance.params,
        })
    }

    /// Stop the active utterance. Does nothing when idle.
    pub fn cancel_speaking(&self) {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(previous) = previous {
            debug!(utterance = previous.id, "utterance cancelled");
            self.synthesizer.cancel();
        }
    }

    /// Whether an utterance is still inside its estimated speaking window.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|a| a.started.elapsed() < a.estimated)
    }
}

impl std::fmt::Debug for SpeechOutputController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOutputController")
            .field("speaking", &self.is_speaking())
            .finish_non_exhaustive()
    }
}
