//! Avatar talking state driven by estimated speech duration.
//!
//! [`TalkingAvatarSync::on_speak`] raises the talking flag for exactly the
//! estimated duration of the utterance. Each call starts a new generation;
//! a timer only lowers the flag if its generation is still current, so a
//! stale timer can never cut a newer utterance short.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

/// Animation mood. Never influences reply content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Thinking,
}

impl Emotion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Thinking => "thinking",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "neutral" => Some(Self::Neutral),
            "happy" => Some(Self::Happy),
            "thinking" => Some(Self::Thinking),
            _ => None,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyframed motion for one animation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Motion {
    pub scale: &'static [f32],
    pub rotate_deg: &'static [f32],
    pub lift_px: &'static [f32],
    pub cycle_ms: u32,
    pub repeat: bool,
}

const STILL: Motion = Motion {
    scale: &[1.0],
    rotate_deg: &[0.0],
    lift_px: &[0.0],
    cycle_ms: 0,
    repeat: false,
};

/// What the renderer should play for the current talking/emotion pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimationProfile {
    pub talking: bool,
    pub emotion: Emotion,
    /// Whole-body sway.
    pub body: Motion,
    /// Emotion gesture layered on top.
    pub gesture: Motion,
    /// Pulsing aura behind the avatar.
    pub aura: bool,
}

impl AnimationProfile {
    #[must_use]
    pub fn new(talking: bool, emotion: Emotion) -> Self {
        let body = if talking {
            Motion {
                scale: &[1.0, 1.05, 1.0],
                rotate_deg: &[0.0, 2.0, -2.0, 0.0],
                lift_px: &[0.0],
                cycle_ms: 400,
                repeat: true,
            }
        } else {
            Motion {
                cycle_ms: 2000,
                repeat: true,
                ..STILL
            }
        };
        let gesture = match emotion {
            Emotion::Neutral => STILL,
            // Bounces only while speaking.
            Emotion::Happy => Motion {
                lift_px: &[0.0, -15.0, 0.0],
                cycle_ms: 600,
                repeat: talking,
                ..STILL
            },
            Emotion::Thinking => Motion {
                rotate_deg: &[0.0, 10.0, -10.0, 0.0],
                cycle_ms: 2000,
                repeat: true,
                ..STILL
            },
        };
        Self {
            talking,
            emotion,
            body,
            gesture,
            aura: talking,
        }
    }
}

struct SyncState {
    talking: watch::Sender<bool>,
    generation: AtomicU64,
}

/// Talking flag plus caller-supplied emotion for one avatar.
pub struct TalkingAvatarSync {
    state: Arc<SyncState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    emotion: Mutex<Emotion>,
}

impl TalkingAvatarSync {
    #[must_use]
    pub fn new(emotion: Emotion) -> Self {
        let (talking, _) = watch::channel(false);
        Self {
            state: Arc::new(SyncState {
                talking,
                generation: AtomicU64::new(0),
            }),
            timer: Mutex::new(None),
            emotion: Mutex::new(emotion),
        }
    }

    /// Start talking for `duration`, replacing any earlier window.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_speak(&self, duration: Duration) {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.talking.send_replace(true);

        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if state.generation.load(Ordering::SeqCst) == generation {
                state.talking.send_replace(false);
                trace!(generation, "talking window elapsed");
            }
        });
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop talking immediately.
    pub fn stop(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.abort();
        }
        self.state.talking.send_replace(false);
    }

    #[must_use]
    pub fn is_talking(&self) -> bool {
        *self.state.talking.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.talking.subscribe()
    }

    #[must_use]
    pub fn emotion(&self) -> Emotion {
        *self.emotion.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_emotion(&self, emotion: Emotion) {
        *self.emotion.lock().unwrap_or_else(|e| e.into_inner()) = emotion;
    }

    #[must_use]
    pub fn animation(&self) -> AnimationProfile {
        AnimationProfile::new(self.is_talking(), self.emotion())
    }
}

impl Default for TalkingAvatarSync {
    fn default() -> Self {
        Self::new(Emotion::Neutral)
    }
}

impl Drop for TalkingAvatarSync {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.abort();
        }
    }
}

impl fmt::Debug for TalkingAvatarSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TalkingAvatarSync")
            .field("talking", &self.is_talking())
            .field("emotion", &self.emotion())
            .finish()
    }
}
