//! Voice capture availability and single-utterance recognition.
//!
//! ```text
//! Unchecked ──probe──▶ Checking ──▶ Unavailable(reason)
//!                          │
//!                          └──────▶ Idle ◀──▶ Listening
//! ```
//!
//! [`VoiceCaptureController`] owns the state and at most one recognition
//! session. Every transition happens inside the controller; callers only
//! observe it through [`VoiceCaptureController::state`] or a
//! [`watch::Receiver`].

use crate::error::{BuddyError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const INSECURE_CONTEXT_REASON: &str =
    "Voice input requires a secure connection (HTTPS or localhost).";
pub const NO_RECOGNITION_REASON: &str =
    "Speech recognition is not supported on this device. You can still type your messages.";
pub const NO_MEDIA_DEVICES_REASON: &str = "Media devices are not available on this device.";
pub const MICROPHONE_BLOCKED_REASON: &str =
    "Microphone access is blocked. Allow microphone access in your system settings to use voice input.";
pub const MICROPHONE_NOT_FOUND_REASON: &str = "No microphone found. Please connect a microphone.";
pub const MICROPHONE_ERROR_REASON: &str = "Unable to access microphone.";

/// Language name → recognition locale.
const LOCALES: &[(&str, &str)] = &[
    ("english", "en-US"),
    ("telugu", "te-IN"),
    ("hindi", "hi-IN"),
    ("spanish", "es-ES"),
    ("french", "fr-FR"),
    ("german", "de-DE"),
    ("chinese", "zh-CN"),
    ("japanese", "ja-JP"),
    ("arabic", "ar-SA"),
    ("portuguese", "pt-PT"),
    ("russian", "ru-RU"),
];

/// Look up the recognition locale for a language name (case-insensitive).
#[must_use]
pub fn locale_for_language(language: &str) -> Option<&'static str> {
    let key = language.trim().to_ascii_lowercase();
    LOCALES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, locale)| *locale)
}

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum VoiceCaptureState {
    Unchecked,
    Checking,
    /// Voice input is disabled; text input still works.
    Unavailable(String),
    Idle,
    Listening,
}

impl VoiceCaptureState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Checking => "checking",
            Self::Unavailable(_) => "unavailable",
            Self::Idle => "idle",
            Self::Listening => "listening",
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for VoiceCaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Platform seam ────────────────────────────────────────────────────────────

/// Why the transient microphone open failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneError {
    PermissionDenied,
    NotFound,
    Other(String),
}

impl MicrophoneError {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PermissionDenied => MICROPHONE_BLOCKED_REASON,
            Self::NotFound => MICROPHONE_NOT_FOUND_REASON,
            Self::Other(_) => MICROPHONE_ERROR_REASON,
        }
    }
}

/// Errors a recognition session can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    NotAllowed,
    ServiceNotAllowed,
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    Other(String),
}

impl RecognitionError {
    /// Permission was withdrawn mid-session.
    #[must_use]
    pub fn is_permission_revoked(&self) -> bool {
        matches!(self, Self::NotAllowed | Self::ServiceNotAllowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A final transcript.
    Result(String),
    Error(RecognitionError),
    End,
}

/// How the controller configures a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    pub locale: String,
    pub continuous: bool,
    pub interim_results: bool,
}

/// Controller-side handle to one platform recognition session.
///
/// Dropping the handle stops the session.
pub struct RecognitionSession {
    events: mpsc::Receiver<RecognitionEvent>,
    stop: Option<oneshot::Sender<()>>,
}

/// Platform-side half of a [`RecognitionSession`].
pub struct RecognitionFeed {
    pub events: mpsc::Sender<RecognitionEvent>,
    /// Resolves when the controller stops or drops the session.
    pub stopped: oneshot::Receiver<()>,
}

impl RecognitionSession {
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, RecognitionFeed) {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        (
            Self {
                events: event_rx,
                stop: Some(stop_tx),
            },
            RecognitionFeed {
                events: event_tx,
                stopped: stop_rx,
            },
        )
    }

    async fn next_event(&mut self) -> Option<RecognitionEvent> {
        self.events.recv().await
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Platform speech-recognition and media-device capabilities.
#[async_trait]
pub trait CapturePlatform: Send + Sync {
    fn is_secure_context(&self) -> bool;
    fn has_speech_recognition(&self) -> bool;
    fn has_media_devices(&self) -> bool;
    /// Open and immediately close an audio input stream.
    async fn probe_microphone(&self) -> std::result::Result<(), MicrophoneError>;
    async fn start_recognition(&self, request: &RecognitionRequest) -> Result<RecognitionSession>;
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Called with the transcript before the controller returns to `Idle`.
pub type TranscriptCallback = Arc<dyn Fn(String) + Send + Sync>;

/// How a capture session finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Transcript(String),
    /// Ended without a transcript (silence, timeout, transient error).
    Ended,
    Stopped,
    /// Permission was revoked; the controller is now `Unavailable`.
    Revoked(String),
}

/// A running capture session.
#[derive(Debug)]
pub struct CaptureHandle {
    pub id: u64,
    join: JoinHandle<CaptureOutcome>,
}

impl CaptureHandle {
    /// Wait for the session to finish.
    pub async fn outcome(self) -> CaptureOutcome {
        self.join.await.unwrap_or(CaptureOutcome::Ended)
    }
}

struct ActiveCapture {
    id: u64,
    stop: oneshot::Sender<()>,
}

struct CaptureShared {
    state: watch::Sender<VoiceCaptureState>,
    active: Mutex<Option<ActiveCapture>>,
}

impl CaptureShared {
    /// Release capture `id` and move to `next`, unless it was already released.
    fn finish(&self, id: u64, next: VoiceCaptureState) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
            self.state.send_replace(next);
            true
        } else {
            false
        }
    }
}

/// Resets an abandoned probe so the next call can claim it.
struct ProbeGuard<'a> {
    state: &'a watch::Sender<VoiceCaptureState>,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(VoiceCaptureState::Unchecked);
        }
    }
}

pub struct VoiceCaptureController {
    platform: Arc<dyn CapturePlatform>,
    shared: Arc<CaptureShared>,
    default_locale: String,
    next_capture: AtomicU64,
}

impl VoiceCaptureController {
    pub fn new(platform: Arc<dyn CapturePlatform>, default_locale: impl Into<String>) -> Self {
        let (state, _) = watch::channel(VoiceCaptureState::Unchecked);
        Self {
            platform,
            shared: Arc::new(CaptureShared {
                state,
                active: Mutex::new(None),
            }),
            default_locale: default_locale.into(),
            next_capture: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn state(&self) -> VoiceCaptureState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<VoiceCaptureState> {
        self.shared.state.subscribe()
    }

    /// Locale for `language`, or the configured default.
    #[must_use]
    pub fn resolve_locale(&self, language: &str) -> String {
        locale_for_language(language).map_or_else(|| self.default_locale.clone(), str::to_owned)
    }

    /// Check whether voice input can work and settle on `Idle` or
    /// `Unavailable`.
    ///
    /// Concurrent calls share one in-flight probe. While `Listening` the
    /// probe is skipped and the current state returned.
    pub async fn probe_availability(&self) -> VoiceCaptureState {
        let mut claimed = false;
        self.shared.state.send_if_modified(|state| match state {
            VoiceCaptureState::Checking | VoiceCaptureState::Listening => false,
            _ => {
                *state = VoiceCaptureState::Checking;
                claimed = true;
                true
            }
        });

        if !claimed {
            let mut rx = self.shared.state.subscribe();
            return match rx.wait_for(|s| *s != VoiceCaptureState::Checking).await {
                Ok(state) => state.clone(),
                Err(_) => self.state(),
            };
        }

        let mut guard = ProbeGuard {
            state: &self.shared.state,
            armed: true,
        };
        let outcome = self.run_checks().await;
        guard.armed = false;
        match &outcome {
            VoiceCaptureState::Unavailable(reason) => {
                info!(reason = %reason, "voice input unavailable");
            }
            _ => info!("voice input available"),
        }
        self.shared.state.send_replace(outcome.clone());
        outcome
    }

    async fn run_checks(&self) -> VoiceCaptureState {
        if !self.platform.is_secure_context() {
            return VoiceCaptureState::Unavailable(INSECURE_CONTEXT_REASON.to_owned());
        }
        if !self.platform.has_speech_recognition() {
            return VoiceCaptureState::Unavailable(NO_RECOGNITION_REASON.to_owned());
        }
        if !self.platform.has_media_devices() {
            return VoiceCaptureState::Unavailable(NO_MEDIA_DEVICES_REASON.to_owned());
        }
        match self.platform.probe_microphone().await {
            Ok(()) => VoiceCaptureState::Idle,
            Err(e) => {
                debug!(error = ?e, "microphone probe failed");
                VoiceCaptureState::Unavailable(e.reason().to_owned())
            }
        }
    }

    /// Open a single-utterance recognition session.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::CaptureRejected`] unless the controller is
    /// `Idle`, or the platform's error if the session could not open (the
    /// controller is back in `Idle` in that case).
    pub async fn start_listening(
        &self,
        language: &str,
        on_transcript: TranscriptCallback,
    ) -> Result<CaptureHandle> {
        let id = self.next_capture.fetch_add(1, Ordering::SeqCst);
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut active = self.shared.active.lock().unwrap_or_else(|e| e.into_inner());
            let current = self.shared.state.borrow().clone();
            if current != VoiceCaptureState::Idle {
                return Err(BuddyError::CaptureRejected(format!(
                    "voice capture is {current}"
                )));
            }
            *active = Some(ActiveCapture { id, stop: stop_tx });
            self.shared.state.send_replace(VoiceCaptureState::Listening);
        }

        let request = RecognitionRequest {
            locale: self.resolve_locale(language),
            continuous: false,
            interim_results: false,
        };
        info!(capture = id, locale = %request.locale, "listening");
        let session = match self.platform.start_recognition(&request).await {
            Ok(session) => session,
            Err(e) => {
                warn!(capture = id, error = %e, "recognition failed to start");
                self.shared.finish(id, VoiceCaptureState::Idle);
                return Err(e);
            }
        };

        let join = tokio::spawn(drive_capture(
            self.shared.clone(),
            id,
            session,
            stop_rx,
            on_transcript,
        ));
        Ok(CaptureHandle { id, join })
    }

    /// End the current session and return to `Idle`. No-op when not listening.
    pub fn stop_listening(&self) {
        let mut active = self.shared.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(capture) = active.take() {
            let _ = capture.stop.send(());
            self.shared.state.send_replace(VoiceCaptureState::Idle);
            info!(capture = capture.id, "listening stopped");
        }
    }
}

impl fmt::Debug for VoiceCaptureController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceCaptureController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn drive_capture(
    shared: Arc<CaptureShared>,
    id: u64,
    mut session: RecognitionSession,
    mut stop_rx: oneshot::Receiver<()>,
    on_transcript: TranscriptCallback,
) -> CaptureOutcome {
    tokio::select! {
        _ = &mut stop_rx => {
            session.stop();
            CaptureOutcome::Stopped
        }
        event = session.next_event() => match event {
            Some(RecognitionEvent::Result(text)) => {
                session.stop();
                debug!(capture = id, chars = text.len(), "transcript received");
                on_transcript(text.clone());
                shared.finish(id, VoiceCaptureState::Idle);
                CaptureOutcome::Transcript(text)
            }
            Some(RecognitionEvent::Error(err)) if err.is_permission_revoked() => {
                session.stop();
                warn!(capture = id, error = ?err, "microphone permission revoked");
                let reason = MICROPHONE_BLOCKED_REASON.to_owned();
                shared.finish(id, VoiceCaptureState::Unavailable(reason.clone()));
                CaptureOutcome::Revoked(reason)
            }
            Some(RecognitionEvent::Error(err)) => {
                session.stop();
                debug!(capture = id, error = ?err, "recognition error ignored");
                shared.finish(id, VoiceCaptureState::Idle);
                CaptureOutcome::Ended
            }
            Some(RecognitionEvent::End) | None => {
                shared.finish(id, VoiceCaptureState::Idle);
                CaptureOutcome::Ended
            }
        }
    }
}

// ── Scripted platform ────────────────────────────────────────────────────────

/// Capture platform driven by pre-recorded recognition sessions.
///
/// Each [`start_recognition`](CapturePlatform::start_recognition) call plays
/// the next queued script. A script that does not end with
/// [`RecognitionEvent::End`] keeps the session open until it is stopped.
pub struct ScriptedCapturePlatform {
    secure_context: bool,
    speech_recognition: bool,
    media_devices: bool,
    microphone: std::result::Result<(), MicrophoneError>,
    probe_delay: Duration,
    scripts: Mutex<VecDeque<Vec<RecognitionEvent>>>,
    requests: Mutex<Vec<RecognitionRequest>>,
    probes: AtomicU64,
}

impl Default for ScriptedCapturePlatform {
    fn default() -> Self {
        Self {
            secure_context: true,
            speech_recognition: true,
            media_devices: true,
            microphone: Ok(()),
            probe_delay: Duration::ZERO,
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            probes: AtomicU64::new(0),
        }
    }
}

impl ScriptedCapturePlatform {
    /// A platform where every capability is present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn insecure(mut self) -> Self {
        self.secure_context = false;
        self
    }

    #[must_use]
    pub fn without_recognition(mut self) -> Self {
        self.speech_recognition = false;
        self
    }

    #[must_use]
    pub fn without_media_devices(mut self) -> Self {
        self.media_devices = false;
        self
    }

    #[must_use]
    pub fn with_microphone_error(mut self, error: MicrophoneError) -> Self {
        self.microphone = Err(error);
        self
    }

    #[must_use]
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    /// Queue the events the next recognition session will emit.
    pub fn push_session(&self, events: Vec<RecognitionEvent>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(events);
    }

    #[must_use]
    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecognitionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CapturePlatform for ScriptedCapturePlatform {
    fn is_secure_context(&self) -> bool {
        self.secure_context
    }

    fn has_speech_recognition(&self) -> bool {
        self.speech_recognition
    }

    fn has_media_devices(&self) -> bool {
        self.media_devices
    }

    async fn probe_microphone(&self) -> std::result::Result<(), MicrophoneError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.microphone.clone()
    }

    async fn start_recognition(&self, request: &RecognitionRequest) -> Result<RecognitionSession> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();

        let (session, feed) = RecognitionSession::channel(script.len() + 1);
        tokio::spawn(async move {
            let RecognitionFeed { events, stopped } = feed;
            for event in script {
                if events.send(event).await.is_err() {
                    return;
                }
            }
            let _ = stopped.await;
        });
        Ok(session)
    }
}
