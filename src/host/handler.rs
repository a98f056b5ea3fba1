//! Production host handler: wires the session machine, the dashboard
//! conversation and the care actions to the command channel.

use crate::backend::Backend;
use crate::care::{CareDesk, HealthReading, SOS_NOTICE, SosAlert};
use crate::cohort::AgeCohort;
use crate::config::BuddyConfig;
use crate::conversation::DashboardConversationSession;
use crate::error::{BuddyError, Result};
use crate::host::channel::HostHandler;
use crate::host::contract::{CommandName, EventEnvelope, EventName};
use crate::onboarding::{AuthMode, OnboardingSessionMachine};
use crate::profile::{AvatarDraft, Profile, ProfileDraft, ProfilePatch};
use crate::speech::{
    CapturePlatform, MicrophoneError, RecognitionRequest, RecognitionSession,
    SpeechOutputController, SpeechSynthesizer, Utterance, VoiceCaptureController,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ── Shell-side platform adapters ─────────────────────────────────────────────

fn emit(
    event_tx: &broadcast::Sender<EventEnvelope>,
    event: EventName,
    payload: serde_json::Value,
) {
    // No subscriber is fine: the shell may not be listening yet.
    let _ = event_tx.send(EventEnvelope::new(event, payload));
}

/// Hands utterances to the native shell as `speech.utterance` events.
pub struct EventSynthesizer {
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl EventSynthesizer {
    #[must_use]
    pub fn new(event_tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { event_tx }
    }
}

impl SpeechSynthesizer for EventSynthesizer {
    fn speak(&self, utterance: &Utterance) -> Result<()> {
        let payload = serde_json::to_value(utterance)
            .map_err(|e| BuddyError::Speech(format!("failed to encode utterance: {e}")))?;
        emit(&self.event_tx, EventName::SpeechUtterance, payload);
        Ok(())
    }

    fn cancel(&self) {
        emit(&self.event_tx, EventName::SpeechCancelled, serde_json::json!({}));
    }
}

/// Capture platform for a shell that recognises speech itself and submits
/// transcripts with `conversation.transcript`.
///
/// It has no recognition of its own: `voice.probe` always reports
/// `unavailable` and `voice.start` is always refused. This is the platform
/// [`BuddyHost::from_config`] and the `buddy-host` binary use; embedders
/// with in-process recognition pass their own [`CapturePlatform`] to
/// [`BuddyHost::new`].
pub struct ShellCapturePlatform {
    secure_context: bool,
}

impl ShellCapturePlatform {
    #[must_use]
    pub fn new(secure_context: bool) -> Self {
        Self { secure_context }
    }
}

#[async_trait]
impl CapturePlatform for ShellCapturePlatform {
    fn is_secure_context(&self) -> bool {
        self.secure_context
    }

    fn has_speech_recognition(&self) -> bool {
        false
    }

    fn has_media_devices(&self) -> bool {
        false
    }

    async fn probe_microphone(&self) -> std::result::Result<(), MicrophoneError> {
        Err(MicrophoneError::NotFound)
    }

    async fn start_recognition(
        &self,
        _request: &RecognitionRequest,
    ) -> Result<RecognitionSession> {
        Err(BuddyError::CapabilityUnavailable(
            "in-process speech recognition".into(),
        ))
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

fn parse_payload<T: DeserializeOwned>(
    command: CommandName,
    payload: &serde_json::Value,
) -> Result<T> {
    let payload = if payload.is_null() {
        serde_json::json!({})
    } else {
        payload.clone()
    };
    serde_json::from_value(payload)
        .map_err(|e| BuddyError::Validation(format!("bad {} payload: {e}", command.as_str())))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| BuddyError::Channel(format!("failed to encode response: {e}")))
}

#[derive(Deserialize)]
struct ChooseAuthPayload {
    mode: String,
}

#[derive(Deserialize)]
struct CohortPayload {
    cohort: String,
}

#[derive(Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

/// Registration form; the cohort comes from the age-select step.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    parent_email: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    connect_device: bool,
}

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct HistoryPayload {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ReportPayload {
    #[serde(default)]
    report: String,
}

#[derive(Deserialize)]
struct SosPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

// ── Host ─────────────────────────────────────────────────────────────────────

struct ActiveConversation {
    session: Arc<DashboardConversationSession>,
    /// Profile fields the greeting and capture locale were built from.
    name: String,
    language: String,
    forwarders: Vec<JoinHandle<()>>,
}

impl ActiveConversation {
    fn built_for(&self, profile: &Profile) -> bool {
        self.name == profile.name && self.language == profile.language
    }
}

impl Drop for ActiveConversation {
    fn drop(&mut self) {
        for task in &self.forwarders {
            task.abort();
        }
    }
}

/// The companion core as seen by a native shell.
pub struct BuddyHost {
    config: BuddyConfig,
    machine: OnboardingSessionMachine,
    care: CareDesk,
    speech: Arc<SpeechOutputController>,
    capture: Arc<VoiceCaptureController>,
    conversation: Mutex<Option<ActiveConversation>>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl BuddyHost {
    /// Host over `backend`, capturing voice through `platform`.
    pub fn new(
        config: BuddyConfig,
        backend: Backend,
        platform: Arc<dyn CapturePlatform>,
        event_tx: broadcast::Sender<EventEnvelope>,
    ) -> Self {
        let speech = Arc::new(SpeechOutputController::from_config(
            Arc::new(EventSynthesizer::new(event_tx.clone())),
            &config.speech,
        ));
        let capture = Arc::new(VoiceCaptureController::new(
            platform,
            config.voice.default_locale.clone(),
        ));
        Self {
            care: CareDesk::new(Arc::clone(&backend.care)),
            machine: OnboardingSessionMachine::new(backend),
            speech,
            capture,
            conversation: Mutex::new(None),
            event_tx,
            config,
        }
    }

    /// Host with the configured backend and shell-side voice.
    ///
    /// Voice capture is left to the shell: see [`ShellCapturePlatform`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be constructed.
    pub fn from_config(
        config: BuddyConfig,
        event_tx: broadcast::Sender<EventEnvelope>,
    ) -> Result<Self> {
        let backend = Backend::from_config(&config.backend)?;
        let platform = Arc::new(ShellCapturePlatform::new(config.voice.secure_context));
        Ok(Self::new(config, backend, platform, event_tx))
    }

    #[must_use]
    pub fn machine(&self) -> &OnboardingSessionMachine {
        &self.machine
    }

    fn active_conversation(&self) -> Result<Arc<DashboardConversationSession>> {
        self.conversation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| Arc::clone(&c.session))
            .ok_or_else(|| BuddyError::InvalidTransition("no dashboard is open".into()))
    }

    /// Keep the conversation in step with the session: open it on the
    /// dashboard, rebuild it when the name or language changes, and drop it
    /// when the session leaves the dashboard.
    fn sync_conversation(&self) {
        let session = self.machine.session();
        let on_dashboard = session.stage.is_dashboard();
        let wanted = session.profile.filter(|_| on_dashboard);
        let mut active = self.conversation.lock().unwrap_or_else(|e| e.into_inner());
        match wanted {
            Some(profile) => {
                if active.as_ref().is_some_and(|c| c.built_for(&profile)) {
                    return;
                }
                if active.is_some() {
                    self.capture.stop_listening();
                    self.speech.cancel_speaking();
                    info!("profile changed; conversation restarted");
                }
                *active = Some(self.open_conversation(&profile));
            }
            None => {
                if active.take().is_some() {
                    self.speech.cancel_speaking();
                    self.capture.stop_listening();
                    info!("dashboard closed; conversation dropped");
                }
            }
        }
    }

    fn open_conversation(&self, profile: &Profile) -> ActiveConversation {
        let session = Arc::new(DashboardConversationSession::new(
            profile,
            Arc::clone(&self.speech),
            Arc::clone(&self.capture),
            &self.config.conversation,
        ));
        let forwarders = self.spawn_forwarders(&session);
        ActiveConversation {
            session,
            name: profile.name.clone(),
            language: profile.language.clone(),
            forwarders,
        }
    }

    fn spawn_forwarders(
        &self,
        conversation: &Arc<DashboardConversationSession>,
    ) -> Vec<JoinHandle<()>> {
        let mut turns = conversation.subscribe_turns();
        let event_tx = self.event_tx.clone();
        let turn_task = tokio::spawn(async move {
            loop {
                match turns.recv().await {
                    Ok(turn) => {
                        let payload = serde_json::to_value(&turn).unwrap_or_default();
                        emit(&event_tx, EventName::ConversationTurn, payload);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged = n, "turn forwarder lagged; some turns were not pushed");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let avatar = Arc::clone(conversation.avatar());
        let mut talking = avatar.subscribe();
        let event_tx = self.event_tx.clone();
        let avatar_task = tokio::spawn(async move {
            while talking.changed().await.is_ok() {
                let payload = serde_json::to_value(avatar.animation()).unwrap_or_default();
                emit(&event_tx, EventName::AvatarTalking, payload);
            }
        });
        vec![turn_task, avatar_task]
    }

    /// Await `run`, then publish the stage if it moved and bring the
    /// conversation in line with the session.
    async fn tracked<T>(&self, run: impl Future<Output = Result<T>>) -> Result<T> {
        let before = self.machine.stage();
        let result = run.await;
        let snapshot = self.machine.snapshot();
        if snapshot.stage != before {
            let payload = serde_json::to_value(&snapshot).unwrap_or_default();
            emit(&self.event_tx, EventName::SessionStage, payload);
        }
        self.sync_conversation();
        result
    }

    /// Run a session command and answer with the resulting snapshot.
    async fn session_command<T>(
        &self,
        run: impl Future<Output = Result<T>>,
    ) -> Result<serde_json::Value> {
        self.tracked(run).await?;
        encode(&self.machine.snapshot())
    }

    async fn handle_conversation(
        &self,
        command: CommandName,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let conversation = self.active_conversation()?;
        match command {
            CommandName::ConversationSendText | CommandName::ConversationTranscript => {
                let TextPayload { text } = parse_payload(command, payload)?;
                let reply = if command == CommandName::ConversationTranscript {
                    conversation.submit_transcript(&text).await
                } else {
                    conversation.submit_text(&text).await
                };
                Ok(serde_json::json!({ "reply": reply }))
            }
            CommandName::ConversationHistory => {
                let HistoryPayload { limit } = parse_payload(command, payload)?;
                let transcript = conversation.transcript();
                let skip = limit.map_or(0, |n| transcript.len().saturating_sub(n));
                Ok(serde_json::json!({
                    "dashboard": conversation.variant(),
                    "turns": &transcript[skip..],
                }))
            }
            CommandName::VoiceStart => {
                let task = conversation.begin_listening().await?;
                tokio::spawn(async move {
                    if let Ok(Some(turn)) = task.await {
                        debug!(chars = turn.text.chars().count(), "voice turn answered");
                    }
                });
                Ok(serde_json::json!({ "listening": true }))
            }
            CommandName::VoiceStop => {
                conversation.stop_listening();
                Ok(serde_json::json!({ "voice": self.capture.state() }))
            }
            CommandName::SpeechCancel => {
                conversation.cancel_speaking();
                Ok(serde_json::json!({ "cancelled": true }))
            }
            other => Err(BuddyError::Validation(format!(
                "{} is not a conversation command",
                other.as_str()
            ))),
        }
    }

    async fn handle_care(
        &self,
        command: CommandName,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let machine = &self.machine;
        match command {
            CommandName::CareRecordHealth => {
                let reading: HealthReading = parse_payload(command, payload)?;
                self.tracked(self.care.record_health(machine, &reading))
                    .await?;
                Ok(serde_json::json!({ "recorded": true }))
            }
            CommandName::CareHealthHistory => {
                let readings = self.tracked(self.care.health_history(machine)).await?;
                Ok(serde_json::json!({ "readings": readings }))
            }
            CommandName::CareParentReport => {
                let ReportPayload { report } = parse_payload(command, payload)?;
                self.tracked(self.care.send_parent_report(machine, &report))
                    .await?;
                Ok(serde_json::json!({ "sent": true }))
            }
            CommandName::CareSos => {
                let SosPayload { message, location } = parse_payload(command, payload)?;
                let alert = SosAlert::new(message, location);
                self.tracked(self.care.raise_sos(machine, &alert)).await?;
                Ok(serde_json::json!({ "sent": true, "notice": SOS_NOTICE }))
            }
            other => Err(BuddyError::Validation(format!(
                "{} is not a care command",
                other.as_str()
            ))),
        }
    }
}

#[async_trait]
impl HostHandler for BuddyHost {
    async fn handle(
        &self,
        command: CommandName,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let machine = &self.machine;
        match command {
            CommandName::HostPing | CommandName::HostVersion => Ok(serde_json::json!({})),
            CommandName::SessionGetState => encode(&machine.snapshot()),
            CommandName::SessionRestore => self.session_command(machine.restore()).await,
            CommandName::SessionLogo => {
                self.session_command(async { machine.activate_logo() }).await
            }
            CommandName::SessionChooseAuth => {
                let ChooseAuthPayload { mode } = parse_payload(command, payload)?;
                let mode = AuthMode::parse(&mode).ok_or_else(|| {
                    BuddyError::Validation(format!("unknown auth mode {mode:?}"))
                })?;
                self.session_command(async { machine.choose_auth(mode) }).await
            }
            CommandName::SessionBack => self.session_command(async { machine.back() }).await,
            CommandName::SessionSelectCohort => {
                let CohortPayload { cohort } = parse_payload(command, payload)?;
                let cohort = AgeCohort::parse(&cohort).ok_or_else(|| {
                    BuddyError::Validation(format!("unknown age cohort {cohort:?}"))
                })?;
                self.session_command(async { machine.select_cohort(cohort) })
                    .await
            }
            CommandName::SessionLogin => {
                let LoginPayload { email, password } = parse_payload(command, payload)?;
                self.session_command(machine.login(&email, &password)).await
            }
            CommandName::SessionRegister => {
                let form: RegisterPayload = parse_payload(command, payload)?;
                let draft = ProfileDraft {
                    name: form.name,
                    email: form.email,
                    password: form.password,
                    // Replaced by the cohort chosen on the age-select step.
                    age_cohort: AgeCohort::Adult,
                    parent_email: form.parent_email,
                    language: form.language.unwrap_or_else(|| "English".to_owned()),
                    connect_device: form.connect_device,
                };
                self.session_command(machine.register(draft)).await
            }
            CommandName::SessionCompleteAvatar => {
                let draft: AvatarDraft = parse_payload(command, payload)?;
                self.session_command(machine.complete_avatar(draft)).await
            }
            CommandName::SessionUpdateProfile => {
                let patch: ProfilePatch = parse_payload(command, payload)?;
                self.session_command(machine.update_profile(patch)).await
            }
            CommandName::SessionLogout => {
                self.session_command(async {
                    machine.logout().await;
                    Ok(())
                })
                .await
            }
            CommandName::VoiceProbe => {
                let state = self.capture.probe_availability().await;
                Ok(serde_json::json!({ "voice": state }))
            }
            CommandName::ConversationSendText
            | CommandName::ConversationTranscript
            | CommandName::ConversationHistory
            | CommandName::VoiceStart
            | CommandName::VoiceStop
            | CommandName::SpeechCancel => self.handle_conversation(command, payload).await,
            CommandName::CareRecordHealth
            | CommandName::CareHealthHistory
            | CommandName::CareParentReport
            | CommandName::CareSos => self.handle_care(command, payload).await,
        }
    }
}

impl std::fmt::Debug for BuddyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuddyHost")
            .field("stage", &self.machine.stage())
            .finish_non_exhaustive()
    }
}
