//! Dashboard chat: transcript, turn-taking and the speak/animate hand-off.
//!
//! A submitted message is appended as a user turn straight away. The reply is
//! chosen at the same moment but appended only after the thinking delay, and
//! replies are released in submission order: a later message never overtakes
//! an earlier one.

use crate::avatar_sync::TalkingAvatarSync;
use crate::cohort::{AgeCohort, DashboardVariant};
use crate::config::ConversationConfig;
use crate::error::Result;
use crate::profile::Profile;
use crate::response::ResponseEngine;
use crate::speech::{SpeechOutputController, VoiceCaptureController};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const TURN_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Companion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationTurn {
    fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    fn companion(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Companion,
            text: text.into(),
        }
    }
}

/// One dashboard's conversation with the signed-in user.
pub struct DashboardConversationSession {
    cohort: AgeCohort,
    variant: DashboardVariant,
    language: String,
    thinking_delay: Duration,
    transcript: Mutex<Vec<ConversationTurn>>,
    engine: Mutex<ResponseEngine>,
    /// Serialises reply release so replies land in submission order.
    reply_gate: tokio::sync::Mutex<()>,
    speech: Arc<SpeechOutputController>,
    capture: Arc<VoiceCaptureController>,
    avatar: Arc<TalkingAvatarSync>,
    turns_tx: broadcast::Sender<ConversationTurn>,
}

impl DashboardConversationSession {
    /// Start a fresh session seeded with the dashboard's greeting.
    pub fn new(
        profile: &Profile,
        speech: Arc<SpeechOutputController>,
        capture: Arc<VoiceCaptureController>,
        config: &ConversationConfig,
    ) -> Self {
        Self::with_engine(profile, speech, capture, config, ResponseEngine::new())
    }

    /// Like [`Self::new`] with a caller-supplied engine, e.g. seeded for tests.
    pub fn with_engine(
        profile: &Profile,
        speech: Arc<SpeechOutputController>,
        capture: Arc<VoiceCaptureController>,
        config: &ConversationConfig,
        engine: ResponseEngine,
    ) -> Self {
        let cohort = profile.age_cohort;
        let variant = cohort.dashboard();
        let greeting = variant.greeting(&profile.name, &profile.language);
        let (turns_tx, _) = broadcast::channel(TURN_CHANNEL_CAPACITY);
        info!(cohort = %cohort, dashboard = variant.as_str(), "conversation started");

        Self {
            cohort,
            variant,
            language: profile.language.clone(),
            thinking_delay: Duration::from_millis(config.thinking_delay_ms),
            transcript: Mutex::new(vec![ConversationTurn::companion(greeting)]),
            engine: Mutex::new(engine),
            reply_gate: tokio::sync::Mutex::new(()),
            speech,
            capture,
            avatar: Arc::new(TalkingAvatarSync::new(variant.voice_emotion())),
            turns_tx,
        }
    }

    #[must_use]
    pub fn cohort(&self) -> AgeCohort {
        self.cohort
    }

    #[must_use]
    pub fn variant(&self) -> DashboardVariant {
        self.variant
    }

    #[must_use]
    pub fn avatar(&self) -> &Arc<TalkingAvatarSync> {
        &self.avatar
    }

    #[must_use]
    pub fn capture(&self) -> &Arc<VoiceCaptureController> {
        &self.capture
    }

    /// Turns as they are appended, greeting excluded.
    pub fn subscribe_turns(&self) -> broadcast::Receiver<ConversationTurn> {
        self.turns_tx.subscribe()
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Vec<ConversationTurn>> {
        self.transcript.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.lock_transcript().clone()
    }

    fn append(&self, turn: ConversationTurn) {
        self.lock_transcript().push(turn.clone());
        // No subscribers is fine.
        let _ = self.turns_tx.send(turn);
    }

    /// Submit a typed message and wait for the companion's reply.
    ///
    /// Blank input is ignored and yields `None`.
    pub async fn submit_text(&self, text: &str) -> Option<ConversationTurn> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let due = Instant::now() + self.thinking_delay;
        let reply = self
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .select_response(text, self.cohort);
        self.append(ConversationTurn::user(text));

        let _gate = self.reply_gate.lock().await;
        tokio::time::sleep_until(due).await;
        let turn = ConversationTurn::companion(reply);
        self.append(turn.clone());
        self.speak(&turn.text);
        Some(turn)
    }

    /// Submit a recognised utterance. Same path as typed text.
    pub async fn submit_transcript(&self, transcript: &str) -> Option<ConversationTurn> {
        debug!(chars = transcript.chars().count(), "voice transcript submitted");
        self.submit_text(transcript).await
    }

    fn speak(&self, text: &str) {
        match self.speech.speak(text, self.cohort) {
            Ok(utterance) => self.avatar.on_speak(utterance.estimated),
            Err(e) => warn!(error = %e, "reply not spoken; avatar stays idle"),
        }
    }

    /// Open a capture whose transcript callback feeds the returned channel.
    ///
    /// The channel closes once the capture finishes, with or without speech.
    async fn start_capture(&self) -> Result<mpsc::UnboundedReceiver<String>> {
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let handle = self
            .capture
            .start_listening(
                &self.language,
                Arc::new(move |transcript: String| {
                    // Receiver gone means the listener was dropped.
                    let _ = transcript_tx.send(transcript);
                }),
            )
            .await?;
        debug!(capture = handle.id, "conversation listening");
        Ok(transcript_rx)
    }

    async fn answer(
        &self,
        mut transcripts: mpsc::UnboundedReceiver<String>,
    ) -> Option<ConversationTurn> {
        let transcript = transcripts.recv().await?;
        self.submit_transcript(&transcript).await
    }

    /// Listen for one utterance in the profile's language and answer it.
    ///
    /// Returns `Ok(None)` when the capture ended without speech or was
    /// stopped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BuddyError::CaptureRejected`] unless the capture
    /// controller is idle, or the platform's error if recognition could not
    /// start.
    pub async fn listen_once(&self) -> Result<Option<ConversationTurn>> {
        let transcripts = self.start_capture().await?;
        Ok(self.answer(transcripts).await)
    }

    /// Start listening and answer in the background.
    ///
    /// Errors opening the session are returned here; the task yields the
    /// companion's reply, if any.
    pub async fn begin_listening(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Option<ConversationTurn>>> {
        let transcripts = self.start_capture().await?;
        let session = Arc::clone(self);
        Ok(tokio::spawn(async move { session.answer(transcripts).await }))
    }

    pub fn stop_listening(&self) {
        self.capture.stop_listening();
    }

    /// Silence the companion and stop the talking animation.
    pub fn cancel_speaking(&self) {
        self.speech.cancel_speaking();
        self.avatar.stop();
    }
}

impl std::fmt::Debug for DashboardConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardConversationSession")
            .field("cohort", &self.cohort)
            .field("turns", &self.lock_transcript().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::avatar_sync::Emotion;
    use crate::config::SpeechConfig;
    use crate::response::PATTERNS;
    use crate::speech::{
        RecognitionEvent, RecordingSynthesizer, ScriptedCapturePlatform, SpeechSynthesizer,
        Utterance, VoiceCaptureState,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Fixture {
        synth: Arc<RecordingSynthesizer>,
        platform: Arc<ScriptedCapturePlatform>,
        session: Arc<DashboardConversationSession>,
    }

    fn profile(cohort: AgeCohort) -> Profile {
        Profile {
            id: "u1".into(),
            name: "Sam".into(),
            email: "sam@example.com".into(),
            age_cohort: cohort,
            parent_email: Some("p@example.com".into()),
            language: "English".into(),
            habits: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn fixture(cohort: AgeCohort) -> Fixture {
        let synth = Arc::new(RecordingSynthesizer::new());
        let platform = Arc::new(ScriptedCapturePlatform::new());
        let speech = Arc::new(SpeechOutputController::from_config(
            synth.clone(),
            &SpeechConfig::default(),
        ));
        let capture = Arc::new(VoiceCaptureController::new(platform.clone(), "en-US"));
        let session = Arc::new(DashboardConversationSession::with_engine(
            &profile(cohort),
            speech,
            capture,
            &ConversationConfig::default(),
            ResponseEngine::with_rng(StdRng::seed_from_u64(7)),
        ));
        Fixture {
            synth,
            platform,
            session,
        }
    }

    fn pool(name: &str, cohort: AgeCohort) -> &'static [&'static str] {
        PATTERNS
            .iter()
            .find(|p| p.name == name)
            .unwrap()
            .responses
            .for_set(cohort.response_set())
    }

    #[tokio::test(start_paused = true)]
    async fn greeting_is_seeded() {
        let f = fixture(AgeCohort::Kids);
        let transcript = f.session.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].speaker, Speaker::Companion);
        assert_eq!(transcript[0].text, "Hi Sam! How are you feeling today? 😊");
        assert_eq!(f.session.avatar().emotion(), Emotion::Happy);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_arrives_after_thinking_delay_and_is_spoken() {
        let f = fixture(AgeCohort::Senior);
        let start = Instant::now();
        let reply = f.session.submit_text("I feel lonely and sad").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert!(pool("sad", AgeCohort::Senior).contains(&reply.text.as_str()));

        let transcript = f.session.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1], ConversationTurn::user("I feel lonely and sad"));
        assert_eq!(transcript[2], reply);

        let spoken = f.synth.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, reply.text);
        assert!(f.session.avatar().is_talking());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_input_is_ignored() {
        let f = fixture(AgeCohort::Adult);
        assert!(f.session.submit_text("   ").await.is_none());
        assert_eq!(f.session.transcript().len(), 1);
        assert!(f.synth.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replies_keep_submission_order() {
        let f = fixture(AgeCohort::Teens);
        let start = Instant::now();
        let (first, second) = tokio::join!(
            f.session.submit_text("tell me a joke"),
            f.session.submit_text("so tired today"),
        );
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        let speakers: Vec<_> = f
            .session
            .transcript()
            .iter()
            .map(|t| t.speaker)
            .collect();
        assert_eq!(
            speakers,
            [
                Speaker::Companion,
                Speaker::User,
                Speaker::User,
                Speaker::Companion,
                Speaker::Companion
            ]
        );
        let transcript = f.session.transcript();
        assert_eq!(transcript[3], first.unwrap());
        assert_eq!(transcript[4], second.unwrap());
        assert!(pool("joke", AgeCohort::Teens).contains(&transcript[3].text.as_str()));
        assert!(pool("tired", AgeCohort::Teens).contains(&transcript[4].text.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn voice_transcript_gets_answered() {
        let f = fixture(AgeCohort::Kids);
        f.platform.push_session(vec![
            RecognitionEvent::Result("hello buddy".into()),
            RecognitionEvent::End,
        ]);
        assert_eq!(
            f.session.capture().probe_availability().await,
            VoiceCaptureState::Idle
        );
        let reply = f.session.listen_once().await.unwrap().unwrap();
        assert!(pool("greeting", AgeCohort::Kids).contains(&reply.text.as_str()));
        assert_eq!(f.session.transcript()[1].text, "hello buddy");
        assert_eq!(f.platform.requests()[0].locale, "en-US");
        assert_eq!(f.session.capture().state(), VoiceCaptureState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn background_transcript_is_appended_when_recognised() {
        let f = fixture(AgeCohort::Senior);
        // Result with no End: the platform session would stay open.
        f.platform
            .push_session(vec![RecognitionEvent::Result("good night".into())]);
        f.session.capture().probe_availability().await;
        let mut turns = f.session.subscribe_turns();

        let task = f.session.begin_listening().await.unwrap();
        let start = Instant::now();
        assert_eq!(turns.recv().await.unwrap(), ConversationTurn::user("good night"));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(f.session.capture().state(), VoiceCaptureState::Idle);

        let reply = task.await.unwrap().unwrap();
        assert_eq!(turns.recv().await.unwrap(), reply);
        assert_eq!(f.synth.spoken()[0].text, reply.text);
    }

    #[tokio::test(start_paused = true)]
    async fn listen_requires_idle_capture() {
        let f = fixture(AgeCohort::Adult);
        let err = f.session.listen_once().await.unwrap_err();
        assert!(matches!(err, crate::BuddyError::CaptureRejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_speaking_stops_avatar() {
        let f = fixture(AgeCohort::Adult);
        f.session.submit_text("hi").await.unwrap();
        assert!(f.session.avatar().is_talking());
        f.session.cancel_speaking();
        assert!(!f.session.avatar().is_talking());
        assert_eq!(f.synth.cancel_count(), 1);
    }

    struct BrokenSynth;

    impl SpeechSynthesizer for BrokenSynth {
        fn speak(&self, _: &Utterance) -> Result<()> {
            Err(crate::BuddyError::Speech("no voices".into()))
        }

        fn cancel(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_failure_keeps_reply_in_transcript() {
        let speech = Arc::new(SpeechOutputController::from_config(
            Arc::new(BrokenSynth),
            &SpeechConfig::default(),
        ));
        let capture = Arc::new(VoiceCaptureController::new(
            Arc::new(ScriptedCapturePlatform::new()),
            "en-US",
        ));
        let session = DashboardConversationSession::new(
            &profile(AgeCohort::Adult),
            speech,
            capture,
            &ConversationConfig::default(),
        );
        assert!(session.submit_text("happy day").await.is_some());
        assert_eq!(session.transcript().len(), 3);
        assert!(!session.avatar().is_talking());
    }
}
