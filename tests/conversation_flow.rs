#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use buddy::config::{ConversationConfig, SpeechConfig};
use buddy::speech::capture::{MICROPHONE_BLOCKED_REASON, MICROPHONE_NOT_FOUND_REASON};
use buddy::speech::{
    MicrophoneError, RecognitionError, RecognitionEvent, RecordingSynthesizer,
    ScriptedCapturePlatform, SpeechOutputController, VoiceCaptureController, VoiceCaptureState,
};
use buddy::{AgeCohort, BuddyError, DashboardConversationSession, Profile, Speaker};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Dashboard {
    synth: Arc<RecordingSynthesizer>,
    platform: Arc<ScriptedCapturePlatform>,
    speech: Arc<SpeechOutputController>,
    session: Arc<DashboardConversationSession>,
}

fn profile(cohort: AgeCohort, language: &str) -> Profile {
    Profile {
        id: "user-1".into(),
        name: "Lakshmi".into(),
        email: "lakshmi@example.com".into(),
        age_cohort: cohort,
        parent_email: Some("family@example.com".into()),
        language: language.into(),
        habits: None,
        created_at: None,
        updated_at: None,
    }
}

fn dashboard(cohort: AgeCohort, language: &str, platform: ScriptedCapturePlatform) -> Dashboard {
    let synth = Arc::new(RecordingSynthesizer::new());
    let platform = Arc::new(platform);
    let speech = Arc::new(SpeechOutputController::from_config(
        synth.clone(),
        &SpeechConfig::default(),
    ));
    let capture = Arc::new(VoiceCaptureController::new(platform.clone(), "en-US"));
    let session = Arc::new(DashboardConversationSession::new(
        &profile(cohort, language),
        speech.clone(),
        capture,
        &ConversationConfig::default(),
    ));
    Dashboard {
        synth,
        platform,
        speech,
        session,
    }
}

#[tokio::test(start_paused = true)]
async fn avatar_talks_for_estimated_duration_of_reply() {
    let d = dashboard(AgeCohort::Senior, "English", ScriptedCapturePlatform::new());
    let reply = d.session.submit_text("good morning").await.unwrap();
    let replied_at = Instant::now();
    let expected = d.speech.estimate_duration(&reply.text);

    let spoken = d.synth.spoken();
    assert_eq!(spoken[0].params.rate, 0.85);
    assert_eq!(spoken[0].estimated, expected);

    let mut talking = d.session.avatar().subscribe();
    talking.wait_for(|t| !*t).await.unwrap();
    assert_eq!(replied_at.elapsed(), expected);
}

#[tokio::test(start_paused = true)]
async fn blocked_microphone_leaves_text_chat_working() {
    let d = dashboard(
        AgeCohort::Kids,
        "English",
        ScriptedCapturePlatform::new().with_microphone_error(MicrophoneError::PermissionDenied),
    );
    let state = d.session.capture().probe_availability().await;
    assert_eq!(state.reason(), Some(MICROPHONE_BLOCKED_REASON));

    let err = d.session.listen_once().await.unwrap_err();
    assert!(matches!(err, BuddyError::CaptureRejected(_)));

    let reply = d.session.submit_text("I am so happy").await.unwrap();
    assert_eq!(reply.speaker, Speaker::Companion);
}

#[tokio::test(start_paused = true)]
async fn missing_microphone_has_its_own_reason() {
    let d = dashboard(
        AgeCohort::Adult,
        "English",
        ScriptedCapturePlatform::new().with_microphone_error(MicrophoneError::NotFound),
    );
    let state = d.session.capture().probe_availability().await;
    assert_eq!(
        state,
        VoiceCaptureState::Unavailable(MICROPHONE_NOT_FOUND_REASON.into())
    );
}

#[tokio::test(start_paused = true)]
async fn revoked_permission_mid_capture_disables_voice() {
    let d = dashboard(AgeCohort::Teens, "English", ScriptedCapturePlatform::new());
    d.platform.push_session(vec![RecognitionEvent::Error(RecognitionError::NotAllowed)]);
    d.session.capture().probe_availability().await;

    assert!(d.session.listen_once().await.unwrap().is_none());
    assert_eq!(
        d.session.capture().state(),
        VoiceCaptureState::Unavailable(MICROPHONE_BLOCKED_REASON.into())
    );
    assert_eq!(d.session.transcript().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_speech_is_not_an_error() {
    let d = dashboard(AgeCohort::Adult, "English", ScriptedCapturePlatform::new());
    d.platform.push_session(vec![RecognitionEvent::Error(RecognitionError::NoSpeech)]);
    d.session.capture().probe_availability().await;

    assert!(d.session.listen_once().await.unwrap().is_none());
    assert_eq!(d.session.capture().state(), VoiceCaptureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn stop_listening_ends_background_capture() {
    let d = dashboard(AgeCohort::Adult, "Telugu", ScriptedCapturePlatform::new());
    // No End event: the session stays open until stopped.
    d.platform.push_session(Vec::new());
    d.session.capture().probe_availability().await;

    let task = d.session.begin_listening().await.unwrap();
    assert_eq!(d.session.capture().state(), VoiceCaptureState::Listening);
    assert!(matches!(
        d.session.begin_listening().await.unwrap_err(),
        BuddyError::CaptureRejected(_)
    ));

    d.session.stop_listening();
    assert!(task.await.unwrap().is_none());
    assert_eq!(d.session.capture().state(), VoiceCaptureState::Idle);
    assert_eq!(d.platform.requests()[0].locale, "te-IN");
    assert!(!d.platform.requests()[0].continuous);
}

#[tokio::test(start_paused = true)]
async fn new_reply_interrupts_previous_speech() {
    let d = dashboard(AgeCohort::Kids, "English", ScriptedCapturePlatform::new());
    let start = Instant::now();
    d.session.submit_text("tell me a story").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    d.session.submit_text("now a joke").await.unwrap();

    assert_eq!(d.synth.spoken().len(), 2);
    assert_eq!(d.synth.cancel_count(), 1);
    assert_eq!(start.elapsed(), Duration::from_millis(2200));
    assert!(d.session.avatar().is_talking());
}
