//! Hosted backend contract tests.
//!
//! Verify the request shapes the HTTP backend sends to the auth service and
//! the profile/avatar edge functions, and how their error responses map onto
//! `BuddyError`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use buddy::backend::{
    AuthSession, AvatarStore, Backend, CareStore, DeviceLink, DeviceLinkStore, HttpBackend,
    IdentityProvider, ProfileStore,
};
use buddy::config::{BackendConfig, BackendMode};
use buddy::onboarding::{AuthMode, OnboardingStage};
use buddy::{
    AgeCohort, Avatar, BuddyError, DashboardVariant, HealthReading, OnboardingSessionMachine,
    ProfileDraft, ProfilePatch, SosAlert,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FUNCTIONS: &str = "/functions/v1/make-server-c520032d";

fn config(server: &MockServer) -> BackendConfig {
    BackendConfig {
        mode: BackendMode::Http,
        base_url: server.uri(),
        anon_key: "anon-key".into(),
        ..BackendConfig::default()
    }
}

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&config(server)).unwrap()
}

fn auth() -> AuthSession {
    AuthSession {
        token: "user-token".into(),
        user_id: "u1".into(),
        expires_at: None,
    }
}

fn profile_json() -> serde_json::Value {
    json!({
        "id": "u1",
        "name": "Noor",
        "email": "noor@example.com",
        "ageGroup": "13-17",
        "parentEmail": "dad@example.com",
        "language": "Hindi"
    })
}

fn draft() -> ProfileDraft {
    ProfileDraft {
        name: "Noor".into(),
        email: "noor@example.com".into(),
        password: "secret".into(),
        age_cohort: AgeCohort::Teens,
        parent_email: Some("dad@example.com".into()),
        language: "Hindi".into(),
        connect_device: false,
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-token",
            "expires_in": 3600,
            "user": {"id": "u1"}
        })))
        .mount(server)
        .await;
}

// ── Identity ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_sends_age_group_and_returns_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/register")))
        .and(header("authorization", "Bearer anon-key"))
        .and(body_partial_json(json!({
            "email": "noor@example.com",
            "ageGroup": "13-17",
            "parentEmail": "dad@example.com",
            "language": "Hindi"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": "u1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let user_id = backend(&server).create_account(&draft()).await.unwrap();
    assert_eq!(user_id, "u1");
}

#[tokio::test]
async fn register_conflict_maps_to_duplicate_account() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/register")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "A user with this email address has already been registered"
        })))
        .mount(&server)
        .await;

    let err = backend(&server).create_account(&draft()).await.unwrap_err();
    assert!(matches!(err, BuddyError::DuplicateAccount(_)));
}

#[tokio::test]
async fn register_other_rejection_is_validation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/register")))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"msg": "Password is too weak"})),
        )
        .mount(&server)
        .await;

    let err = backend(&server).create_account(&draft()).await.unwrap_err();
    match err {
        BuddyError::Validation(message) => assert_eq!(message, "Password is too weak"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn authenticate_holds_session_until_sign_out() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    assert!(backend.current_session().await.unwrap().is_none());

    let session = backend.authenticate("noor@example.com", "secret").await.unwrap();
    assert_eq!(session.token, "user-token");
    assert_eq!(session.user_id, "u1");
    assert!(session.expires_at.is_some());
    assert_eq!(backend.current_session().await.unwrap(), Some(session));

    backend.sign_out().await.unwrap();
    assert!(backend.current_session().await.unwrap().is_none());
}

#[tokio::test]
async fn oversized_token_lifetime_means_no_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-token",
            "expires_in": i64::MAX,
            "user": {"id": "u1"}
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let session = backend.authenticate("noor@example.com", "secret").await.unwrap();
    assert_eq!(session.expires_at, None);
    assert_eq!(backend.current_session().await.unwrap(), Some(session));
}

#[tokio::test]
async fn bad_password_is_invalid_credentials_with_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let err = backend(&server)
        .authenticate("noor@example.com", "nope")
        .await
        .unwrap_err();
    match err {
        BuddyError::InvalidCredentials(message) => {
            assert_eq!(message, "Invalid login credentials");
        }
        other => panic!("expected invalid credentials, got {other:?}"),
    }
}

// ── Stores ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn profile_round_trip_uses_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/profile")))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"profile": profile_json()})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/profile")))
        .and(body_partial_json(json!({"habits": "Chess club on Fridays"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "profile": {
                "id": "u1",
                "name": "Noor",
                "email": "noor@example.com",
                "ageGroup": "13-17",
                "habits": "Chess club on Fridays"
            }
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let profile = backend.get_profile(&auth()).await.unwrap().unwrap();
    assert_eq!(profile.age_cohort, AgeCohort::Teens);
    assert_eq!(profile.language, "Hindi");

    let merged = backend
        .merge_profile(
            &auth(),
            &ProfilePatch {
                habits: Some("Chess club on Fridays".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(merged.habits.as_deref(), Some("Chess club on Fridays"));
    assert_eq!(merged.language, "English");
}

#[tokio::test]
async fn missing_profile_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/profile")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"profile": null})))
        .mount(&server)
        .await;

    assert!(backend(&server).get_profile(&auth()).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/avatar")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})))
        .mount(&server)
        .await;

    let err = backend(&server).get_avatar(&auth()).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn server_failure_is_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/avatar")))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "Failed to fetch avatar"})),
        )
        .mount(&server)
        .await;

    let err = backend(&server).get_avatar(&auth()).await.unwrap_err();
    match err {
        BuddyError::Backend(message) => assert!(message.contains("Failed to fetch avatar")),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn avatar_is_wrapped_with_its_name() {
    let server = MockServer::start().await;
    let avatar = Avatar {
        favorite_color: "Purple".into(),
        character: "Playful Dog".into(),
        personality: "Caring".into(),
        name: "Pepper".into(),
        emoji: "🐶".into(),
    };
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/avatar")))
        .and(body_partial_json(json!({
            "avatarName": "Pepper",
            "avatarData": {"favoriteColor": "Purple", "emoji": "🐶"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/avatar")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "avatar": {"avatarData": avatar, "avatarName": "Pepper"}
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    backend.put_avatar(&auth(), &avatar).await.unwrap();
    assert_eq!(backend.get_avatar(&auth()).await.unwrap(), Some(avatar));
}

#[tokio::test]
async fn device_link_posts_to_iot_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/iot-connect")))
        .and(body_partial_json(json!({"deviceType": "smartwatch"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let link = DeviceLink::smartwatch(chrono::Utc::now());
    backend(&server).link_device(&auth(), &link).await.unwrap();
}

// ── Care ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_readings_post_and_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/health-data")))
        .and(header("authorization", "Bearer user-token"))
        .and(body_partial_json(json!({"heartRate": 72, "steps": 8432})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/health-data")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "healthData": [{
                "userId": "u1",
                "heartRate": 72,
                "steps": 8432,
                "timestamp": "2026-03-02T08:30:00Z"
            }]
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let reading = HealthReading {
        heart_rate: Some(72),
        steps: Some(8432),
        ..Default::default()
    };
    backend.record_health(&auth(), &reading).await.unwrap();

    let history = backend.health_history(&auth()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reading, reading);
    assert_eq!(history[0].timestamp.to_rfc3339(), "2026-03-02T08:30:00+00:00");
}

#[tokio::test]
async fn parent_report_and_sos_post_their_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/parent-report")))
        .and(body_partial_json(json!({"report": "Finished the reading challenge"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/sos")))
        .and(header("authorization", "Bearer user-token"))
        .and(body_partial_json(json!({"message": "Fell in the hall", "location": "Home"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "SOS alert sent"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    backend
        .send_parent_report(&auth(), "Finished the reading challenge")
        .await
        .unwrap();
    let alert = SosAlert::new(Some("Fell in the hall".into()), Some("Home".into()));
    backend.raise_sos(&auth(), &alert).await.unwrap();
}

#[tokio::test]
async fn rejected_token_on_sos_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/sos")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})))
        .mount(&server)
        .await;

    let err = backend(&server)
        .raise_sos(&auth(), &SosAlert::new(None, None))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

// ── Through the session machine ──────────────────────────────────────────────

#[tokio::test]
async fn login_against_hosted_backend_opens_dashboard() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/profile")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"profile": profile_json()})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{FUNCTIONS}/avatar")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "avatar": {"avatarData": {
                "favoriteColor": "Red",
                "character": "Playful Dog",
                "personality": "Cheerful",
                "name": "Bolt",
                "emoji": "🐶"
            }}
        })))
        .mount(&server)
        .await;

    let machine = OnboardingSessionMachine::new(Backend::from_shared(Arc::new(backend(&server))));
    machine.choose_auth(AuthMode::Login).unwrap();
    let stage = machine.login("noor@example.com", "secret").await.unwrap();
    assert_eq!(
        stage,
        OnboardingStage::Dashboard {
            variant: DashboardVariant::Teens
        }
    );
    assert_eq!(machine.session().avatar.unwrap().name, "Bolt");
}

#[tokio::test]
async fn registration_stores_profile_with_the_account() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/register")))
        .and(body_partial_json(json!({"name": "Noor", "ageGroup": "13-17"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": "u1"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{FUNCTIONS}/profile")))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let machine = OnboardingSessionMachine::new(Backend::from_shared(Arc::new(backend(&server))));
    machine.choose_auth(AuthMode::Register).unwrap();
    machine.select_cohort(AgeCohort::Teens).unwrap();
    let stage = machine.register(draft()).await.unwrap();
    assert_eq!(stage, OnboardingStage::CreatingAvatar);
    let profile = machine.session().profile.unwrap();
    assert_eq!(profile.id, "u1");
    assert_eq!(profile.age_cohort, AgeCohort::Teens);
}

#[tokio::test]
async fn config_selects_http_backend() {
    let server = MockServer::start().await;
    assert!(Backend::from_config(&config(&server)).is_ok());

    let missing_url = BackendConfig {
        mode: BackendMode::Http,
        ..BackendConfig::default()
    };
    assert!(matches!(
        Backend::from_config(&missing_url).err().unwrap(),
        BuddyError::Config(_)
    ));
}
