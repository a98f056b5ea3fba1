//! Hosted backend over HTTPS.
//!
//! Password authentication goes to the auth service at
//! `/auth/v1/token?grant_type=password`; registration, profile, avatar,
//! device-link and care calls go to the edge functions under
//! [`BackendConfig::functions_path`]. Every authenticated call sends
//! `Authorization: Bearer <token>`, and any HTTP 401 maps to
//! [`BuddyError::Unauthorized`].

use super::{
    AuthSession, AvatarStore, CareStore, DeviceLink, DeviceLinkStore, IdentityProvider,
    ProfileStore,
};
use crate::care::{HealthReading, HealthRecord, SosAlert};
use crate::config::BackendConfig;
use crate::error::{BuddyError, Result};
use crate::profile::{Avatar, Profile, ProfileDraft, ProfilePatch};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Backend client for the hosted edge-function API.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    functions_path: String,
    /// Session held by the provider after the last successful authenticate.
    session: Mutex<Option<AuthSession>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAvatar {
    avatar_data: Avatar,
}

#[derive(Debug, Deserialize)]
struct AvatarEnvelope {
    #[serde(default)]
    avatar: Option<StoredAvatar>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthEnvelope {
    #[serde(default)]
    health_data: Vec<HealthRecord>,
}

/// Error body shapes used by the auth service and the edge functions.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl HttpBackend {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Config`] when `base_url` is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(BuddyError::Config("backend.base_url is required".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| BuddyError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            anon_key: config.anon_key.clone(),
            functions_path: config.functions_path.trim_matches('/').to_owned(),
            session: Mutex::new(None),
        })
    }

    fn function_url(&self, name: &str) -> String {
        if self.functions_path.is_empty() {
            format!("{}/{name}", self.base_url)
        } else {
            format!("{}/{}/{name}", self.base_url, self.functions_path)
        }
    }

    fn store_session(&self, session: Option<AuthSession>) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = session;
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| BuddyError::Backend(format!("request failed: {e}")))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(BuddyError::Unauthorized);
        }
        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            return Err(BuddyError::Backend(format!("{status}: {message}")));
        }
        Ok(response)
    }

    async fn json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| BuddyError::Backend(format!("malformed response body: {e}")))
    }
}

/// `None` when the lifetime does not fit a timestamp; such a token never expires.
fn expiry_from_now(secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            } else {
                text
            }
        })
}

#[async_trait]
impl IdentityProvider for HttpBackend {
    async fn create_account(&self, draft: &ProfileDraft) -> Result<String> {
        let body = serde_json::json!({
            "email": draft.email,
            "password": draft.password,
            "name": draft.name,
            "ageGroup": draft.age_cohort,
            "parentEmail": draft.parent_email,
            "language": draft.language,
        });
        let response = self
            .client
            .post(self.function_url("register"))
            .bearer_auth(&self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BuddyError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            let message = error_message(response).await;
            return Err(if message.to_ascii_lowercase().contains("already") {
                BuddyError::DuplicateAccount(message)
            } else {
                BuddyError::Validation(message)
            });
        }
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(BuddyError::Backend(format!("{status}: {message}")));
        }
        let registered: RegisterResponse = Self::json(response).await?;
        debug!(user_id = %registered.user.id, "account created");
        Ok(registered.user.id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthSession> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| BuddyError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(BuddyError::InvalidCredentials(error_message(response).await));
        }
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(BuddyError::Backend(format!("{status}: {message}")));
        }

        let token: TokenResponse = Self::json(response).await?;
        let session = AuthSession {
            token: token.access_token,
            user_id: token.user.id,
            expires_at: token.expires_in.and_then(expiry_from_now),
        };
        self.store_session(Some(session.clone()));
        Ok(session)
    }

    async fn current_session(&self) -> Result<Option<AuthSession>> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(session.filter(|s| !s.is_expired(Utc::now())))
    }

    async fn sign_out(&self) -> Result<()> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = session {
            let result = self
                .client
                .post(format!("{}/auth/v1/logout", self.base_url))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.token)
                .send()
                .await;
            if let Err(e) = result {
                warn!(error = %e, "remote sign-out failed; local session cleared anyway");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for HttpBackend {
    async fn get_profile(&self, auth: &AuthSession) -> Result<Option<Profile>> {
        let response = self
            .send(
                self.client
                    .get(self.function_url("profile"))
                    .bearer_auth(&auth.token),
            )
            .await?;
        let envelope: ProfileEnvelope = Self::json(response).await?;
        Ok(envelope.profile)
    }

    async fn merge_profile(&self, auth: &AuthSession, patch: &ProfilePatch) -> Result<Profile> {
        let response = self
            .send(
                self.client
                    .post(self.function_url("profile"))
                    .bearer_auth(&auth.token)
                    .json(patch),
            )
            .await?;
        let envelope: ProfileEnvelope = Self::json(response).await?;
        envelope
            .profile
            .ok_or_else(|| BuddyError::Backend("profile update returned no profile".into()))
    }
}

#[async_trait]
impl AvatarStore for HttpBackend {
    async fn get_avatar(&self, auth: &AuthSession) -> Result<Option<Avatar>> {
        let response = self
            .send(
                self.client
                    .get(self.function_url("avatar"))
                    .bearer_auth(&auth.token),
            )
            .await?;
        let envelope: AvatarEnvelope = Self::json(response).await?;
        Ok(envelope.avatar.map(|stored| stored.avatar_data))
    }

    async fn put_avatar(&self, auth: &AuthSession, avatar: &Avatar) -> Result<()> {
        self.send(
            self.client
                .post(self.function_url("avatar"))
                .bearer_auth(&auth.token)
                .json(&serde_json::json!({
                    "avatarData": avatar,
                    "avatarName": avatar.name,
                })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceLinkStore for HttpBackend {
    async fn link_device(&self, auth: &AuthSession, link: &DeviceLink) -> Result<()> {
        self.send(
            self.client
                .post(self.function_url("iot-connect"))
                .bearer_auth(&auth.token)
                .json(link),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CareStore for HttpBackend {
    async fn record_health(&self, auth: &AuthSession, reading: &HealthReading) -> Result<()> {
        self.send(
            self.client
                .post(self.function_url("health-data"))
                .bearer_auth(&auth.token)
                .json(reading),
        )
        .await?;
        Ok(())
    }

    async fn health_history(&self, auth: &AuthSession) -> Result<Vec<HealthRecord>> {
        let response = self
            .send(
                self.client
                    .get(self.function_url("health-data"))
                    .bearer_auth(&auth.token),
            )
            .await?;
        let envelope: HealthEnvelope = Self::json(response).await?;
        Ok(envelope.health_data)
    }

    async fn send_parent_report(&self, auth: &AuthSession, report: &str) -> Result<()> {
        self.send(
            self.client
                .post(self.function_url("parent-report"))
                .bearer_auth(&auth.token)
                .json(&serde_json::json!({ "report": report })),
        )
        .await?;
        Ok(())
    }

    async fn raise_sos(&self, auth: &AuthSession, alert: &SosAlert) -> Result<()> {
        self.send(
            self.client
                .post(self.function_url("sos"))
                .bearer_auth(&auth.token)
                .json(alert),
        )
        .await?;
        debug!("emergency alert accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn empty_base_url_is_config_error() {
        let err = HttpBackend::new(&BackendConfig::default()).err().unwrap();
        assert!(matches!(err, BuddyError::Config(_)));
    }

    #[test]
    fn function_urls_join_cleanly() {
        let config = BackendConfig {
            base_url: "https://demo.supabase.co/".into(),
            functions_path: "/functions/v1/make-server-c520032d/".into(),
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(
            backend.function_url("profile"),
            "https://demo.supabase.co/functions/v1/make-server-c520032d/profile"
        );
    }

    #[test]
    fn error_body_prefers_description() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid login credentials"));
    }
}
