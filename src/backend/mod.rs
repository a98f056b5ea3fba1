//! Collaborator contracts for identity, profile, avatar, device-link and
//! care storage.
//!
//! The session machine only ever talks to these traits. Two implementations
//! ship with the crate:
//!
//! - [`InMemoryBackend`]: process-local, used by tests and offline hosts.
//! - [`HttpBackend`]: the hosted edge-function API.
//!
//! Every authenticated call receives the caller's [`AuthSession`], which
//! carries both the bearer token and the `user_id` the stores are keyed by.
//! A rejected or expired token surfaces as [`BuddyError::Unauthorized`].
//!
//! [`BuddyError::Unauthorized`]: crate::error::BuddyError::Unauthorized

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

use crate::care::{HealthReading, HealthRecord, SosAlert};
use crate::config::{BackendConfig, BackendMode};
use crate::error::Result;
use crate::profile::{Avatar, Profile, ProfileDraft, ProfilePatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An authenticated identity: opaque bearer token plus the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Whether the token's advertised expiry has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A companion device linked to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLink {
    pub device_id: String,
    pub device_type: String,
}

impl DeviceLink {
    /// The wearable registered when the user opts in at sign-up.
    #[must_use]
    pub fn smartwatch(now: DateTime<Utc>) -> Self {
        Self {
            device_id: format!("smartwatch_{}", now.timestamp_millis()),
            device_type: "smartwatch".to_owned(),
        }
    }
}

/// Account creation and password authentication.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an identity record and its stored profile from the
    /// registration form. Returns the new user id.
    async fn create_account(&self, draft: &ProfileDraft) -> Result<String>;
    /// Exchange credentials for a session.
    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthSession>;
    /// The session the provider currently holds, if any.
    async fn current_session(&self) -> Result<Option<AuthSession>>;
    async fn sign_out(&self) -> Result<()>;
}

/// Profile records keyed by user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, auth: &AuthSession) -> Result<Option<Profile>>;
    /// Merge `patch` into the stored record and return the result.
    async fn merge_profile(&self, auth: &AuthSession, patch: &ProfilePatch) -> Result<Profile>;
}

/// Avatar records keyed by user id.
#[async_trait]
pub trait AvatarStore: Send + Sync {
    async fn get_avatar(&self, auth: &AuthSession) -> Result<Option<Avatar>>;
    async fn put_avatar(&self, auth: &AuthSession, avatar: &Avatar) -> Result<()>;
}

/// Best-effort device link storage.
#[async_trait]
pub trait DeviceLinkStore: Send + Sync {
    async fn link_device(&self, auth: &AuthSession, link: &DeviceLink) -> Result<()>;
}

/// Health readings, guardian reports and emergency alerts.
#[async_trait]
pub trait CareStore: Send + Sync {
    async fn record_health(&self, auth: &AuthSession, reading: &HealthReading) -> Result<()>;
    async fn health_history(&self, auth: &AuthSession) -> Result<Vec<HealthRecord>>;
    async fn send_parent_report(&self, auth: &AuthSession, report: &str) -> Result<()>;
    async fn raise_sos(&self, auth: &AuthSession, alert: &SosAlert) -> Result<()>;
}

/// The full set of collaborators the session machine and the dashboard need.
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub avatars: Arc<dyn AvatarStore>,
    pub devices: Arc<dyn DeviceLinkStore>,
    pub care: Arc<dyn CareStore>,
}

impl Backend {
    /// Use one implementation for every collaborator.
    pub fn from_shared<T>(inner: Arc<T>) -> Self
    where
        T: IdentityProvider
            + ProfileStore
            + AvatarStore
            + DeviceLinkStore
            + CareStore
            + 'static,
    {
        Self {
            identity: inner.clone(),
            profiles: inner.clone(),
            avatars: inner.clone(),
            devices: inner.clone(),
            care: inner,
        }
    }

    /// Build the backend selected by configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        match config.mode {
            BackendMode::Memory => Ok(Self::from_shared(Arc::new(InMemoryBackend::new()))),
            BackendMode::Http => Ok(Self::from_shared(Arc::new(HttpBackend::new(config)?))),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}
