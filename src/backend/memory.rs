//! Process-local backend used by tests and offline hosts.

use super::{
    AuthSession, AvatarStore, CareStore, DeviceLink, DeviceLinkStore, IdentityProvider,
    ProfileStore,
};
use crate::care::{HealthReading, HealthRecord, SosAlert};
use crate::error::{BuddyError, Result};
use crate::profile::{Avatar, Profile, ProfileDraft, ProfilePatch};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Lifetime of tokens minted by [`InMemoryBackend::authenticate`].
const TOKEN_TTL_SECS: i64 = 3600;

struct Account {
    user_id: String,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    /// Keyed by lower-cased email.
    accounts: HashMap<String, Account>,
    /// Live tokens → user id. At most one per user.
    tokens: HashMap<String, String>,
    current: Option<AuthSession>,
    profiles: HashMap<String, Profile>,
    avatars: HashMap<String, Avatar>,
    devices: HashMap<String, Vec<DeviceLink>>,
    health: HashMap<String, Vec<HealthRecord>>,
    reports: HashMap<String, Vec<String>>,
    alerts: HashMap<String, Vec<SosAlert>>,
    fail_device_links: bool,
    fail_avatar_loads: bool,
    fail_authentication: bool,
}

/// In-memory implementation of every backend collaborator.
///
/// Tokens are random UUIDs. [`expire_tokens`](Self::expire_tokens) revokes
/// all of them at once, which lets tests drive the forced-logout path.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an existing account with optional profile and avatar.
    ///
    /// Returns the generated user id.
    pub fn seed_account(
        &self,
        email: &str,
        password: &str,
        profile: Option<Profile>,
        avatar: Option<Avatar>,
    ) -> String {
        let mut state = self.state();
        let user_id = profile
            .as_ref()
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), |p| p.id.clone());
        state.accounts.insert(
            email.to_ascii_lowercase(),
            Account {
                user_id: user_id.clone(),
                password: password.to_owned(),
            },
        );
        if let Some(profile) = profile {
            state.profiles.insert(user_id.clone(), profile);
        }
        if let Some(avatar) = avatar {
            state.avatars.insert(user_id.clone(), avatar);
        }
        user_id
    }

    /// Revoke every issued token, as if they had all expired.
    pub fn expire_tokens(&self) {
        let mut state = self.state();
        state.tokens.clear();
    }

    /// Make device-link writes fail, to exercise the best-effort path.
    pub fn set_fail_device_links(&self, fail: bool) {
        self.state().fail_device_links = fail;
    }

    /// Make avatar reads fail with a backend error.
    pub fn set_fail_avatar_loads(&self, fail: bool) {
        self.state().fail_avatar_loads = fail;
    }

    /// Make every sign-in attempt fail with a backend error.
    pub fn set_fail_authentication(&self, fail: bool) {
        self.state().fail_authentication = fail;
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        self.state().accounts.len()
    }

    #[must_use]
    pub fn token_count(&self) -> usize {
        self.state().tokens.len()
    }

    #[must_use]
    pub fn stored_profile(&self, user_id: &str) -> Option<Profile> {
        self.state().profiles.get(user_id).cloned()
    }

    #[must_use]
    pub fn stored_avatar(&self, user_id: &str) -> Option<Avatar> {
        self.state().avatars.get(user_id).cloned()
    }

    #[must_use]
    pub fn device_links(&self, user_id: &str) -> Vec<DeviceLink> {
        self.state()
            .devices
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn parent_reports(&self, user_id: &str) -> Vec<String> {
        self.state()
            .reports
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn sos_alerts(&self, user_id: &str) -> Vec<SosAlert> {
        self.state()
            .alerts
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Resolve the bearer token to its user, rejecting revoked tokens.
fn authorize<'a>(state: &'a MemoryState, auth: &AuthSession) -> Result<&'a str> {
    match state.tokens.get(&auth.token) {
        Some(user_id) if *user_id == auth.user_id && !auth.is_expired(Utc::now()) => {
            Ok(user_id.as_str())
        }
        _ => Err(BuddyError::Unauthorized),
    }
}

#[async_trait]
impl IdentityProvider for InMemoryBackend {
    async fn create_account(&self, draft: &ProfileDraft) -> Result<String> {
        let key = draft.email.trim().to_ascii_lowercase();
        if key.is_empty() || draft.password.is_empty() {
            return Err(BuddyError::Validation(
                "email and password are required".into(),
            ));
        }
        let mut state = self.state();
        if state.accounts.contains_key(&key) {
            return Err(BuddyError::DuplicateAccount(
                "A user with this email address has already been registered".into(),
            ));
        }
        let user_id = uuid::Uuid::new_v4().to_string();
        state.accounts.insert(
            key,
            Account {
                user_id: user_id.clone(),
                password: draft.password.clone(),
            },
        );
        let profile = draft.clone().into_profile(user_id.clone(), Utc::now());
        state.profiles.insert(user_id.clone(), profile);
        debug!(user_id = %user_id, "account created");
        Ok(user_id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthSession> {
        let mut state = self.state();
        if state.fail_authentication {
            return Err(BuddyError::Backend("auth service unavailable".into()));
        }
        let user_id = match state.accounts.get(&email.trim().to_ascii_lowercase()) {
            Some(account) if account.password == password => account.user_id.clone(),
            _ => {
                return Err(BuddyError::InvalidCredentials(
                    "Invalid login credentials".into(),
                ));
            }
        };
        let session = AuthSession {
            token: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            expires_at: Some(Utc::now() + Duration::seconds(TOKEN_TTL_SECS)),
        };
        state.tokens.retain(|_, owner| *owner != user_id);
        state.tokens.insert(session.token.clone(), user_id);
        state.current = Some(session.clone());
        Ok(session)
    }

    async fn current_session(&self) -> Result<Option<AuthSession>> {
        let state = self.state();
        Ok(state
            .current
            .clone()
            .filter(|s| state.tokens.contains_key(&s.token)))
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = self.state();
        if let Some(session) = state.current.take() {
            state.tokens.remove(&session.token);
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryBackend {
    async fn get_profile(&self, auth: &AuthSession) -> Result<Option<Profile>> {
        let state = self.state();
        let user_id = authorize(&state, auth)?;
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn merge_profile(&self, auth: &AuthSession, patch: &ProfilePatch) -> Result<Profile> {
        let mut state = self.state();
        let user_id = authorize(&state, auth)?.to_owned();
        let profile = state
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| BuddyError::Backend(format!("no profile stored for {user_id}")))?;
        patch.apply_to(profile, Utc::now());
        Ok(profile.clone())
    }
}

#[async_trait]
impl AvatarStore for InMemoryBackend {
    async fn get_avatar(&self, auth: &AuthSession) -> Result<Option<Avatar>> {
        let state = self.state();
        let user_id = authorize(&state, auth)?;
        if state.fail_avatar_loads {
            return Err(BuddyError::Backend("Failed to fetch avatar".into()));
        }
        Ok(state.avatars.get(user_id).cloned())
    }

    async fn put_avatar(&self, auth: &AuthSession, avatar: &Avatar) -> Result<()> {
        let mut state = self.state();
        let user_id = authorize(&state, auth)?.to_owned();
        state.avatars.insert(user_id, avatar.clone());
        Ok(())
    }
}

#[async_trait]
impl DeviceLinkStore for InMemoryBackend {
    async fn link_device(&self, auth: &AuthSession, link: &DeviceLink) -> Result<()> {
        let mut state = self.state();
        let user_id = authorize(&state, auth)?.to_owned();
        if state.fail_device_links {
            return Err(BuddyError::Backend("Failed to connect device".into()));
        }
        state.devices.entry(user_id).or_default().push(link.clone());
        Ok(())
    }
}

#[async_trait]
impl CareStore for InMemoryBackend {
    async fn record_health(&self, auth: &AuthSession, reading: &HealthReading) -> Result<()> {
        let mut state = self.state();
        let user_id = authorize(&state, auth)?.to_owned();
        let record = HealthRecord {
            reading: reading.clone(),
            timestamp: Utc::now(),
        };
        state.health.entry(user_id).or_default().push(record);
        Ok(())
    }

    async fn health_history(&self, auth: &AuthSession) -> Result<Vec<HealthRecord>> {
        let state = self.state();
        let user_id = authorize(&state, auth)?;
        Ok(state.health.get(user_id).cloned().unwrap_or_default())
    }

    async fn send_parent_report(&self, auth: &AuthSession, report: &str) -> Result<()> {
        let mut state = self.state();
        let user_id = authorize(&state, auth)?.to_owned();
        state
            .reports
            .entry(user_id)
            .or_default()
            .push(report.to_owned());
        Ok(())
    }

    async fn raise_sos(&self, auth: &AuthSession, alert: &SosAlert) -> Result<()> {
        let mut state = self.state();
        let user_id = authorize(&state, auth)?.to_owned();
        state.alerts.entry(user_id).or_default().push(alert.clone());
        Ok(())
    }
}
