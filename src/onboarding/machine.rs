//! The onboarding session state machine.
//!
//! All navigation goes through [`transition`]; this type adds the backend
//! calls around it and owns the [`Session`]. The session lock is never held
//! across an await, so two overlapping calls resolve independently and the
//! later commit wins.

use super::session::{Session, SessionSnapshot};
use super::stage::{AuthMode, OnboardingStage, SessionEvent, transition};
use crate::backend::{AuthSession, Backend, DeviceLink};
use crate::cohort::AgeCohort;
use crate::error::{BuddyError, Result};
use crate::profile::{AvatarDraft, Profile, ProfileDraft, ProfilePatch};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct OnboardingSessionMachine {
    backend: Backend,
    session: Mutex<Session>,
    stage_tx: watch::Sender<OnboardingStage>,
}

impl OnboardingSessionMachine {
    pub fn new(backend: Backend) -> Self {
        let (stage_tx, _) = watch::channel(OnboardingStage::Landing);
        Self {
            backend,
            session: Mutex::new(Session::default()),
            stage_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub fn stage(&self) -> OnboardingStage {
        self.lock().stage.clone()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.lock().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<OnboardingStage> {
        self.stage_tx.subscribe()
    }

    /// Apply `event`, running `update` on the session in the same critical
    /// section. Nothing changes if the event is refused or the result would
    /// put an incomplete session on the dashboard.
    fn commit(
        &self,
        event: SessionEvent,
        update: impl FnOnce(&mut Session),
    ) -> Result<OnboardingStage> {
        let mut session = self.lock();
        let next = transition(&session.stage, &event)?;

        let mut updated = session.clone();
        update(&mut updated);
        if next.is_dashboard() && !updated.is_complete() {
            return Err(BuddyError::InvalidTransition(
                "dashboard requires a profile and an avatar".into(),
            ));
        }
        updated.stage = next.clone();

        info!(from = %session.stage, to = %next, "onboarding stage changed");
        *session = updated;
        drop(session);
        self.stage_tx.send_replace(next.clone());
        Ok(next)
    }

    fn apply(&self, event: SessionEvent) -> Result<OnboardingStage> {
        self.commit(event, |_| {})
    }

    fn current_auth(&self) -> Option<AuthSession> {
        self.lock().auth.clone()
    }

    // ── Navigation ───────────────────────────────────────────────────────────

    pub fn activate_logo(&self) -> Result<OnboardingStage> {
        self.apply(SessionEvent::LogoActivated)
    }

    pub fn choose_auth(&self, mode: AuthMode) -> Result<OnboardingStage> {
        self.apply(SessionEvent::ChooseAuth(mode))
    }

    pub fn back(&self) -> Result<OnboardingStage> {
        self.apply(SessionEvent::Back)
    }

    pub fn select_cohort(&self, cohort: AgeCohort) -> Result<OnboardingStage> {
        self.apply(SessionEvent::CohortSelected(cohort))
    }

    /// Force the session back to the login view after a rejected credential.
    pub fn handle_unauthorized(&self) {
        warn!("credential rejected; returning to login");
        let _ = self.commit(SessionEvent::SessionExpired, Session::clear);
    }

    /// Route an error from an authenticated call: unauthorized forces logout.
    fn check(&self, error: BuddyError) -> BuddyError {
        if error.is_unauthorized() {
            self.handle_unauthorized();
        }
        error
    }

    // ── Authentication ───────────────────────────────────────────────────────

    /// Resume a provider session left over from a previous run.
    ///
    /// Stays on `Landing` when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::InvalidTransition`] if not on `Landing`.
    pub async fn restore(&self) -> Result<OnboardingStage> {
        let stage = self.stage();
        if stage != OnboardingStage::Landing {
            return Err(BuddyError::InvalidTransition(format!(
                "restore is only possible from landing, not {stage}"
            )));
        }
        let existing = match self.backend.identity.current_session().await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "could not query existing session");
                None
            }
        };
        let Some(auth) = existing else {
            debug!("no session to restore");
            return Ok(self.stage());
        };
        self.commit(SessionEvent::SessionRestored, |s| s.auth = Some(auth.clone()))?;
        self.load_account(&auth).await
    }

    /// Sign in and load the account.
    ///
    /// # Errors
    ///
    /// Returns the provider's error (e.g. [`BuddyError::InvalidCredentials`])
    /// with the session back on the login view and nothing else changed.
    /// Failures loading the profile or avatar are not errors: the session
    /// is signed out and moves to [`OnboardingStage::Error`] instead.
    pub async fn login(&self, email: &str, password: &str) -> Result<OnboardingStage> {
        self.apply(SessionEvent::CredentialsSubmitted)?;
        let auth = match self.backend.identity.authenticate(email, password).await {
            Ok(auth) => auth,
            Err(e) => {
                info!(error = %e, "sign-in rejected");
                let _ = self.apply(SessionEvent::AuthFailed);
                return Err(e);
            }
        };
        {
            let mut session = self.lock();
            if session.stage == OnboardingStage::Authenticating {
                session.auth = Some(auth.clone());
            }
        }
        self.load_account(&auth).await
    }

    /// Fetch profile and avatar in parallel and pick the next stage.
    async fn load_account(&self, auth: &AuthSession) -> Result<OnboardingStage> {
        let (profile, avatar) = tokio::join!(
            self.backend.profiles.get_profile(auth),
            self.backend.avatars.get_avatar(auth),
        );

        let profile = match profile {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(user_id = %auth.user_id, "signed in but no profile is stored");
                return self.fail_load("profile not found".into()).await;
            }
            Err(e) if e.is_unauthorized() => return Err(self.check(e)),
            Err(e) => {
                warn!(error = %e, "profile load failed");
                return self.fail_load(e.to_string()).await;
            }
        };
        let avatar = match avatar {
            Ok(avatar) => avatar,
            Err(e) if e.is_unauthorized() => return Err(self.check(e)),
            Err(e) => {
                warn!(error = %e, "avatar load failed");
                return self.fail_load(e.to_string()).await;
            }
        };

        let event = SessionEvent::ProfileLoaded {
            cohort: profile.age_cohort,
            has_avatar: avatar.is_some(),
        };
        self.commit(event, |s| {
            s.auth = Some(auth.clone());
            s.profile = Some(profile);
            s.avatar = avatar;
        })
    }

    /// Park the session on the error view signed out, so that leaving it
    /// can only lead to a fresh sign-in.
    async fn fail_load(&self, message: String) -> Result<OnboardingStage> {
        if let Err(e) = self.backend.identity.sign_out().await {
            warn!(error = %e, "provider sign-out failed");
        }
        self.commit(SessionEvent::LoadFailed(message), Session::clear)
    }

    /// Create an account for the cohort chosen on the age-select screen.
    ///
    /// Order: validate, create the identity together with its profile,
    /// authenticate, link a device if asked, then move to avatar creation.
    /// The account is complete once it is created, so a failed sign-in
    /// afterwards only sends the user to the login view.
    ///
    /// # Errors
    ///
    /// - [`BuddyError::Validation`] for missing fields, before anything is
    ///   created.
    /// - [`BuddyError::DuplicateAccount`] from the identity provider.
    /// - The provider's sign-in error after the account exists.
    pub async fn register(&self, mut draft: ProfileDraft) -> Result<OnboardingStage> {
        let cohort = match self.stage() {
            OnboardingStage::Registering { cohort } => cohort,
            other => {
                return Err(BuddyError::InvalidTransition(format!(
                    "registration is not open in stage {other}"
                )));
            }
        };
        draft.age_cohort = cohort;
        draft.validate()?;

        let user_id = self.backend.identity.create_account(&draft).await?;
        info!(user_id = %user_id, cohort = %cohort, "account created");
        self.apply(SessionEvent::RegistrationSubmitted)?;

        let auth = match self
            .backend
            .identity
            .authenticate(&draft.email, &draft.password)
            .await
        {
            Ok(auth) => auth,
            Err(e) => {
                warn!(error = %e, "automatic sign-in after registration failed");
                let _ = self.apply(SessionEvent::AuthFailed);
                return Err(e);
            }
        };

        if draft.connect_device {
            let link = DeviceLink::smartwatch(Utc::now());
            match self.backend.devices.link_device(&auth, &link).await {
                Ok(()) => info!(device_id = %link.device_id, "device linked"),
                Err(e) => warn!(error = %e, "device link failed; continuing"),
            }
        }

        let profile = draft.into_profile(auth.user_id.clone(), Utc::now());
        self.commit(SessionEvent::AccountCreated, |s| {
            s.auth = Some(auth.clone());
            s.profile = Some(profile);
            s.avatar = None;
        })
    }

    /// Finish the avatar wizard, persist the avatar and open the dashboard.
    ///
    /// # Errors
    ///
    /// [`BuddyError::Validation`] for an incomplete draft,
    /// [`BuddyError::InvalidTransition`] outside avatar creation, or the
    /// store's error (unauthorized forces logout).
    pub async fn complete_avatar(&self, draft: AvatarDraft) -> Result<OnboardingStage> {
        let (auth, cohort) = {
            let session = self.lock();
            if session.stage != OnboardingStage::CreatingAvatar {
                return Err(BuddyError::InvalidTransition(format!(
                    "avatar creation is not open in stage {}",
                    session.stage
                )));
            }
            let auth = session.auth.clone().ok_or(BuddyError::Unauthorized)?;
            let cohort = session
                .profile
                .as_ref()
                .map(|p| p.age_cohort)
                .ok_or_else(|| BuddyError::InvalidTransition("no profile loaded".into()))?;
            (auth, cohort)
        };

        let avatar = draft.complete()?;
        if let Err(e) = self.backend.avatars.put_avatar(&auth, &avatar).await {
            warn!(error = %e, "avatar could not be saved");
            return Err(self.check(e));
        }
        info!(character = %avatar.character, emoji = %avatar.emoji, "avatar saved");

        self.commit(SessionEvent::AvatarCompleted(cohort.dashboard()), |s| {
            s.avatar = Some(avatar);
        })
    }

    /// Merge `patch` into the stored profile.
    ///
    /// Returns `Ok(None)` without doing anything when no one is signed in.
    ///
    /// # Errors
    ///
    /// Returns the store's error; unauthorized forces logout.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<Option<Profile>> {
        let Some(auth) = self.current_auth() else {
            debug!("profile update ignored: no active session");
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(self.lock().profile.clone());
        }
        let profile = self
            .backend
            .profiles
            .merge_profile(&auth, &patch)
            .await
            .map_err(|e| self.check(e))?;

        let mut session = self.lock();
        if session.auth.as_ref() == Some(&auth) {
            session.profile = Some(profile.clone());
        }
        Ok(Some(profile))
    }

    /// Sign out and clear the session.
    pub async fn logout(&self) -> OnboardingStage {
        if let Err(e) = self.backend.identity.sign_out().await {
            warn!(error = %e, "provider sign-out failed");
        }
        match self.commit(SessionEvent::LoggedOut, Session::clear) {
            Ok(stage) => stage,
            Err(_) => self.stage(),
        }
    }
}

impl std::fmt::Debug for OnboardingSessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardingSessionMachine")
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}
