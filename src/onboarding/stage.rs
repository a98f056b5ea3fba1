//! Onboarding stages and the pure transition table.
//!
//! ```text
//! Landing ──logo──▶ Login ──submit──▶ Authenticating ──▶ Dashboard | CreatingAvatar | Error
//!    │                │
//!    └──register──────┴──▶ AgeSelect ──cohort──▶ Registering ──submit──▶ Authenticating
//!                                                                            │
//!                                      Dashboard ◀──avatar── CreatingAvatar ◀┘
//! ```
//!
//! `SessionExpired` and `LoggedOut` are accepted from every stage.

use crate::cohort::{AgeCohort, DashboardVariant};
use crate::error::{BuddyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which entry point the user picked on the landing screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Login,
    Register,
}

impl AuthMode {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "login" => Some(Self::Login),
            "register" => Some(Self::Register),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum OnboardingStage {
    #[default]
    Landing,
    /// Auth choice = login: the credentials form.
    Login,
    /// Waiting on the identity provider and the initial profile load.
    Authenticating,
    AgeSelect,
    Registering { cohort: AgeCohort },
    CreatingAvatar,
    Dashboard { variant: DashboardVariant },
    /// Signed in but the account could not be loaded.
    Error { message: String },
}

impl OnboardingStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landing => "landing",
            Self::Login => "login",
            Self::Authenticating => "authenticating",
            Self::AgeSelect => "age_select",
            Self::Registering { .. } => "registering",
            Self::CreatingAvatar => "creating_avatar",
            Self::Dashboard { .. } => "dashboard",
            Self::Error { .. } => "error",
        }
    }

    #[must_use]
    pub fn is_dashboard(&self) -> bool {
        matches!(self, Self::Dashboard { .. })
    }
}

impl fmt::Display for OnboardingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LogoActivated,
    ChooseAuth(AuthMode),
    Back,
    CohortSelected(AgeCohort),
    CredentialsSubmitted,
    /// Account created; auto-authentication starts.
    RegistrationSubmitted,
    /// An existing provider session was found at startup.
    SessionRestored,
    AuthFailed,
    ProfileLoaded { cohort: AgeCohort, has_avatar: bool },
    LoadFailed(String),
    AccountCreated,
    AvatarCompleted(DashboardVariant),
    SessionExpired,
    LoggedOut,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::LogoActivated => "logo_activated",
            Self::ChooseAuth(_) => "choose_auth",
            Self::Back => "back",
            Self::CohortSelected(_) => "cohort_selected",
            Self::CredentialsSubmitted => "credentials_submitted",
            Self::RegistrationSubmitted => "registration_submitted",
            Self::SessionRestored => "session_restored",
            Self::AuthFailed => "auth_failed",
            Self::ProfileLoaded { .. } => "profile_loaded",
            Self::LoadFailed(_) => "load_failed",
            Self::AccountCreated => "account_created",
            Self::AvatarCompleted(_) => "avatar_completed",
            Self::SessionExpired => "session_expired",
            Self::LoggedOut => "logged_out",
        }
    }
}

/// Compute the next stage, or refuse the event.
///
/// # Errors
///
/// Returns [`BuddyError::InvalidTransition`] when `event` is not accepted in
/// `stage`.
pub fn transition(stage: &OnboardingStage, event: &SessionEvent) -> Result<OnboardingStage> {
    use OnboardingStage as S;
    use SessionEvent as E;

    let next = match (stage, event) {
        (_, E::SessionExpired) => S::Login,
        (_, E::LoggedOut) => S::Landing,

        (S::Landing, E::LogoActivated) => S::Login,
        (S::Landing | S::Login, E::ChooseAuth(AuthMode::Login)) => S::Login,
        (S::Landing | S::Login, E::ChooseAuth(AuthMode::Register)) => S::AgeSelect,

        (S::Login | S::AgeSelect, E::Back) => S::Landing,
        (S::Registering { .. }, E::Back) => S::AgeSelect,
        (S::Error { .. }, E::Back) => S::Login,

        (S::AgeSelect, E::CohortSelected(cohort)) => S::Registering { cohort: *cohort },

        (S::Login, E::CredentialsSubmitted) => S::Authenticating,
        (S::Registering { .. }, E::RegistrationSubmitted) => S::Authenticating,
        (S::Landing, E::SessionRestored) => S::Authenticating,

        (S::Authenticating, E::AuthFailed) => S::Login,
        (S::Authenticating, E::ProfileLoaded { cohort, has_avatar }) => {
            if *has_avatar {
                S::Dashboard {
                    variant: cohort.dashboard(),
                }
            } else {
                S::CreatingAvatar
            }
        }
        (S::Authenticating, E::LoadFailed(message)) => S::Error {
            message: message.clone(),
        },
        (S::Authenticating, E::AccountCreated) => S::CreatingAvatar,

        (S::CreatingAvatar, E::AvatarCompleted(variant)) => S::Dashboard { variant: *variant },

        _ => {
            return Err(BuddyError::InvalidTransition(format!(
                "{} is not accepted in stage {stage}",
                event.name()
            )));
        }
    };
    Ok(next)
}
