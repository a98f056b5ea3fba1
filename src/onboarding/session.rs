use super::stage::OnboardingStage;
use crate::backend::AuthSession;
use crate::profile::{Avatar, Profile};
use serde::Serialize;

/// Everything the onboarding machine knows about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub auth: Option<AuthSession>,
    pub profile: Option<Profile>,
    pub avatar: Option<Avatar>,
    pub stage: OnboardingStage,
}

impl Session {
    /// Drop identity, profile and avatar.
    pub fn clear(&mut self) {
        self.auth = None;
        self.profile = None;
        self.avatar = None;
    }

    /// Whether the dashboard may be entered: cohort known and avatar built.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.profile.is_some() && self.avatar.is_some()
    }

    /// A view safe to hand to a UI: no bearer token.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stage: self.stage.clone(),
            signed_in: self.auth.is_some(),
            profile: self.profile.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub stage: OnboardingStage,
    pub signed_in: bool,
    pub profile: Option<Profile>,
    pub avatar: Option<Avatar>,
}
