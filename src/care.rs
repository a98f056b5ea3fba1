//! Dashboard care actions: health readings, guardian reports and the senior
//! emergency alert.
//!
//! Each action runs against the signed-in session of an open dashboard. A
//! rejected credential forces the session back to the login view, exactly
//! as it does for profile and avatar calls.

use crate::backend::{AuthSession, CareStore};
use crate::cohort::DashboardVariant;
use crate::error::{BuddyError, Result};
use crate::onboarding::{OnboardingSessionMachine, OnboardingStage};
use crate::profile::Profile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Confirmation shown to the user once an emergency alert is stored.
pub const SOS_NOTICE: &str = "SOS Alert Sent! Emergency contact has been notified.";

/// Alert text used when the shell sends none.
pub const DEFAULT_SOS_MESSAGE: &str = "Emergency assistance requested";

/// One set of wearable readings. At least one metric must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HealthReading {
    fn validate(&self) -> Result<()> {
        if self.heart_rate.is_none() && self.steps.is_none() && self.sleep_hours.is_none() {
            return Err(BuddyError::Validation(
                "a health reading needs heart rate, steps or sleep".into(),
            ));
        }
        if self.sleep_hours.is_some_and(|h| !(0.0..=24.0).contains(&h)) {
            return Err(BuddyError::Validation("sleep hours must be within a day".into()));
        }
        Ok(())
    }
}

/// A stored reading with the time the backend received it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    #[serde(flatten)]
    pub reading: HealthReading,
    pub timestamp: DateTime<Utc>,
}

/// An emergency alert raised from the senior dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SosAlert {
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl SosAlert {
    /// Alert with the default message when `message` is blank.
    #[must_use]
    pub fn new(message: Option<String>, location: Option<String>) -> Self {
        let message = message
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_SOS_MESSAGE.to_owned());
        Self {
            message,
            location: location.filter(|l| !l.trim().is_empty()),
        }
    }
}

/// Runs care actions for whoever is signed in on `machine`.
pub struct CareDesk {
    store: Arc<dyn CareStore>,
}

impl CareDesk {
    pub fn new(store: Arc<dyn CareStore>) -> Self {
        Self { store }
    }

    /// Store a reading for the signed-in user.
    ///
    /// # Errors
    ///
    /// [`BuddyError::Validation`] for an empty reading,
    /// [`BuddyError::InvalidTransition`] without an open dashboard, or the
    /// store's error.
    pub async fn record_health(
        &self,
        machine: &OnboardingSessionMachine,
        reading: &HealthReading,
    ) -> Result<()> {
        reading.validate()?;
        let (auth, _, _) = open_dashboard(machine)?;
        self.store
            .record_health(&auth, reading)
            .await
            .map_err(|e| routed(machine, e))?;
        info!(user_id = %auth.user_id, "health reading recorded");
        Ok(())
    }

    /// Readings stored for the signed-in user, oldest first.
    ///
    /// # Errors
    ///
    /// [`BuddyError::InvalidTransition`] without an open dashboard, or the
    /// store's error.
    pub async fn health_history(
        &self,
        machine: &OnboardingSessionMachine,
    ) -> Result<Vec<HealthRecord>> {
        let (auth, _, _) = open_dashboard(machine)?;
        let mut records = self
            .store
            .health_history(&auth)
            .await
            .map_err(|e| routed(machine, e))?;
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Send a progress report to the parent on file.
    ///
    /// # Errors
    ///
    /// [`BuddyError::Validation`] for a blank report or a profile with no
    /// parent email, [`BuddyError::InvalidTransition`] without an open
    /// dashboard, or the store's error.
    pub async fn send_parent_report(
        &self,
        machine: &OnboardingSessionMachine,
        report: &str,
    ) -> Result<()> {
        let report = report.trim();
        if report.is_empty() {
            return Err(BuddyError::Validation("report is required".into()));
        }
        let (auth, profile, _) = open_dashboard(machine)?;
        let Some(parent) = profile.parent_email.as_deref() else {
            return Err(BuddyError::Validation(
                "no parent email is on file for this account".into(),
            ));
        };
        self.store
            .send_parent_report(&auth, report)
            .await
            .map_err(|e| routed(machine, e))?;
        info!(user_id = %auth.user_id, parent = %parent, "parent report sent");
        Ok(())
    }

    /// Raise an emergency alert. Only the senior dashboard offers one.
    ///
    /// # Errors
    ///
    /// [`BuddyError::InvalidTransition`] unless the senior dashboard is
    /// open, or the store's error.
    pub async fn raise_sos(
        &self,
        machine: &OnboardingSessionMachine,
        alert: &SosAlert,
    ) -> Result<()> {
        let (auth, _, variant) = open_dashboard(machine)?;
        if variant != DashboardVariant::Senior {
            return Err(BuddyError::InvalidTransition(format!(
                "the {} dashboard has no emergency alert",
                variant.as_str()
            )));
        }
        if let Err(e) = self.store.raise_sos(&auth, alert).await {
            warn!(user_id = %auth.user_id, error = %e, "emergency alert failed");
            return Err(routed(machine, e));
        }
        warn!(
            user_id = %auth.user_id,
            location = alert.location.as_deref().unwrap_or("unknown"),
            "emergency alert raised"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CareDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CareDesk").finish_non_exhaustive()
    }
}

fn open_dashboard(
    machine: &OnboardingSessionMachine,
) -> Result<(AuthSession, Profile, DashboardVariant)> {
    let session = machine.session();
    let OnboardingStage::Dashboard { variant } = session.stage else {
        return Err(BuddyError::InvalidTransition(format!(
            "care actions need an open dashboard, not {}",
            session.stage
        )));
    };
    match (session.auth, session.profile) {
        (Some(auth), Some(profile)) => Ok((auth, profile, variant)),
        _ => Err(BuddyError::Unauthorized),
    }
}

fn routed(machine: &OnboardingSessionMachine, error: BuddyError) -> BuddyError {
    if error.is_unauthorized() {
        machine.handle_unauthorized();
    }
    error
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::backend::{Backend, InMemoryBackend};
    use crate::cohort::AgeCohort;
    use crate::profile::Avatar;

    fn signed_in(
        cohort: AgeCohort,
        parent: Option<&str>,
    ) -> (Arc<InMemoryBackend>, OnboardingSessionMachine, CareDesk, String) {
        let backend = Arc::new(InMemoryBackend::new());
        let profile = Profile {
            id: "u9".into(),
            name: "Rosa".into(),
            email: "rosa@example.com".into(),
            age_cohort: cohort,
            parent_email: parent.map(str::to_owned),
            language: "English".into(),
            habits: None,
            created_at: None,
            updated_at: None,
        };
        let avatar = Avatar {
            favorite_color: "Blue".into(),
            character: "Wise Owl".into(),
            personality: "Wise".into(),
            name: "Hoot".into(),
            emoji: "🦉".into(),
        };
        let user_id = backend.seed_account("rosa@example.com", "pw", Some(profile), Some(avatar));
        let bundle = Backend::from_shared(backend.clone());
        let desk = CareDesk::new(bundle.care.clone());
        (backend, OnboardingSessionMachine::new(bundle), desk, user_id)
    }

    async fn open(machine: &OnboardingSessionMachine) {
        machine.activate_logo().unwrap();
        let stage = machine.login("rosa@example.com", "pw").await.unwrap();
        assert!(stage.is_dashboard());
    }

    #[tokio::test]
    async fn readings_come_back_oldest_first() {
        let (_, machine, desk, _) = signed_in(AgeCohort::Adult, None);
        open(&machine).await;
        for steps in [4200, 8100] {
            let reading = HealthReading {
                steps: Some(steps),
                ..Default::default()
            };
            desk.record_health(&machine, &reading).await.unwrap();
        }
        let history = desk.health_history(&machine).await.unwrap();
        let steps: Vec<_> = history.iter().map(|r| r.reading.steps).collect();
        assert_eq!(steps, [Some(4200), Some(8100)]);
        assert!(history[0].timestamp <= history[1].timestamp);
    }

    #[tokio::test]
    async fn empty_reading_is_rejected_before_any_call() {
        let (_, machine, desk, _) = signed_in(AgeCohort::Adult, None);
        let err = desk
            .record_health(&machine, &HealthReading::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuddyError::Validation(_)));
    }

    #[tokio::test]
    async fn care_needs_an_open_dashboard() {
        let (_, machine, desk, _) = signed_in(AgeCohort::Senior, None);
        let err = desk.health_history(&machine).await.unwrap_err();
        assert!(matches!(err, BuddyError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn parent_report_needs_a_parent_on_file() {
        let (backend, machine, desk, user_id) = signed_in(AgeCohort::Kids, None);
        open(&machine).await;
        let err = desk
            .send_parent_report(&machine, "Read two books this week")
            .await
            .unwrap_err();
        assert!(matches!(err, BuddyError::Validation(_)));
        assert!(backend.parent_reports(&user_id).is_empty());
    }

    #[tokio::test]
    async fn parent_report_is_stored_for_the_child() {
        let (backend, machine, desk, user_id) = signed_in(AgeCohort::Kids, Some("mum@example.com"));
        open(&machine).await;
        desk.send_parent_report(&machine, "  Read two books this week ")
            .await
            .unwrap();
        assert_eq!(backend.parent_reports(&user_id), ["Read two books this week"]);
    }

    #[tokio::test]
    async fn sos_only_from_senior_dashboard() {
        let (backend, machine, desk, user_id) = signed_in(AgeCohort::Teens, None);
        open(&machine).await;
        let err = desk
            .raise_sos(&machine, &SosAlert::new(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, BuddyError::InvalidTransition(_)));
        assert!(backend.sos_alerts(&user_id).is_empty());
    }

    #[tokio::test]
    async fn senior_sos_is_stored_with_default_message() {
        let (backend, machine, desk, user_id) = signed_in(AgeCohort::Senior, None);
        open(&machine).await;
        let alert = SosAlert::new(Some("   ".into()), Some("Kitchen".into()));
        desk.raise_sos(&machine, &alert).await.unwrap();
        let stored = backend.sos_alerts(&user_id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, DEFAULT_SOS_MESSAGE);
        assert_eq!(stored[0].location.as_deref(), Some("Kitchen"));
    }

    #[tokio::test]
    async fn expired_token_during_care_forces_login() {
        let (backend, machine, desk, _) = signed_in(AgeCohort::Senior, None);
        open(&machine).await;
        backend.expire_tokens();
        let err = desk
            .raise_sos(&machine, &SosAlert::new(None, None))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(machine.stage(), OnboardingStage::Login);
    }
}
