//! Age cohorts and the dashboard variants they select.
//!
//! The cohort is chosen once at registration and never changes. It drives
//! three things downstream:
//!
//! - which [`DashboardVariant`] the session lands on,
//! - which [`ResponseSet`] the response engine draws from,
//! - which voice parameters speech output uses.

use crate::avatar_sync::Emotion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Age-group classification of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeCohort {
    /// Ages 6 to 12.
    #[serde(rename = "6-12", alias = "kids")]
    Kids,
    /// Ages 13 to 17.
    #[serde(rename = "13-17", alias = "teens")]
    Teens,
    /// Ages 18 to 20.
    #[serde(rename = "18-20", alias = "youngAdult")]
    YoungAdult,
    /// Ages 21 to 40.
    #[serde(rename = "21-40", alias = "adult")]
    Adult,
    #[serde(rename = "senior")]
    Senior,
}

impl AgeCohort {
    /// Return all cohorts in selection-screen order.
    pub fn all() -> &'static [AgeCohort] {
        &[
            AgeCohort::Kids,
            AgeCohort::Teens,
            AgeCohort::YoungAdult,
            AgeCohort::Adult,
            AgeCohort::Senior,
        ]
    }

    /// Canonical wire id, as stored in the profile record.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kids => "6-12",
            Self::Teens => "13-17",
            Self::YoungAdult => "18-20",
            Self::Adult => "21-40",
            Self::Senior => "senior",
        }
    }

    /// Parse a wire id or a cohort name. Case-insensitive for names.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "6-12" | "kids" => Some(Self::Kids),
            "13-17" | "teens" => Some(Self::Teens),
            "18-20" | "youngadult" | "young_adult" => Some(Self::YoungAdult),
            "21-40" | "adult" | "adults" => Some(Self::Adult),
            "senior" | "seniors" => Some(Self::Senior),
            _ => None,
        }
    }

    /// Whether registration must carry a parent or family-member email.
    ///
    /// Young adults keep the parent requirement; only the 21-40 cohort
    /// registers without a second contact.
    #[must_use]
    pub fn requires_guardian(self) -> bool {
        !matches!(self, Self::Adult)
    }

    /// Label for the guardian email field, if the cohort has one.
    #[must_use]
    pub fn guardian_label(self) -> Option<&'static str> {
        match self {
            Self::Kids | Self::Teens | Self::YoungAdult => Some("Parent Account Email"),
            Self::Senior => Some("Family Member Email (Son/Daughter)"),
            Self::Adult => None,
        }
    }

    /// Which response set the companion draws replies from.
    #[must_use]
    pub fn response_set(self) -> ResponseSet {
        match self {
            Self::Kids => ResponseSet::Kids,
            Self::Teens => ResponseSet::Teens,
            Self::YoungAdult | Self::Adult => ResponseSet::Adults,
            Self::Senior => ResponseSet::Seniors,
        }
    }

    /// Which dashboard variant loads for this cohort.
    #[must_use]
    pub fn dashboard(self) -> DashboardVariant {
        match self {
            Self::Kids => DashboardVariant::Kids,
            Self::Teens => DashboardVariant::Teens,
            Self::YoungAdult | Self::Adult => DashboardVariant::Adult,
            Self::Senior => DashboardVariant::Senior,
        }
    }
}

impl fmt::Display for AgeCohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown cohort string.
#[derive(Debug, Clone)]
pub struct CohortParseError(pub String);

impl fmt::Display for CohortParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown age cohort: {:?}", self.0)
    }
}

impl std::error::Error for CohortParseError {}

impl FromStr for AgeCohort {
    type Err = CohortParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CohortParseError(s.to_owned()))
    }
}

/// The four reply registers the response engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseSet {
    Kids,
    Teens,
    Adults,
    Seniors,
}

/// Dashboard shown after onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardVariant {
    Kids,
    Teens,
    Adult,
    Senior,
}

impl DashboardVariant {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kids => "kids",
            Self::Teens => "teens",
            Self::Adult => "adult",
            Self::Senior => "senior",
        }
    }

    /// The companion's opening turn, personalised with the user's name.
    ///
    /// Only the adult dashboard is localised; the others greet in English.
    pub fn greeting(self, user_name: &str, language: &str) -> String {
        match self {
            Self::Kids => format!("Hi {user_name}! How are you feeling today? 😊"),
            Self::Teens => format!(
                "Hey {user_name}! How's your day going? I'm here if you want to talk about anything."
            ),
            Self::Adult => {
                let params = HashMap::from([("name", user_name)]);
                crate::i18n::translate(language, "buddyGreeting", &params)
            }
            Self::Senior => format!(
                "Good day, dear {user_name}. How are you feeling today? I'm here to keep you company."
            ),
        }
    }

    /// Avatar emotion used for voice-modal replies on this dashboard.
    #[must_use]
    pub fn voice_emotion(self) -> Emotion {
        match self {
            Self::Kids | Self::Adult => Emotion::Happy,
            Self::Teens | Self::Senior => Emotion::Neutral,
        }
    }
}

impl fmt::Display for DashboardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn wire_ids_round_trip_through_parse_and_serde() {
        for cohort in AgeCohort::all() {
            assert_eq!(AgeCohort::parse(cohort.as_str()), Some(*cohort));
            let json = serde_json::to_string(cohort).unwrap();
            assert_eq!(json, format!("\"{}\"", cohort.as_str()));
            let back: AgeCohort = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *cohort);
        }
    }

    #[test]
    fn names_are_accepted_as_aliases() {
        assert_eq!(AgeCohort::parse("Kids"), Some(AgeCohort::Kids));
        assert_eq!(AgeCohort::parse("youngAdult"), Some(AgeCohort::YoungAdult));
        let parsed: AgeCohort = serde_json::from_str("\"teens\"").unwrap();
        assert_eq!(parsed, AgeCohort::Teens);
        assert!("toddler".parse::<AgeCohort>().is_err());
    }

    #[test]
    fn guardian_required_for_all_but_adult() {
        assert!(AgeCohort::Kids.requires_guardian());
        assert!(AgeCohort::Teens.requires_guardian());
        assert!(AgeCohort::YoungAdult.requires_guardian());
        assert!(AgeCohort::Senior.requires_guardian());
        assert!(!AgeCohort::Adult.requires_guardian());
        assert!(AgeCohort::Adult.guardian_label().is_none());
        assert!(
            AgeCohort::Senior
                .guardian_label()
                .unwrap()
                .contains("Family")
        );
    }

    #[test]
    fn young_adult_shares_adult_dashboard_and_replies() {
        assert_eq!(AgeCohort::YoungAdult.dashboard(), DashboardVariant::Adult);
        assert_eq!(AgeCohort::YoungAdult.response_set(), ResponseSet::Adults);
        assert_eq!(AgeCohort::Senior.dashboard(), DashboardVariant::Senior);
    }

    #[test]
    fn greetings_carry_user_name() {
        for variant in [
            DashboardVariant::Kids,
            DashboardVariant::Teens,
            DashboardVariant::Adult,
            DashboardVariant::Senior,
        ] {
            let greeting = variant.greeting("Maya", "English");
            assert!(greeting.contains("Maya"), "{variant} greeting: {greeting}");
        }
    }
}
