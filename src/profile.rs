//! User profile and avatar data models.
//!
//! Field names serialize in the camelCase shape the backend stores, so the
//! same types travel over HTTP and through the in-memory stores unchanged.

use crate::cohort::AgeCohort;
use crate::error::{BuddyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emoji used when the chosen character is not in [`CHARACTER_EMOJIS`].
pub const DEFAULT_AVATAR_EMOJI: &str = "🤖";

/// Fixed character → emoji mapping shared by avatar creation and persistence.
pub const CHARACTER_EMOJIS: &[(&str, &str)] = &[
    ("Friendly Robot", "🤖"),
    ("Happy Bear", "🐻"),
    ("Cute Cat", "🐱"),
    ("Wise Owl", "🦉"),
    ("Playful Dog", "🐶"),
    ("Magic Unicorn", "🦄"),
];

/// Colors offered in the first wizard step.
pub const FAVORITE_COLORS: &[&str] = &["Red", "Blue", "Green", "Purple", "Pink", "Yellow"];

/// Personalities offered in the third wizard step.
pub const PERSONALITIES: &[&str] = &["Cheerful", "Wise", "Adventurous", "Caring"];

/// Names suggested in the last wizard step.
pub const SUGGESTED_NAMES: &[&str] = &[
    "Buddy", "Sparkle", "Sunny", "Luna", "Max", "Sage", "Joy", "Star", "Nova", "Echo",
];

/// Look up the emoji for a character name.
#[must_use]
pub fn emoji_for_character(character: &str) -> &'static str {
    CHARACTER_EMOJIS
        .iter()
        .find(|(name, _)| *name == character)
        .map_or(DEFAULT_AVATAR_EMOJI, |(_, emoji)| *emoji)
}

fn default_language() -> String {
    "English".to_owned()
}

/// A stored user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Immutable after registration.
    #[serde(rename = "ageGroup")]
    pub age_cohort: AgeCohort,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_email: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Registration form contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "ageGroup")]
    pub age_cohort: AgeCohort,
    #[serde(default)]
    pub parent_email: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Register a companion wearable after the account is created.
    #[serde(default)]
    pub connect_device: bool,
}

impl ProfileDraft {
    /// Check required fields before any account is created.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Validation`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        require("email", &self.email)?;
        require("password", &self.password)?;
        if self.age_cohort.requires_guardian() {
            let present = self
                .parent_email
                .as_deref()
                .is_some_and(|e| !e.trim().is_empty());
            if !present {
                return Err(BuddyError::Validation(format!(
                    "parentEmail is required for the {} cohort",
                    self.age_cohort
                )));
            }
        }
        Ok(())
    }

    /// Build the profile record stored after the identity is created.
    pub fn into_profile(self, user_id: impl Into<String>, now: DateTime<Utc>) -> Profile {
        Profile {
            id: user_id.into(),
            name: self.name,
            email: self.email,
            age_cohort: self.age_cohort,
            parent_email: self.parent_email.filter(|e| !e.trim().is_empty()),
            language: self.language,
            habits: None,
            created_at: Some(now),
            updated_at: None,
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BuddyError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Partial profile update. `None` leaves a field untouched.
///
/// The cohort is deliberately absent: it cannot change after registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habits: Option<String>,
}

impl ProfilePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge into `profile`, last write wins per field.
    pub fn apply_to(&self, profile: &mut Profile, now: DateTime<Utc>) {
        if let Some(ref name) = self.name {
            profile.name = name.clone();
        }
        if let Some(ref email) = self.email {
            profile.email = email.clone();
        }
        if let Some(ref parent_email) = self.parent_email {
            profile.parent_email = Some(parent_email.clone());
        }
        if let Some(ref language) = self.language {
            profile.language = language.clone();
        }
        if let Some(ref habits) = self.habits {
            profile.habits = Some(habits.clone());
        }
        profile.updated_at = Some(now);
    }
}

/// A completed companion avatar. Read-only once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub favorite_color: String,
    pub character: String,
    pub personality: String,
    pub name: String,
    /// Derived from `character` once, at completion.
    pub emoji: String,
}

/// Avatar wizard output before the emoji is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarDraft {
    #[serde(default)]
    pub favorite_color: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub name: String,
}

impl AvatarDraft {
    /// Validate all four fields and derive the emoji.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Validation`] if any field is empty.
    pub fn complete(self) -> Result<Avatar> {
        require("favoriteColor", &self.favorite_color)?;
        require("character", &self.character)?;
        require("personality", &self.personality)?;
        require("name", &self.name)?;
        let emoji = emoji_for_character(&self.character).to_owned();
        Ok(Avatar {
            favorite_color: self.favorite_color,
            character: self.character,
            personality: self.personality,
            name: self.name.trim().to_owned(),
            emoji,
        })
    }
}
