//! Four-step avatar creation wizard: color, character, personality, name.

use crate::error::{BuddyError, Result};
use crate::profile::{
    AvatarDraft, CHARACTER_EMOJIS, FAVORITE_COLORS, PERSONALITIES, SUGGESTED_NAMES,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Color,
    Character,
    Personality,
    Name,
}

impl WizardStep {
    /// 1-based position shown in the progress indicator.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Color => 1,
            Self::Character => 2,
            Self::Personality => 3,
            Self::Name => 4,
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            Self::Color => Some(Self::Character),
            Self::Character => Some(Self::Personality),
            Self::Personality => Some(Self::Name),
            Self::Name => None,
        }
    }

    fn previous(self) -> Option<Self> {
        match self {
            Self::Color => None,
            Self::Character => Some(Self::Color),
            Self::Personality => Some(Self::Character),
            Self::Name => Some(Self::Personality),
        }
    }

    /// Choices offered at this step. For [`WizardStep::Name`] these are
    /// suggestions; any non-empty name is accepted.
    #[must_use]
    pub fn options(self) -> Vec<&'static str> {
        match self {
            Self::Color => FAVORITE_COLORS.to_vec(),
            Self::Character => CHARACTER_EMOJIS.iter().map(|(name, _)| *name).collect(),
            Self::Personality => PERSONALITIES.to_vec(),
            Self::Name => SUGGESTED_NAMES.to_vec(),
        }
    }
}

/// Result of [`AvatarWizard::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardProgress {
    Step(WizardStep),
    Complete(AvatarDraft),
}

#[derive(Debug, Clone)]
pub struct AvatarWizard {
    step: WizardStep,
    draft: AvatarDraft,
}

impl Default for AvatarWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl AvatarWizard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            step: WizardStep::Color,
            draft: AvatarDraft::default(),
        }
    }

    #[must_use]
    pub fn step(&self) -> WizardStep {
        self.step
    }

    #[must_use]
    pub fn draft(&self) -> &AvatarDraft {
        &self.draft
    }

    /// Fill the current step's field.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Validation`] if `value` is not one of the
    /// step's options (color, character, personality) or is blank (name).
    pub fn select(&mut self, value: &str) -> Result<()> {
        let value = value.trim();
        if self.step != WizardStep::Name && !self.step.options().iter().any(|o| *o == value) {
            return Err(BuddyError::Validation(format!(
                "{value:?} is not a valid {} choice",
                self.step_label()
            )));
        }
        if value.is_empty() {
            return Err(BuddyError::Validation("name is required".into()));
        }
        let field = match self.step {
            WizardStep::Color => &mut self.draft.favorite_color,
            WizardStep::Character => &mut self.draft.character,
            WizardStep::Personality => &mut self.draft.personality,
            WizardStep::Name => &mut self.draft.name,
        };
        *field = value.to_owned();
        Ok(())
    }

    fn step_label(&self) -> &'static str {
        match self.step {
            WizardStep::Color => "color",
            WizardStep::Character => "character",
            WizardStep::Personality => "personality",
            WizardStep::Name => "name",
        }
    }

    fn current_value(&self) -> &str {
        match self.step {
            WizardStep::Color => &self.draft.favorite_color,
            WizardStep::Character => &self.draft.character,
            WizardStep::Personality => &self.draft.personality,
            WizardStep::Name => &self.draft.name,
        }
    }

    #[must_use]
    pub fn can_proceed(&self) -> bool {
        !self.current_value().trim().is_empty()
    }

    /// Advance, or hand back the finished draft after the name step.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::Validation`] if the current step is unfilled.
    pub fn next(&mut self) -> Result<WizardProgress> {
        if !self.can_proceed() {
            return Err(BuddyError::Validation(format!(
                "{} is required",
                self.step_label()
            )));
        }
        match self.step.next() {
            Some(step) => {
                self.step = step;
                Ok(WizardProgress::Step(step))
            }
            None => Ok(WizardProgress::Complete(self.draft.clone())),
        }
    }

    /// Step back, keeping earlier answers. Returns `false` on the first step.
    pub fn previous(&mut self) -> bool {
        match self.step.previous() {
            Some(step) => {
                self.step = step;
                true
            }
            None => false,
        }
    }
}
