//! Onboarding: landing, authentication, registration, avatar creation and
//! dashboard routing.

pub mod machine;
pub mod session;
pub mod stage;
pub mod wizard;

pub use machine::OnboardingSessionMachine;
pub use session::{Session, SessionSnapshot};
pub use stage::{AuthMode, OnboardingStage, SessionEvent, transition};
pub use wizard::{AvatarWizard, WizardProgress, WizardStep};
