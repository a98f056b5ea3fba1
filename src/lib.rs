//! Buddy: an age-aware conversational companion core.
//!
//! A user walks through onboarding (login or registration, age cohort,
//! avatar) and lands on a dashboard tailored to their cohort, where they chat
//! with the companion by text or voice.
//!
//! # Architecture
//!
//! - **Onboarding**: [`OnboardingSessionMachine`] drives the stage machine
//!   against the identity, profile and avatar collaborators in [`backend`].
//! - **Responses**: [`ResponseEngine`] picks a cohort-appropriate reply by
//!   keyword pattern.
//! - **Voice capture**: [`VoiceCaptureController`] probes availability and
//!   runs single-utterance recognition sessions.
//! - **Speech output**: [`SpeechOutputController`] owns the one active
//!   utterance and estimates its duration.
//! - **Avatar**: [`TalkingAvatarSync`] animates for the estimated duration.
//! - **Dashboard**: [`DashboardConversationSession`] ties them together.
//! - **Care**: [`care::CareDesk`] records health readings, reports to a
//!   parent and raises the senior emergency alert.
//! - **Host**: [`host`] exposes all of it to a native shell over JSON.

pub mod avatar_sync;
pub mod backend;
pub mod care;
pub mod cohort;
pub mod config;
pub mod conversation;
pub mod error;
pub mod host;
pub mod i18n;
pub mod onboarding;
pub mod profile;
pub mod response;
pub mod speech;

pub use avatar_sync::{AnimationProfile, Emotion, TalkingAvatarSync};
pub use backend::{AuthSession, Backend, HttpBackend, InMemoryBackend};
pub use care::{CareDesk, HealthReading, HealthRecord, SosAlert};
pub use cohort::{AgeCohort, DashboardVariant, ResponseSet};
pub use config::BuddyConfig;
pub use conversation::{ConversationTurn, DashboardConversationSession, Speaker};
pub use error::{BuddyError, Result};
pub use onboarding::{OnboardingSessionMachine, OnboardingStage, Session};
pub use profile::{Avatar, AvatarDraft, Profile, ProfileDraft, ProfilePatch};
pub use response::ResponseEngine;
pub use speech::{SpeechOutputController, VoiceCaptureController, VoiceCaptureState};
