//! Error types for the companion core.

/// Top-level error type shared by the session machine, the speech
/// controllers and the backend clients.
#[derive(Debug, thiserror::Error)]
pub enum BuddyError {
    /// A required field is missing or malformed. Nothing was mutated.
    #[error("validation error: {0}")]
    Validation(String),

    /// The identity provider rejected the credentials.
    ///
    /// The message is the provider's own text, surfaced verbatim.
    #[error("{0}")]
    InvalidCredentials(String),

    /// An account with this identity already exists.
    #[error("duplicate account: {0}")]
    DuplicateAccount(String),

    /// The bearer credential was rejected or has expired.
    #[error("session expired or unauthorized")]
    Unauthorized,

    /// A voice capability (secure context, recognition, microphone) is missing.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A capture request arrived while the controller was not idle.
    #[error("capture rejected: {0}")]
    CaptureRejected(String),

    /// The session machine refused a navigation event in its current stage.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Network or storage failure talking to the backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Speech synthesis platform failure.
    #[error("speech error: {0}")]
    Speech(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl BuddyError {
    /// Whether this error must force the session back to the login view.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Stable category name reported to host shells.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::DuplicateAccount(_) => "duplicate_account",
            Self::Unauthorized => "unauthorized",
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::CaptureRejected(_) => "capture_rejected",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Backend(_) => "backend",
            Self::Speech(_) => "speech",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Channel(_) => "channel",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BuddyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_display_is_verbatim() {
        let err = BuddyError::InvalidCredentials("Invalid login credentials".into());
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[test]
    fn only_unauthorized_forces_logout() {
        assert!(BuddyError::Unauthorized.is_unauthorized());
        assert!(!BuddyError::Backend("timeout".into()).is_unauthorized());
        assert!(!BuddyError::InvalidCredentials("nope".into()).is_unauthorized());
    }
}
