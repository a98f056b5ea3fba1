//! Versioned host command/event envelopes for native shell integration.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands a native shell may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "session.get_state")]
    SessionGetState,
    #[serde(rename = "session.restore")]
    SessionRestore,
    #[serde(rename = "session.logo")]
    SessionLogo,
    #[serde(rename = "session.choose_auth")]
    SessionChooseAuth,
    #[serde(rename = "session.back")]
    SessionBack,
    #[serde(rename = "session.select_cohort")]
    SessionSelectCohort,
    #[serde(rename = "session.login")]
    SessionLogin,
    #[serde(rename = "session.register")]
    SessionRegister,
    #[serde(rename = "session.complete_avatar")]
    SessionCompleteAvatar,
    #[serde(rename = "session.update_profile")]
    SessionUpdateProfile,
    #[serde(rename = "session.logout")]
    SessionLogout,
    #[serde(rename = "conversation.send_text")]
    ConversationSendText,
    #[serde(rename = "conversation.transcript")]
    ConversationTranscript,
    #[serde(rename = "conversation.history")]
    ConversationHistory,
    #[serde(rename = "voice.probe")]
    VoiceProbe,
    /// In-process capture. With the shell platform the `buddy-host` binary
    /// ships, this is always refused; such shells recognise speech
    /// themselves and send `conversation.transcript`.
    #[serde(rename = "voice.start")]
    VoiceStart,
    #[serde(rename = "voice.stop")]
    VoiceStop,
    #[serde(rename = "speech.cancel")]
    SpeechCancel,
    #[serde(rename = "care.record_health")]
    CareRecordHealth,
    #[serde(rename = "care.health_history")]
    CareHealthHistory,
    #[serde(rename = "care.parent_report")]
    CareParentReport,
    /// Emergency alert; senior dashboard only.
    #[serde(rename = "care.sos")]
    CareSos,
}

impl CommandName {
    /// Every command, in wire order.
    pub const ALL: &'static [CommandName] = &[
        Self::HostPing,
        Self::HostVersion,
        Self::SessionGetState,
        Self::SessionRestore,
        Self::SessionLogo,
        Self::SessionChooseAuth,
        Self::SessionBack,
        Self::SessionSelectCohort,
        Self::SessionLogin,
        Self::SessionRegister,
        Self::SessionCompleteAvatar,
        Self::SessionUpdateProfile,
        Self::SessionLogout,
        Self::ConversationSendText,
        Self::ConversationTranscript,
        Self::ConversationHistory,
        Self::VoiceProbe,
        Self::VoiceStart,
        Self::VoiceStop,
        Self::SpeechCancel,
        Self::CareRecordHealth,
        Self::CareHealthHistory,
        Self::CareParentReport,
        Self::CareSos,
    ];

    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::SessionGetState => "session.get_state",
            Self::SessionRestore => "session.restore",
            Self::SessionLogo => "session.logo",
            Self::SessionChooseAuth => "session.choose_auth",
            Self::SessionBack => "session.back",
            Self::SessionSelectCohort => "session.select_cohort",
            Self::SessionLogin => "session.login",
            Self::SessionRegister => "session.register",
            Self::SessionCompleteAvatar => "session.complete_avatar",
            Self::SessionUpdateProfile => "session.update_profile",
            Self::SessionLogout => "session.logout",
            Self::ConversationSendText => "conversation.send_text",
            Self::ConversationTranscript => "conversation.transcript",
            Self::ConversationHistory => "conversation.history",
            Self::VoiceProbe => "voice.probe",
            Self::VoiceStart => "voice.start",
            Self::VoiceStop => "voice.stop",
            Self::SpeechCancel => "speech.cancel",
            Self::CareRecordHealth => "care.record_health",
            Self::CareHealthHistory => "care.health_history",
            Self::CareParentReport => "care.parent_report",
            Self::CareSos => "care.sos",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == raw)
    }
}

/// Events pushed to the shell without a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    SessionStage,
    ConversationTurn,
    SpeechUtterance,
    SpeechCancelled,
    AvatarTalking,
}

impl EventName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionStage => "session.stage",
            Self::ConversationTurn => "conversation.turn",
            Self::SpeechUtterance => "speech.utterance",
            Self::SpeechCancelled => "speech.cancelled",
            Self::AvatarTalking => "avatar.talking",
        }
    }
}

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
    /// Stable error category, e.g. `validation` or `unauthorized`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
            error_kind: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
            error_kind: None,
        }
    }

    /// Map a handler result, keeping the error's category for the shell.
    #[must_use]
    pub fn from_result(
        request_id: impl Into<String>,
        result: crate::Result<serde_json::Value>,
    ) -> Self {
        match result {
            Ok(payload) => Self::ok(request_id, payload),
            Err(e) => Self {
                error_kind: Some(e.kind().to_owned()),
                ..Self::error(request_id, e.to_string())
            },
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {EVENT_VERSION}",
                    self.v
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build an event with a fresh id.
    #[must_use]
    pub fn new(event: EventName, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: uuid::Uuid::new_v4().to_string(),
            event: event.as_str().to_owned(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::BuddyError;

    #[test]
    fn command_names_round_trip() {
        for command in CommandName::ALL {
            assert_eq!(CommandName::parse(command.as_str()), Some(*command));
            let json = serde_json::to_value(command).unwrap();
            assert_eq!(json, serde_json::json!(command.as_str()));
        }
        assert_eq!(CommandName::parse("runtime.start"), None);
    }

    #[test]
    fn rejects_wrong_version_and_blank_id() {
        let mut envelope = CommandEnvelope::new("r1", CommandName::HostPing, serde_json::json!({}));
        assert!(envelope.validate().is_ok());
        envelope.v = 2;
        assert_eq!(
            envelope.validate().unwrap_err().kind,
            ContractErrorKind::UnsupportedVersion
        );
        let blank = CommandEnvelope::new(" ", CommandName::HostPing, serde_json::json!({}));
        assert_eq!(
            blank.validate().unwrap_err().kind,
            ContractErrorKind::InvalidEnvelope
        );
    }

    #[test]
    fn payload_defaults_to_null() {
        let envelope: CommandEnvelope =
            serde_json::from_str(r#"{"v":1,"request_id":"a","command":"session.back"}"#).unwrap();
        assert_eq!(envelope.command, CommandName::SessionBack);
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn error_response_carries_kind() {
        let err = BuddyError::Validation("email is required".into());
        let response = ResponseEnvelope::from_result("r9", Err(err));
        assert!(!response.ok);
        assert_eq!(response.error_kind.as_deref(), Some("validation"));
        assert_eq!(
            response.error.as_deref(),
            Some("validation error: email is required")
        );
    }
}
