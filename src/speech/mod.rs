//! Voice input and output controllers.
//!
//! - [`output`]: at most one synthesized utterance at a time, with cohort
//!   voice parameters and an estimated speaking duration.
//! - [`capture`]: microphone availability probing and single-utterance
//!   recognition sessions behind an explicit state machine.

pub mod capture;
pub mod output;

pub use capture::{
    CaptureHandle, CaptureOutcome, CapturePlatform, MicrophoneError, RecognitionError,
    RecognitionEvent, RecognitionFeed, RecognitionRequest, RecognitionSession,
    ScriptedCapturePlatform, TranscriptCallback, VoiceCaptureController, VoiceCaptureState,
    locale_for_language,
};
pub use output::{
    DurationModel, LinearDurationModel, RecordingSynthesizer, SpeechOutputController,
    SpeechSynthesizer, SpokenUtterance, Utterance, VoiceParams,
};
