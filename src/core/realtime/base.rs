//! Base types for the realtime voice session.
//!
//! This module defines the error taxonomy, the connection and recording state
//! machines, the advisor persona held by a session, and the closed set of
//! events a session emits to its subscribers.
//!
//! # Audio Format
//!
//! Captured audio is sent as PCM 16-bit signed little-endian, mono, 24kHz.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::openai::{ResponseInfo, SessionInfo};
use crate::core::audio::AudioError;
use crate::core::commands::VoiceCommand;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during voice session operations.
#[derive(Debug, Clone, Error)]
pub enum VoiceSessionError {
    /// The long-lived credential is missing or empty
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The audio context could not be created or resumed
    #[error("Audio initialization failed: {0}")]
    AudioInit(String),

    /// Microphone access was refused
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Exchanging the credential for a session token failed
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The WebSocket handshake failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// `initialize` has not been called
    #[error("Session not initialized")]
    NotInitialized,

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// `stop_recording` ran while the microphone was still opening
    #[error("Recording start cancelled")]
    RecordingCancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for voice session operations.
pub type VoiceResult<T> = Result<T, VoiceSessionError>;

impl From<AudioError> for VoiceSessionError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::PermissionDenied(msg) => VoiceSessionError::PermissionDenied(msg),
            other => VoiceSessionError::AudioInit(other.to_string()),
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Connection state of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket is open
    #[default]
    Disconnected,
    /// Token exchange or handshake in progress
    Connecting,
    /// Socket is open
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Microphone recording state.
///
/// `Recording` is only ever observed while the connection is `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "idle"),
            RecordingState::Recording => write!(f, "recording"),
        }
    }
}

// =============================================================================
// Advisor Context
// =============================================================================

/// The advisor persona the user is currently talking to.
///
/// Owned by the embedding application; a session keeps a copy that is replaced
/// wholesale on every [`set_advisor_context`](super::VoiceSessionManager::set_advisor_context).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdvisorContext {
    pub name: String,
    pub role: String,
    /// Free-text persona description
    #[serde(default)]
    pub persona: String,
}

impl AdvisorContext {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            persona: persona.into(),
        }
    }

    /// Render the persona paragraph appended to the system instructions.
    pub fn instructions(&self) -> String {
        let mut out = format!(
            "You are currently speaking as {}, {}.",
            self.name.trim(),
            self.role.trim()
        );
        let persona = self.persona.trim();
        if !persona.is_empty() {
            out.push(' ');
            out.push_str(persona);
        }
        out
    }
}

// =============================================================================
// Emitted Events
// =============================================================================

/// Where an error event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// An `error` message sent by the realtime server
    Server,
    /// A socket-level failure
    Transport,
}

/// Payload of [`VoiceEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub source: ErrorSource,
    pub message: String,
    /// Server error type (e.g. `invalid_request_error`)
    pub error_type: Option<String>,
    pub code: Option<String>,
}

impl ErrorEvent {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            source: ErrorSource::Transport,
            message: message.into(),
            error_type: None,
            code: None,
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_type {
            Some(t) => write!(f, "{}: {}", t, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A chunk of synthesized audio from the server.
///
/// The delta is kept as received (base64 PCM16); playback belongs to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDelta {
    pub delta: String,
    pub item_id: Option<String>,
    pub response_id: Option<String>,
}

impl AudioDelta {
    /// Decode the delta into raw PCM16 little-endian bytes.
    pub fn pcm_bytes(&self) -> Result<bytes::Bytes, base64::DecodeError> {
        use base64::prelude::*;
        BASE64_STANDARD.decode(&self.delta).map(bytes::Bytes::from)
    }
}

/// Events emitted by a [`VoiceSessionManager`](super::VoiceSessionManager).
///
/// Every subscriber receives every event, in emission order.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    Connected,
    Disconnected,
    Error(ErrorEvent),
    SessionCreated(SessionInfo),
    SpeechStarted {
        audio_start_ms: u64,
        item_id: Option<String>,
    },
    SpeechStopped {
        audio_end_ms: u64,
        item_id: Option<String>,
    },
    /// Final transcript of the user's speech
    Transcript {
        text: String,
        item_id: Option<String>,
    },
    VoiceCommand(VoiceCommand),
    AudioResponse(AudioDelta),
    TextResponse {
        delta: String,
        response_id: Option<String>,
    },
    ResponseComplete(ResponseInfo),
    RecordingStarted,
    RecordingStopped,
    AdvisorContextSet(AdvisorContext),
}

impl VoiceEvent {
    /// Stable event name, matching the names used by UI collaborators.
    pub fn name(&self) -> &'static str {
        match self {
            VoiceEvent::Connected => "connected",
            VoiceEvent::Disconnected => "disconnected",
            VoiceEvent::Error(_) => "error",
            VoiceEvent::SessionCreated(_) => "sessionCreated",
            VoiceEvent::SpeechStarted { .. } => "speechStarted",
            VoiceEvent::SpeechStopped { .. } => "speechStopped",
            VoiceEvent::Transcript { .. } => "transcript",
            VoiceEvent::VoiceCommand(_) => "voiceCommand",
            VoiceEvent::AudioResponse(_) => "audioResponse",
            VoiceEvent::TextResponse { .. } => "textResponse",
            VoiceEvent::ResponseComplete(_) => "responseComplete",
            VoiceEvent::RecordingStarted => "recordingStarted",
            VoiceEvent::RecordingStopped => "recordingStopped",
            VoiceEvent::AdvisorContextSet(_) => "advisorContextSet",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }

    #[test]
    fn test_default_states() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(RecordingState::default(), RecordingState::Idle);
    }

    #[test]
    fn test_error_display() {
        let err = VoiceSessionError::TokenExchange("bad key".to_string());
        assert!(err.to_string().contains("Token exchange failed"));

        let err = VoiceSessionError::NotConnected;
        assert_eq!(err.to_string(), "Not connected");
    }

    #[test]
    fn test_audio_error_mapping() {
        let err: VoiceSessionError = AudioError::PermissionDenied("blocked".to_string()).into();
        assert!(matches!(err, VoiceSessionError::PermissionDenied(_)));

        let err: VoiceSessionError = AudioError::Unavailable("no device".to_string()).into();
        assert!(matches!(err, VoiceSessionError::AudioInit(_)));
    }

    #[test]
    fn test_advisor_instructions() {
        let advisor = AdvisorContext::new("Ada", "CTO", "Pragmatic and direct.");
        assert_eq!(
            advisor.instructions(),
            "You are currently speaking as Ada, CTO. Pragmatic and direct."
        );

        let bare = AdvisorContext::new("Ada", "CTO", "   ");
        assert_eq!(bare.instructions(), "You are currently speaking as Ada, CTO.");
    }

    #[test]
    fn test_audio_delta_decode() {
        let delta = AudioDelta {
            delta: "AAEC".to_string(),
            item_id: None,
            response_id: None,
        };
        assert_eq!(delta.pcm_bytes().unwrap().as_ref(), &[0u8, 1, 2]);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(VoiceEvent::Connected.name(), "connected");
        assert_eq!(VoiceEvent::RecordingStopped.name(), "recordingStopped");
        assert_eq!(
            VoiceEvent::AdvisorContextSet(AdvisorContext::default()).name(),
            "advisorContextSet"
        );
    }
}
