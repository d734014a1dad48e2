//! OpenAI Realtime API protocol module.
//!
//! Wire types and constants for OpenAI's WebSocket Realtime API. The session
//! lifecycle that drives them lives in [`crate::core::realtime::VoiceSessionManager`].
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz, mono.

mod config;
mod messages;

pub use config::{
    DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
    OpenAIRealtimeAudioFormat, OpenAIRealtimeModel, OpenAIRealtimeVoice,
};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, InputAudioTranscription, ResponseConfig,
    ResponseInfo, ServerEvent, SessionConfig, SessionInfo, TurnDetection,
};
