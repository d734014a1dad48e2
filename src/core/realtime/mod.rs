//! Realtime voice session module.
//!
//! Drives a bidirectional audio session with the OpenAI Realtime API on behalf
//! of the advisor UI: credential exchange, WebSocket lifecycle, microphone
//! streaming, server event decoding and voice command extraction.
//!
//! # Architecture
//!
//! - [`TokenClient`] exchanges the long-lived credential for an ephemeral one
//! - [`VoiceSessionManager`] owns the socket task and the audio pump
//! - [`VoiceEvent`] is the closed set of events delivered to subscribers
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian at 24kHz, mono, base64 on the wire.

mod base;
pub mod openai;
mod session;
mod token;

pub use base::{
    AdvisorContext, AudioDelta, ConnectionState, ErrorEvent, ErrorSource, RecordingState,
    VoiceEvent, VoiceResult, VoiceSessionError,
};
pub use session::{VoiceSessionManager, translate_server_event};
pub use token::{EphemeralToken, TokenClient};
