pub mod audio;
pub mod commands;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{AudioBackend, AudioError, CaptureConstraints, ChannelAudioBackend, WavFileBackend};

pub use commands::{CommandAction, CommandField, CommandTable, VoiceCommand};

pub use realtime::{
    AdvisorContext, ConnectionState, RecordingState, VoiceEvent, VoiceResult, VoiceSessionError,
    VoiceSessionManager,
};
