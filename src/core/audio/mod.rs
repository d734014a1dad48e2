//! Audio capture and PCM encoding.
//!
//! Capture is abstracted behind [`AudioBackend`] so the session manager can be
//! driven by a native microphone pipeline, a WAV file or test frames alike.
//! Frames are float32 mono at the requested rate and are converted to PCM16
//! little-endian before being base64-encoded for the wire.

mod backend;
mod pcm;
mod wav;

pub use backend::{AudioBackend, CaptureStream, ChannelAudioBackend, FrameInjector};
pub use pcm::{
    FLOAT_TO_PCM_SCALE, decode_pcm16_le, downmix_to_mono, encode_frame_base64, encode_pcm16_le,
    float_to_pcm16, resample_linear,
};
pub use wav::{WavFileBackend, load_wav_mono};

use thiserror::Error;

use crate::core::realtime::openai::OPENAI_REALTIME_SAMPLE_RATE;

/// Samples per captured frame.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("Audio unavailable: {0}")]
    Unavailable(String),

    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio I/O error: {0}")]
    Io(String),
}

impl From<hound::Error> for AudioError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => AudioError::Io(io.to_string()),
            other => AudioError::UnsupportedFormat(other.to_string()),
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Microphone constraints requested when recording starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub buffer_size: usize,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: OPENAI_REALTIME_SAMPLE_RATE,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints() {
        let c = CaptureConstraints::default();
        assert_eq!(c.sample_rate, 24000);
        assert_eq!(c.channels, 1);
        assert!(c.echo_cancellation && c.noise_suppression && c.auto_gain_control);
        assert_eq!(c.buffer_size, 4096);
    }

    #[test]
    fn test_hound_error_mapping() {
        let io = hound::Error::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert!(matches!(AudioError::from(io), AudioError::Io(_)));
        assert!(matches!(
            AudioError::from(hound::Error::Unsupported),
            AudioError::UnsupportedFormat(_)
        ));
    }
}
