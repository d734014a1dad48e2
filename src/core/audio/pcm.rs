//! PCM sample conversion helpers.

use base64::prelude::*;

/// Scale applied to a float sample in `[-1.0, 1.0]` to reach the i16 range.
pub const FLOAT_TO_PCM_SCALE: f32 = 32768.0;

/// Convert one float32 sample to PCM16.
///
/// `clamp(round(s * 32768), -32768, 32767)`; NaN maps to silence.
#[inline]
pub fn float_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * FLOAT_TO_PCM_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert a float32 frame to PCM16 little-endian bytes.
pub fn encode_pcm16_le(frame: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len() * 2);
    for &sample in frame {
        out.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }
    out
}

/// Convert a float32 frame to base64-encoded PCM16, the payload of
/// `input_audio_buffer.append`.
pub fn encode_frame_base64(frame: &[f32]) -> String {
    BASE64_STANDARD.encode(encode_pcm16_le(frame))
}

/// Decode PCM16 little-endian bytes back into samples. A trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Resample with linear interpolation.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;

    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 * ratio;
        let idx0 = (src_idx.floor() as usize).min(samples.len() - 1);
        let idx1 = (idx0 + 1).min(samples.len() - 1);
        let frac = src_idx - idx0 as f64;

        let sample = samples[idx0] as f64 * (1.0 - frac) + samples[idx1] as f64 * frac;
        resampled.push(sample as f32);
    }
    resampled
}
