//! WAV file capture backend.
//!
//! Replays a WAV file as if it were a microphone: samples are normalized to
//! float32, downmixed to mono, resampled to the requested rate and delivered
//! in `buffer_size` frames.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::backend::{AudioBackend, CaptureStream};
use super::pcm::{downmix_to_mono, resample_linear};
use super::{AudioError, AudioResult, CaptureConstraints};

pub struct WavFileBackend {
    path: PathBuf,
    realtime_pacing: bool,
    resumed: AtomicBool,
}

impl WavFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            realtime_pacing: false,
            resumed: AtomicBool::new(false),
        }
    }

    /// Sleep for each frame's duration between frames.
    pub fn with_realtime_pacing(mut self, enabled: bool) -> Self {
        self.realtime_pacing = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a WAV file into mono float32 samples at `target_rate`.
pub fn load_wav_mono(path: &Path, target_rate: u32) -> AudioResult<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let mono = downmix_to_mono(&samples, spec.channels);
    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

#[async_trait]
impl AudioBackend for WavFileBackend {
    async fn resume(&self) -> AudioResult<()> {
        let path = self.path.clone();
        let spec = tokio::task::spawn_blocking(move || {
            hound::WavReader::open(&path).map(|reader| reader.spec())
        })
        .await
        .map_err(|e| AudioError::Unavailable(e.to_string()))??;

        tracing::debug!(
            "WAV source {} ({}Hz, {} channel(s), {} bit)",
            self.path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );
        self.resumed.store(true, Ordering::Release);
        Ok(())
    }

    async fn open_microphone(
        &self,
        constraints: &CaptureConstraints,
    ) -> AudioResult<CaptureStream> {
        if !self.resumed.load(Ordering::Acquire) {
            return Err(AudioError::Unavailable(
                "audio context is not running".to_string(),
            ));
        }

        let sample_rate = constraints.sample_rate;
        if sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat(
                "sample rate must be greater than zero".to_string(),
            ));
        }

        let path = self.path.clone();
        let samples = tokio::task::spawn_blocking(move || load_wav_mono(&path, sample_rate))
            .await
            .map_err(|e| AudioError::Unavailable(e.to_string()))??;

        let buffer_size = constraints.buffer_size.max(1);
        let frame_duration = Duration::from_secs_f64(buffer_size as f64 / sample_rate as f64);
        let pacing = self.realtime_pacing;

        let (tx, stream) = CaptureStream::channel();
        let cancel = stream.cancel_token();

        tracing::info!(
            "Replaying {} samples from {} in frames of {}",
            samples.len(),
            self.path.display(),
            buffer_size
        );

        tokio::spawn(async move {
            for chunk in samples.chunks(buffer_size) {
                if cancel.is_cancelled() {
                    break;
                }
                if tx.send(chunk.to_vec()).await.is_err() {
                    break;
                }
                if pacing {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(frame_duration) => {}
                    }
                }
            }
            tracing::debug!("WAV replay finished");
        });

        Ok(stream)
    }

    async fn close(&self) {
        self.resumed.store(false, Ordering::Release);
    }

    fn name(&self) -> &'static str {
        "wav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[i16]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn mono_24k() -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[tokio::test]
    async fn test_replays_in_buffer_sized_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        write_wav(&path, mono_24k(), &vec![16384i16; 10000]);

        let backend = WavFileBackend::new(&path);
        backend.resume().await.unwrap();
        let mut stream = backend
            .open_microphone(&CaptureConstraints::default())
            .await
            .unwrap();

        let mut sizes = Vec::new();
        while let Some(frame) = stream.next_frame().await {
            assert!(frame.iter().all(|&s| (s - 0.5).abs() < 1e-6));
            sizes.push(frame.len());
        }
        assert_eq!(sizes, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_stereo_48k_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        // 4800 stereo frames = 0.1s
        let interleaved: Vec<i16> = (0..4800).flat_map(|_| [16384i16, -16384]).collect();
        write_wav(&path, spec, &interleaved);

        let samples = load_wav_mono(&path, 24000).unwrap();
        assert_eq!(samples.len(), 2400);
        assert!(samples.iter().all(|s| s.abs() < 1e-6));
    }

    #[tokio::test]
    async fn test_missing_file_fails_resume() {
        let backend = WavFileBackend::new("/nonexistent/input.wav");
        let result = backend.resume().await;
        assert!(matches!(result, Err(AudioError::Io(_))));
    }

    #[tokio::test]
    async fn test_zero_sample_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        write_wav(&path, mono_24k(), &vec![0i16; 100]);

        let backend = WavFileBackend::new(&path);
        backend.resume().await.unwrap();

        let mut constraints = CaptureConstraints::default();
        constraints.sample_rate = 0;
        let result = backend.open_microphone(&constraints).await;
        assert!(matches!(result, Err(AudioError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_open_requires_resume() {
        let backend = WavFileBackend::new("/nonexistent/input.wav");
        let result = backend.open_microphone(&CaptureConstraints::default()).await;
        assert!(matches!(result, Err(AudioError::Unavailable(_))));
    }
}
