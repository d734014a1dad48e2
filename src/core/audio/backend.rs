//! Audio capture abstraction.
//!
//! An [`AudioBackend`] owns the platform capture context. The session resumes it
//! on `initialize`, asks it for a [`CaptureStream`] when recording starts and
//! closes it on `disconnect`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{AudioError, AudioResult, CaptureConstraints};

/// Capacity of the frame channel between a producer and the session.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Platform audio capture.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Create or resume the capture context.
    async fn resume(&self) -> AudioResult<()>;

    /// Request microphone access and start producing float32 frames.
    async fn open_microphone(&self, constraints: &CaptureConstraints)
    -> AudioResult<CaptureStream>;

    /// Release the capture context. Never fails.
    async fn close(&self);

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// An ordered stream of captured float32 frames.
///
/// Cancelling (or dropping) the stream stops its producer.
pub struct CaptureStream {
    frames: mpsc::Receiver<Vec<f32>>,
    cancel: CancellationToken,
}

impl CaptureStream {
    pub fn new(frames: mpsc::Receiver<Vec<f32>>, cancel: CancellationToken) -> Self {
        Self { frames, cancel }
    }

    /// Create a stream together with the sender a producer pushes into.
    pub fn channel() -> (mpsc::Sender<Vec<f32>>, Self) {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        (tx, Self::new(rx, CancellationToken::new()))
    }

    /// Next frame in capture order, or `None` once the stream is stopped or exhausted.
    pub async fn next_frame(&mut self) -> Option<Vec<f32>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            frame = self.frames.recv() => frame,
        }
    }

    /// Token observed by the producer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Channel Backend
// =============================================================================

#[derive(Default)]
struct ChannelState {
    unavailable: bool,
    permission_denied: bool,
    resumed: bool,
    sink: Option<mpsc::Sender<Vec<f32>>>,
    cancel: Option<CancellationToken>,
}

/// Backend fed by the embedding application through a [`FrameInjector`].
///
/// Native hosts that already run their own capture pipeline hand frames over
/// here; it is also the backend used in tests.
#[derive(Clone)]
pub struct ChannelAudioBackend {
    state: Arc<Mutex<ChannelState>>,
}

/// Producer handle for a [`ChannelAudioBackend`].
#[derive(Clone)]
pub struct FrameInjector {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelAudioBackend {
    pub fn new() -> (Self, FrameInjector) {
        let state = Arc::new(Mutex::new(ChannelState::default()));
        (
            Self {
                state: state.clone(),
            },
            FrameInjector { state },
        )
    }

    /// A backend whose context can never be resumed (no audio device).
    pub fn unavailable() -> (Self, FrameInjector) {
        let (backend, injector) = Self::new();
        backend.state.lock().unavailable = true;
        (backend, injector)
    }

    /// A backend that refuses microphone access.
    pub fn permission_denied() -> (Self, FrameInjector) {
        let (backend, injector) = Self::new();
        backend.state.lock().permission_denied = true;
        (backend, injector)
    }

    pub fn is_resumed(&self) -> bool {
        self.state.lock().resumed
    }
}

impl FrameInjector {
    /// Push one frame to the open microphone stream.
    ///
    /// Returns `false` when no stream is open or it has been stopped.
    pub async fn push(&self, frame: Vec<f32>) -> bool {
        let sink = {
            let state = self.state.lock();
            match (&state.sink, &state.cancel) {
                (Some(sink), Some(cancel)) if !cancel.is_cancelled() => Some(sink.clone()),
                _ => None,
            }
        };
        match sink {
            Some(sink) => sink.send(frame).await.is_ok(),
            None => false,
        }
    }

    /// Whether a microphone stream is currently open.
    pub fn is_capturing(&self) -> bool {
        let state = self.state.lock();
        state.sink.as_ref().is_some_and(|s| !s.is_closed())
            && state.cancel.as_ref().is_some_and(|c| !c.is_cancelled())
    }
}

#[async_trait]
impl AudioBackend for ChannelAudioBackend {
    async fn resume(&self) -> AudioResult<()> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(AudioError::Unavailable(
                "no audio capture device available".to_string(),
            ));
        }
        state.resumed = true;
        Ok(())
    }

    async fn open_microphone(
        &self,
        constraints: &CaptureConstraints,
    ) -> AudioResult<CaptureStream> {
        let mut state = self.state.lock();
        if !state.resumed {
            return Err(AudioError::Unavailable(
                "audio context is not running".to_string(),
            ));
        }
        if state.permission_denied {
            return Err(AudioError::PermissionDenied(
                "microphone access was denied".to_string(),
            ));
        }

        tracing::debug!(
            "Opening injected microphone stream at {}Hz, {} channel(s)",
            constraints.sample_rate,
            constraints.channels
        );

        let (tx, stream) = CaptureStream::channel();
        state.sink = Some(tx);
        state.cancel = Some(stream.cancel_token());
        Ok(stream)
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.sink = None;
        state.resumed = false;
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
