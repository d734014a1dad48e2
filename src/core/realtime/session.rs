//! Realtime voice session manager.
//!
//! [`VoiceSessionManager`] owns one WebSocket connection to the realtime speech
//! API, the microphone capture feeding it and the command table run over
//! finalized transcripts. Consumers observe it through [`VoiceEvent`]s
//! delivered on a broadcast channel.
//!
//! # Lifecycle
//!
//! ```text
//! initialize(credential) -> connect() -> start_recording() -> stop_recording() -> disconnect()
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use advisor_voice::config::VoiceConfig;
//! use advisor_voice::core::audio::ChannelAudioBackend;
//! use advisor_voice::core::realtime::VoiceSessionManager;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (backend, _injector) = ChannelAudioBackend::new();
//! let session = VoiceSessionManager::new(VoiceConfig::default(), Arc::new(backend))?;
//! let mut events = session.subscribe();
//!
//! session.initialize("sk-...").await?;
//! session.connect().await?;
//! session.start_recording().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.name());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zeroize::Zeroize;

use super::base::{
    AdvisorContext, AudioDelta, ConnectionState, ErrorEvent, ErrorSource, RecordingState,
    VoiceEvent, VoiceResult, VoiceSessionError,
};
use super::openai::{
    ClientEvent, ConversationItem, InputAudioTranscription, OpenAIRealtimeAudioFormat,
    ServerEvent, SessionConfig, TurnDetection,
};
use super::token::TokenClient;
use crate::config::VoiceConfig;
use crate::core::audio::{AudioBackend, CaptureConstraints, CaptureStream, encode_frame_base64};
use crate::core::commands::CommandTable;

/// Channel capacity for outbound WebSocket messages
const WS_CHANNEL_CAPACITY: usize = 256;

/// How long `disconnect` waits for the close frame to go out
const CLOSE_GRACE_PERIOD: Duration = Duration::from_millis(500);

type RealtimeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Recording phases held in `Shared::recording`
const PHASE_IDLE: u8 = 0;
/// `start_recording` is waiting for the microphone
const PHASE_ARMING: u8 = 1;
const PHASE_RECORDING: u8 = 2;

struct CaptureHandle {
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

/// State shared between the manager, the connection task and the audio pump.
struct Shared {
    state: RwLock<ConnectionState>,
    /// Fast-path flag mirroring `state == Connected`
    connected: AtomicBool,
    recording: AtomicU8,
    /// Session id reported by `session.created`
    session_id: RwLock<Option<String>>,
    ws_sender: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    capture: Mutex<Option<CaptureHandle>>,
    events: broadcast::Sender<VoiceEvent>,
    commands: CommandTable,
}

impl Shared {
    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst) == PHASE_RECORDING
    }

    fn emit(&self, event: VoiceEvent) {
        tracing::debug!("Emitting {}", event.name());
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Transmit over the socket if it is open, otherwise drop silently.
    async fn send(&self, event: ClientEvent) {
        if !self.connected.load(Ordering::SeqCst) {
            tracing::debug!("Dropping {}: socket not open", event.event_type());
            return;
        }

        let sender = self.ws_sender.lock().clone();
        match sender {
            Some(sender) => {
                if let Err(e) = sender.send(event).await {
                    tracing::debug!("Dropping {}: connection task gone", e.0.event_type());
                }
            }
            None => tracing::debug!("Dropping {}: no sender", event.event_type()),
        }
    }

    fn handle_server_message(&self, text: &str) {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to parse server event: {}", e);
                return;
            }
        };

        if let ServerEvent::SessionCreated { session } = &event {
            tracing::info!("Realtime session created: {}", session.id);
            *self.session_id.write() = Some(session.id.clone());
        }

        for local in translate_server_event(event, &self.commands) {
            self.emit(local);
        }
    }

    /// Tear down after the socket closed. Emits `Disconnected` at most once per connection.
    fn on_closed(&self) {
        // A pending start sees the reset and gives up on its own
        if self.recording.swap(PHASE_IDLE, Ordering::SeqCst) == PHASE_RECORDING {
            if let Some(capture) = self.capture.lock().take() {
                capture.cancel.cancel();
            }
            self.emit(VoiceEvent::RecordingStopped);
        }

        *self.ws_sender.lock() = None;
        *self.session_id.write() = None;

        if self.connected.swap(false, Ordering::SeqCst) {
            *self.state.write() = ConnectionState::Disconnected;
            self.emit(VoiceEvent::Disconnected);
        }
    }
}

/// Map one server event to the local events it produces.
///
/// Unknown and uninteresting server events produce nothing.
pub fn translate_server_event(event: ServerEvent, commands: &CommandTable) -> Vec<VoiceEvent> {
    match event {
        ServerEvent::Error { error } => {
            tracing::error!("Realtime API error: {} - {}", error.error_type, error.message);
            vec![VoiceEvent::Error(ErrorEvent {
                source: ErrorSource::Server,
                message: error.message,
                error_type: Some(error.error_type).filter(|t| !t.is_empty()),
                code: error.code,
            })]
        }
        ServerEvent::SessionCreated { session } => vec![VoiceEvent::SessionCreated(session)],
        ServerEvent::SpeechStarted {
            audio_start_ms,
            item_id,
        } => vec![VoiceEvent::SpeechStarted {
            audio_start_ms,
            item_id,
        }],
        ServerEvent::SpeechStopped {
            audio_end_ms,
            item_id,
        } => vec![VoiceEvent::SpeechStopped {
            audio_end_ms,
            item_id,
        }],
        ServerEvent::TranscriptionCompleted {
            item_id,
            transcript,
        } => {
            let command = commands.recognize(&transcript);
            let mut events = vec![VoiceEvent::Transcript {
                text: transcript,
                item_id,
            }];
            if let Some(command) = command {
                tracing::info!(
                    "Recognized voice command {} ({:?})",
                    command.action,
                    command.value
                );
                events.push(VoiceEvent::VoiceCommand(command));
            }
            events
        }
        ServerEvent::AudioDelta {
            response_id,
            item_id,
            delta,
        } => vec![VoiceEvent::AudioResponse(AudioDelta {
            delta,
            item_id,
            response_id,
        })],
        ServerEvent::TextDelta { response_id, delta } => {
            vec![VoiceEvent::TextResponse { delta, response_id }]
        }
        ServerEvent::ResponseDone { response } => vec![VoiceEvent::ResponseComplete(response)],
        ServerEvent::TranscriptionFailed { item_id, error } => {
            tracing::warn!(
                "Transcription failed for item {:?}: {}",
                item_id,
                error.message
            );
            Vec::new()
        }
        ServerEvent::Unknown => {
            tracing::trace!("Ignoring unknown server event");
            Vec::new()
        }
        other => {
            tracing::trace!("Ignoring server event {:?}", other);
            Vec::new()
        }
    }
}

/// Owns one realtime voice session.
///
/// All operations take `&self`; share the manager behind an `Arc` to drive it
/// from several tasks.
pub struct VoiceSessionManager {
    config: VoiceConfig,
    backend: Arc<dyn AudioBackend>,
    token_client: TokenClient,
    constraints: CaptureConstraints,
    credential: RwLock<Option<String>>,
    audio_ready: AtomicBool,
    advisor: RwLock<Option<AdvisorContext>>,
    /// Bumped by `disconnect` so an in-flight `connect` can tell it was superseded
    generation: AtomicU64,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl VoiceSessionManager {
    /// Create a session manager.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the configuration fails validation.
    pub fn new(config: VoiceConfig, backend: Arc<dyn AudioBackend>) -> VoiceResult<Self> {
        config
            .validate()
            .map_err(VoiceSessionError::InvalidConfiguration)?;

        let token_client = TokenClient::new(config.token_endpoint.clone())?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            config,
            backend,
            token_client,
            constraints: CaptureConstraints::default(),
            credential: RwLock::new(None),
            audio_ready: AtomicBool::new(false),
            advisor: RwLock::new(None),
            generation: AtomicU64::new(0),
            connection_handle: Mutex::new(None),
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                connected: AtomicBool::new(false),
                recording: AtomicU8::new(PHASE_IDLE),
                session_id: RwLock::new(None),
                ws_sender: Mutex::new(None),
                capture: Mutex::new(None),
                events,
                commands: CommandTable::default_table().clone(),
            }),
        })
    }

    /// Replace the command grammar.
    pub fn with_command_table(mut self, commands: CommandTable) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.commands = commands;
        }
        self
    }

    pub fn with_capture_constraints(mut self, constraints: CaptureConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Subscribe to session events. Every subscriber sees every event in order.
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn recording_state(&self) -> RecordingState {
        if self.shared.is_recording() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.credential.read().is_some()
    }

    pub fn advisor_context(&self) -> Option<AdvisorContext> {
        self.advisor.read().clone()
    }

    /// Session id reported by the server, while connected.
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.read().clone()
    }

    /// Store the long-lived credential and resume the audio context.
    ///
    /// # Errors
    /// - `InvalidCredential` if the credential is empty
    /// - `AudioInit` if the audio context cannot be resumed
    pub async fn initialize(&self, credential: &str) -> VoiceResult<()> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(VoiceSessionError::InvalidCredential(
                "credential must not be empty".to_string(),
            ));
        }

        self.resume_audio().await?;

        let mut held = self.credential.write();
        if let Some(old) = held.as_mut() {
            old.zeroize();
        }
        *held = Some(credential.to_string());

        tracing::info!("Voice session initialized ({} audio)", self.backend.name());
        Ok(())
    }

    async fn resume_audio(&self) -> VoiceResult<()> {
        self.backend
            .resume()
            .await
            .map_err(|e| VoiceSessionError::AudioInit(e.to_string()))?;
        self.audio_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Exchange the credential and open the realtime socket.
    ///
    /// A no-op while already connected or connecting.
    ///
    /// # Errors
    /// - `NotInitialized` before `initialize`
    /// - `TokenExchange` / `ConnectionFailed` on failure
    /// - `Timeout` when either step exceeds its deadline
    /// - `NotConnected` if `disconnect` ran while connecting
    pub async fn connect(&self) -> VoiceResult<()> {
        let credential = self
            .credential
            .read()
            .clone()
            .ok_or(VoiceSessionError::NotInitialized)?;

        let generation = {
            let mut state = self.shared.state.write();
            if *state != ConnectionState::Disconnected {
                tracing::debug!("connect() ignored: already {}", *state);
                return Ok(());
            }
            *state = ConnectionState::Connecting;
            self.generation.load(Ordering::SeqCst)
        };
        let connection_id = Uuid::new_v4();
        let mut credential = credential;
        let result = self.establish(&credential, generation, connection_id).await;
        credential.zeroize();

        if let Err(e) = &result {
            tracing::warn!("Connection {} failed: {}", connection_id, e);
            if self.generation.load(Ordering::SeqCst) == generation {
                *self.shared.state.write() = ConnectionState::Disconnected;
            }
        }
        result
    }

    async fn establish(
        &self,
        credential: &str,
        generation: u64,
        connection_id: Uuid,
    ) -> VoiceResult<()> {
        let token = tokio::time::timeout(
            self.config.token_timeout(),
            self.token_client.exchange(credential),
        )
        .await
        .map_err(|_| {
            VoiceSessionError::Timeout(format!(
                "token exchange exceeded {}s",
                self.config.token_timeout_seconds
            ))
        })??;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::info!("Disconnected during token exchange, discarding token");
            return Err(VoiceSessionError::NotConnected);
        }

        let url = self.config.ws_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| VoiceSessionError::ConnectionFailed(e.to_string()))?;
        let auth = http::HeaderValue::from_str(&format!("Bearer {}", token.value))
            .map_err(|e| VoiceSessionError::ConnectionFailed(e.to_string()))?;
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", http::HeaderValue::from_static("realtime=v1"));
        drop(token);

        tracing::info!("Connecting to {} (connection {})", url, connection_id);

        let (ws_stream, _response) = tokio::time::timeout(
            self.config.connect_timeout(),
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| {
            VoiceSessionError::Timeout(format!(
                "WebSocket handshake exceeded {}s",
                self.config.connect_timeout_seconds
            ))
        })?
        .map_err(|e| VoiceSessionError::ConnectionFailed(e.to_string()))?;

        let session = self.build_session_config();

        // disconnect bumps the generation under this same lock
        let superseded = {
            let mut state = self.shared.state.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                Some(ws_stream)
            } else {
                let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);

                self.shared.connected.store(true, Ordering::SeqCst);
                *state = ConnectionState::Connected;
                tracing::info!("Connected to realtime API (connection {})", connection_id);
                self.shared.emit(VoiceEvent::Connected);

                // Fresh channel, cannot be full
                if let Err(e) = tx.try_send(ClientEvent::SessionUpdate { session }) {
                    tracing::warn!("Failed to queue session.update: {}", e);
                }
                *self.shared.ws_sender.lock() = Some(tx);

                let shared = self.shared.clone();
                let handle = tokio::spawn(run_connection(shared, ws_stream, rx, connection_id));
                *self.connection_handle.lock() = Some(handle);
                None
            }
        };

        if let Some(mut ws_stream) = superseded {
            tracing::info!("Disconnected during handshake, closing socket");
            let _ = ws_stream.close(None).await;
            return Err(VoiceSessionError::NotConnected);
        }

        Ok(())
    }

    /// Close the socket, stop recording and release the audio context.
    ///
    /// Idempotent and infallible.
    pub async fn disconnect(&self) {
        {
            let _state = self.shared.state.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        self.stop_recording().await;

        // Dropping the sender lets the connection task send a close frame
        drop(self.shared.ws_sender.lock().take());

        let handle = self.connection_handle.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(CLOSE_GRACE_PERIOD, handle).await.is_err() {
                tracing::debug!("Connection task did not finish in time, aborting");
                abort.abort();
            }
        }

        self.shared.on_closed();
        *self.shared.state.write() = ConnectionState::Disconnected;

        if self.audio_ready.swap(false, Ordering::SeqCst) {
            self.backend.close().await;
        }

        tracing::info!("Voice session disconnected");
    }

    /// Open the microphone and stream PCM16 frames to the server.
    ///
    /// A no-op while already recording or while another start is pending.
    ///
    /// # Errors
    /// - `NotConnected` unless connected
    /// - `PermissionDenied` / `AudioInit` if the microphone cannot be opened
    /// - `RecordingCancelled` if `stop_recording` ran while the microphone was opening
    pub async fn start_recording(&self) -> VoiceResult<()> {
        if !self.is_connected() {
            return Err(VoiceSessionError::NotConnected);
        }
        if self
            .shared
            .recording
            .compare_exchange(PHASE_IDLE, PHASE_ARMING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let stream = match self.open_capture().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = self.shared.recording.compare_exchange(
                    PHASE_ARMING,
                    PHASE_IDLE,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                tracing::error!("Failed to start recording: {}", e);
                return Err(e);
            }
        };

        {
            // stop_recording takes the capture handle under this lock
            let mut capture = self.shared.capture.lock();
            let armed = self
                .shared
                .recording
                .compare_exchange(
                    PHASE_ARMING,
                    PHASE_RECORDING,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();

            if !armed || !self.is_connected() {
                drop(capture);
                stream.stop();
                if armed {
                    self.shared.recording.store(PHASE_IDLE, Ordering::SeqCst);
                }
                if !self.is_connected() {
                    return Err(VoiceSessionError::NotConnected);
                }
                tracing::info!("Recording start cancelled while opening the microphone");
                return Err(VoiceSessionError::RecordingCancelled);
            }

            let cancel = stream.cancel_token();
            let pump = tokio::spawn(pump_audio(stream, self.shared.clone()));
            *capture = Some(CaptureHandle { cancel, pump });
        }

        tracing::info!(
            "Recording started ({}Hz, buffer {})",
            self.constraints.sample_rate,
            self.constraints.buffer_size
        );
        self.shared.emit(VoiceEvent::RecordingStarted);
        Ok(())
    }

    async fn open_capture(&self) -> VoiceResult<CaptureStream> {
        if !self.audio_ready.load(Ordering::SeqCst) {
            self.resume_audio().await?;
        }
        Ok(self.backend.open_microphone(&self.constraints).await?)
    }

    /// Stop capture, then commit the server-side audio buffer.
    ///
    /// A no-op unless recording. A start still waiting for the microphone is
    /// cancelled without any event or commit.
    pub async fn stop_recording(&self) {
        match self.shared.recording.swap(PHASE_IDLE, Ordering::SeqCst) {
            PHASE_RECORDING => {}
            PHASE_ARMING => {
                tracing::debug!("Cancelling pending recording start");
                return;
            }
            _ => return,
        }

        let capture = self.shared.capture.lock().take();
        if let Some(capture) = capture {
            capture.cancel.cancel();
            if let Err(e) = capture.pump.await
                && !e.is_cancelled()
            {
                tracing::error!("Audio pump task failed: {}", e);
            }
        }

        tracing::info!("Recording stopped");
        self.shared.emit(VoiceEvent::RecordingStopped);
        self.shared.send(ClientEvent::InputAudioBufferCommit).await;
    }

    /// Replace the active advisor persona.
    ///
    /// While connected the new instructions are pushed with a `session.update`.
    pub async fn set_advisor_context(&self, advisor: AdvisorContext) {
        tracing::info!("Advisor context set: {} ({})", advisor.name, advisor.role);
        *self.advisor.write() = Some(advisor.clone());
        self.shared.emit(VoiceEvent::AdvisorContextSet(advisor));

        if self.is_connected() {
            let session = SessionConfig {
                instructions: Some(self.instructions()),
                ..Default::default()
            };
            self.shared
                .send(ClientEvent::SessionUpdate { session })
                .await;
        }
    }

    /// Send a raw client event. Dropped silently unless the socket is open.
    pub async fn send(&self, event: ClientEvent) {
        self.shared.send(event).await;
    }

    /// Add a user text turn and ask for a response.
    ///
    /// # Errors
    /// `NotConnected` unless connected.
    pub async fn send_text(&self, text: &str) -> VoiceResult<()> {
        if !self.is_connected() {
            return Err(VoiceSessionError::NotConnected);
        }
        self.shared
            .send(ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(text),
            })
            .await;
        self.shared
            .send(ClientEvent::ResponseCreate { response: None })
            .await;
        Ok(())
    }

    /// Ask the model to respond to the current conversation.
    ///
    /// # Errors
    /// `NotConnected` unless connected.
    pub async fn request_response(&self) -> VoiceResult<()> {
        if !self.is_connected() {
            return Err(VoiceSessionError::NotConnected);
        }
        self.shared
            .send(ClientEvent::ResponseCreate { response: None })
            .await;
        Ok(())
    }

    /// Feed one raw server message through the event handler.
    pub fn handle_server_message(&self, text: &str) {
        self.shared.handle_server_message(text);
    }

    /// Base instructions, extended with the active advisor's persona.
    pub fn instructions(&self) -> String {
        match self.advisor.read().as_ref() {
            Some(advisor) => format!("{}\n\n{}", self.config.instructions, advisor.instructions()),
            None => self.config.instructions.clone(),
        }
    }

    /// Full `session.update` payload sent when the socket opens.
    pub fn build_session_config(&self) -> SessionConfig {
        let audio_format = OpenAIRealtimeAudioFormat::Pcm16.as_str().to_string();
        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(self.instructions()),
            voice: Some(self.config.realtime_voice().as_str().to_string()),
            input_audio_format: Some(audio_format.clone()),
            output_audio_format: Some(audio_format),
            input_audio_transcription: Some(InputAudioTranscription {
                model: self.config.transcription_model.clone(),
            }),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: Some(self.config.vad_threshold),
                prefix_padding_ms: Some(self.config.vad_prefix_padding_ms),
                silence_duration_ms: Some(self.config.vad_silence_duration_ms),
            }),
        }
    }
}

impl Drop for VoiceSessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.connection_handle.get_mut().take() {
            handle.abort();
        }
        if let Some(capture) = self.shared.capture.lock().take() {
            capture.cancel.cancel();
            capture.pump.abort();
        }
        if let Some(credential) = self.credential.get_mut().as_mut() {
            credential.zeroize();
        }
    }
}

/// Forward captured frames while both recording and connected hold.
async fn pump_audio(mut stream: CaptureStream, shared: Arc<Shared>) {
    let mut frames = 0u64;
    while let Some(frame) = stream.next_frame().await {
        if !(shared.is_recording() && shared.connected.load(Ordering::SeqCst)) {
            break;
        }
        let audio = encode_frame_base64(&frame);
        shared
            .send(ClientEvent::InputAudioBufferAppend { audio })
            .await;
        frames += 1;
    }
    tracing::debug!("Audio pump finished after {} frames", frames);
}

/// Socket I/O loop for one connection.
async fn run_connection(
    shared: Arc<Shared>,
    ws_stream: RealtimeSocket,
    mut rx: mpsc::Receiver<ClientEvent>,
    connection_id: Uuid,
) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else {
                    tracing::debug!("Sender dropped, closing connection {}", connection_id);
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                };

                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize event: {}", e);
                        continue;
                    }
                };

                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    tracing::error!("Failed to send WebSocket message: {}", e);
                    shared.emit(VoiceEvent::Error(ErrorEvent::transport(e.to_string())));
                    break;
                }
            }

            inbound = ws_stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        shared.handle_server_message(text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("WebSocket closed by server: {:?}", frame);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            tracing::error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        shared.emit(VoiceEvent::Error(ErrorEvent::transport(e.to_string())));
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    shared.on_closed();
    tracing::info!("Connection {} closed", connection_id);
}
