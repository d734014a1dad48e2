use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use zeroize::Zeroizing;

use advisor_voice::{
    AdvisorContext, VoiceConfig, VoiceEvent, VoiceSessionManager,
    core::audio::{AudioBackend, ChannelAudioBackend, WavFileBackend},
    core::commands::CommandTable,
};

/// Advisor Voice - realtime voice sessions for the board of advisors
#[derive(Parser, Debug)]
#[command(name = "advisor-voice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// WAV file streamed as microphone input
    #[arg(long = "wav", value_name = "FILE")]
    wav: Option<PathBuf>,

    /// Replay the WAV file at real-time speed
    #[arg(long = "realtime-pace")]
    realtime_pace: bool,

    /// Name of the advisor to speak as
    #[arg(long = "advisor-name", requires = "advisor_role")]
    advisor_name: Option<String>,

    /// Role of the advisor to speak as
    #[arg(long = "advisor-role", requires = "advisor_name")]
    advisor_role: Option<String>,

    /// Persona description of the advisor
    #[arg(long = "advisor-persona", default_value = "")]
    advisor_persona: String,

    /// Send a text turn instead of (or before) audio
    #[arg(long = "text")]
    text: Option<String>,

    /// Seconds to keep the session open
    #[arg(long = "listen-seconds", default_value_t = 15)]
    listen_seconds: u64,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run command recognition on a transcript without connecting
    Recognize {
        /// Transcript text
        text: String,
    },
}

fn describe(event: &VoiceEvent) -> String {
    match event {
        VoiceEvent::Error(err) => format!("error: {err}"),
        VoiceEvent::SessionCreated(info) => format!("sessionCreated: {} ({})", info.id, info.model),
        VoiceEvent::SpeechStarted { audio_start_ms, .. } => {
            format!("speechStarted at {audio_start_ms}ms")
        }
        VoiceEvent::SpeechStopped { audio_end_ms, .. } => {
            format!("speechStopped at {audio_end_ms}ms")
        }
        VoiceEvent::Transcript { text, .. } => format!("transcript: {text}"),
        VoiceEvent::VoiceCommand(cmd) => format!(
            "voiceCommand: {}",
            serde_json::to_string(cmd).unwrap_or_else(|_| cmd.action.to_string())
        ),
        VoiceEvent::AudioResponse(delta) => format!("audioResponse: {} bytes", delta.delta.len()),
        VoiceEvent::TextResponse { delta, .. } => format!("textResponse: {delta}"),
        VoiceEvent::ResponseComplete(info) => format!("responseComplete: {} ({})", info.id, info.status),
        VoiceEvent::AdvisorContextSet(advisor) => {
            format!("advisorContextSet: {} ({})", advisor.name, advisor.role)
        }
        other => other.name().to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    if let Some(Commands::Recognize { text }) = &cli.command {
        match CommandTable::default_table().recognize(text) {
            Some(cmd) => println!("{}", serde_json::to_string_pretty(&cmd)?),
            None => println!("no command recognized"),
        }
        return Ok(());
    }

    // Initialize crypto provider for TLS connections
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Load configuration from file or environment
    let config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from {}", config_path.display());
        VoiceConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        VoiceConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let credential = Zeroizing::new(
        config
            .openai_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not configured"))?,
    );

    let backend: Arc<dyn AudioBackend> = match &cli.wav {
        Some(path) => Arc::new(WavFileBackend::new(path).with_realtime_pacing(cli.realtime_pace)),
        None => Arc::new(ChannelAudioBackend::new().0),
    };

    let session = Arc::new(VoiceSessionManager::new(config, backend)?);

    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", describe(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event printer lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    session.initialize(&credential).await?;

    if let (Some(name), Some(role)) = (&cli.advisor_name, &cli.advisor_role) {
        session
            .set_advisor_context(AdvisorContext::new(name, role, cli.advisor_persona.as_str()))
            .await;
    }

    session.connect().await?;

    if let Some(text) = &cli.text {
        session.send_text(text).await?;
    }
    if cli.wav.is_some() {
        session.start_recording().await?;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(cli.listen_seconds)) => {}
    }

    session.stop_recording().await;
    session.disconnect().await;

    drop(session);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    Ok(())
}
