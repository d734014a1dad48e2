//! Configuration module for the advisor voice session
//!
//! Configuration comes from .env files, environment variables and an optional
//! YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//!
//! # Example
//! ```rust,no_run
//! use advisor_voice::config::VoiceConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = VoiceConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = VoiceConfig::from_file(&PathBuf::from("voice.yaml"))?;
//!
//! println!("Token endpoint: {}", config.token_endpoint);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

mod env;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::realtime::openai::{
    DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_URL, OpenAIRealtimeModel, OpenAIRealtimeVoice,
};
use crate::utils::url_validation::{validate_realtime_url, validate_token_endpoint};

/// Default token-issuing backend route
pub const DEFAULT_TOKEN_ENDPOINT: &str = "http://localhost:3001/api/realtime/session";

/// System instruction sent with every session configuration
pub const DEFAULT_INSTRUCTIONS: &str = "You are a member of the user's personal board of advisors. \
Listen carefully, answer conversationally and keep spoken replies short. \
When the user asks to create, edit or select an advisor, acknowledge the request briefly.";

pub const DEFAULT_VAD_THRESHOLD: f32 = 0.5;
pub const DEFAULT_VAD_PREFIX_PADDING_MS: u32 = 300;
pub const DEFAULT_VAD_SILENCE_DURATION_MS: u32 = 500;
pub const DEFAULT_TOKEN_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Voice session configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Long-lived credential used when none is passed to `initialize`
    pub openai_api_key: Option<String>,

    /// Backend route exchanging the credential for a short-lived one
    pub token_endpoint: String,
    /// Realtime WebSocket endpoint (model is appended as a query parameter)
    pub realtime_url: String,
    pub model: String,
    pub voice: String,
    pub transcription_model: String,
    /// Base system instruction
    pub instructions: String,

    // Server VAD
    /// Activation threshold, 0.0 to 1.0
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,

    // Deadlines
    pub token_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,

    /// Per-subscriber event buffer
    pub event_capacity: usize,

    /// Accept plain-text schemes for non-loopback hosts
    pub allow_insecure_urls: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            realtime_url: OPENAI_REALTIME_URL.to_string(),
            model: OpenAIRealtimeModel::default().as_str().to_string(),
            voice: OpenAIRealtimeVoice::default().as_str().to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            vad_threshold: DEFAULT_VAD_THRESHOLD,
            vad_prefix_padding_ms: DEFAULT_VAD_PREFIX_PADDING_MS,
            vad_silence_duration_ms: DEFAULT_VAD_SILENCE_DURATION_MS,
            token_timeout_seconds: DEFAULT_TOKEN_TIMEOUT_SECONDS,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            allow_insecure_urls: false,
        }
    }
}

/// Zeroize the credential when the configuration is dropped.
impl Drop for VoiceConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl VoiceConfig {
    /// Load configuration from environment variables on top of defaults
    ///
    /// The .env file is loaded in main.rs at application startup.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.apply_yaml(yaml_config);
        config.validate()?;

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(openai) = yaml.openai
            && let Some(key) = openai.api_key
        {
            self.openai_api_key = Some(key);
        }
        if let Some(token) = yaml.token {
            if let Some(v) = token.endpoint {
                self.token_endpoint = v;
            }
            if let Some(v) = token.timeout_seconds {
                self.token_timeout_seconds = v;
            }
        }
        if let Some(realtime) = yaml.realtime {
            if let Some(v) = realtime.url {
                self.realtime_url = v;
            }
            if let Some(v) = realtime.model {
                self.model = v;
            }
            if let Some(v) = realtime.voice {
                self.voice = v;
            }
            if let Some(v) = realtime.transcription_model {
                self.transcription_model = v;
            }
            if let Some(v) = realtime.instructions {
                self.instructions = v;
            }
            if let Some(v) = realtime.connect_timeout_seconds {
                self.connect_timeout_seconds = v;
            }
            if let Some(v) = realtime.event_capacity {
                self.event_capacity = v;
            }
        }
        if let Some(vad) = yaml.vad {
            if let Some(v) = vad.threshold {
                self.vad_threshold = v;
            }
            if let Some(v) = vad.prefix_padding_ms {
                self.vad_prefix_padding_ms = v;
            }
            if let Some(v) = vad.silence_duration_ms {
                self.vad_silence_duration_ms = v;
            }
        }
        if let Some(security) = yaml.security
            && let Some(v) = security.allow_insecure_urls
        {
            self.allow_insecure_urls = v;
        }
    }

    /// Check endpoint schemes and numeric ranges
    pub fn validate(&self) -> Result<(), String> {
        validate_token_endpoint(&self.token_endpoint, self.allow_insecure_urls)
            .map_err(|e| format!("Invalid token endpoint '{}': {e}", self.token_endpoint))?;
        validate_realtime_url(&self.realtime_url, self.allow_insecure_urls)
            .map_err(|e| format!("Invalid realtime URL '{}': {e}", self.realtime_url))?;

        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(format!(
                "VAD threshold must be between 0.0 and 1.0, got {}",
                self.vad_threshold
            ));
        }
        if self.token_timeout_seconds == 0 {
            return Err("Token timeout must be greater than zero".to_string());
        }
        if self.connect_timeout_seconds == 0 {
            return Err("Connect timeout must be greater than zero".to_string());
        }
        if self.event_capacity == 0 {
            return Err("Event capacity must be greater than zero".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("Realtime model must not be empty".to_string());
        }
        Ok(())
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Realtime endpoint with the model query parameter
    pub fn ws_url(&self) -> String {
        let separator = if self.realtime_url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.realtime_url, separator, self.model)
    }

    pub fn realtime_voice(&self) -> OpenAIRealtimeVoice {
        OpenAIRealtimeVoice::from_str_or_default(&self.voice)
    }
}
