use serde::Deserialize;
use std::path::Path;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file take precedence over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// openai:
///   api_key: "sk-..."
///
/// token:
///   endpoint: "https://app.example.com/api/realtime/session"
///   timeout_seconds: 10
///
/// realtime:
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview-2024-12-17"
///   voice: "alloy"
///   transcription_model: "whisper-1"
///   instructions: "You are a helpful advisor."
///   connect_timeout_seconds: 15
///   event_capacity: 256
///
/// vad:
///   threshold: 0.5
///   prefix_padding_ms: 300
///   silence_duration_ms: 500
///
/// security:
///   allow_insecure_urls: false
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct YamlConfig {
    #[serde(default)]
    pub openai: Option<OpenAIYaml>,
    #[serde(default)]
    pub token: Option<TokenYaml>,
    #[serde(default)]
    pub realtime: Option<RealtimeYaml>,
    #[serde(default)]
    pub vad: Option<VadYaml>,
    #[serde(default)]
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TokenYaml {
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RealtimeYaml {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub transcription_model: Option<String>,
    pub instructions: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub event_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VadYaml {
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityYaml {
    pub allow_insecure_urls: Option<bool>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
