//! Environment variable loading

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use super::VoiceConfig;

/// Read a variable, treating empty values as unset.
pub(super) fn get_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse a variable.
pub(super) fn parse_var<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match get_var(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: '{value}' ({e})")),
        None => Ok(None),
    }
}

/// Parse a boolean flag ("true"/"1"/"yes" and "false"/"0"/"no").
pub(super) fn parse_bool(name: &str) -> Result<Option<bool>, String> {
    match get_var(name) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid value for {name}: '{value}' (expected a boolean)")),
        },
        None => Ok(None),
    }
}

/// Overlay environment variables onto `config`.
pub(super) fn apply_env(config: &mut VoiceConfig) -> Result<(), String> {
    if let Some(key) = get_var("OPENAI_API_KEY") {
        config.openai_api_key = Some(key);
    }
    if let Some(v) = get_var("VOICE_TOKEN_ENDPOINT") {
        config.token_endpoint = v;
    }
    if let Some(v) = get_var("VOICE_REALTIME_URL") {
        config.realtime_url = v;
    }
    if let Some(v) = get_var("VOICE_REALTIME_MODEL") {
        config.model = v;
    }
    if let Some(v) = get_var("VOICE_NAME") {
        config.voice = v;
    }
    if let Some(v) = get_var("VOICE_TRANSCRIPTION_MODEL") {
        config.transcription_model = v;
    }
    if let Some(v) = get_var("VOICE_INSTRUCTIONS") {
        config.instructions = v;
    }
    if let Some(v) = parse_var("VOICE_VAD_THRESHOLD")? {
        config.vad_threshold = v;
    }
    if let Some(v) = parse_var("VOICE_VAD_PREFIX_PADDING_MS")? {
        config.vad_prefix_padding_ms = v;
    }
    if let Some(v) = parse_var("VOICE_VAD_SILENCE_DURATION_MS")? {
        config.vad_silence_duration_ms = v;
    }
    if let Some(v) = parse_var("VOICE_TOKEN_TIMEOUT_SECONDS")? {
        config.token_timeout_seconds = v;
    }
    if let Some(v) = parse_var("VOICE_CONNECT_TIMEOUT_SECONDS")? {
        config.connect_timeout_seconds = v;
    }
    if let Some(v) = parse_var("VOICE_EVENT_CAPACITY")? {
        config.event_capacity = v;
    }
    if let Some(v) = parse_bool("VOICE_ALLOW_INSECURE_URLS")? {
        config.allow_insecure_urls = v;
    }
    Ok(())
}
