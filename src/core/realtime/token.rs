//! Short-lived credential exchange.
//!
//! The long-lived credential never reaches the realtime endpoint. It is posted
//! to a backend route as `{"apiKey": ...}` and the backend answers with an
//! ephemeral `client_secret.value` used to authorize the WebSocket.

use serde::Deserialize;
use zeroize::Zeroize;

use super::base::{VoiceResult, VoiceSessionError};

/// Ephemeral credential returned by the token endpoint.
#[derive(Clone)]
pub struct EphemeralToken {
    pub value: String,
    /// Expiry as a unix timestamp, when the backend reports one
    pub expires_at: Option<u64>,
}

impl std::fmt::Debug for EphemeralToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Drop for EphemeralToken {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    expires_at: Option<u64>,
}

/// Error bodies come either as `{"error": "..."}` or `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: TokenErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenErrorBody {
    Message(String),
    Detailed { message: String },
}

impl TokenErrorBody {
    fn into_message(self) -> String {
        match self {
            TokenErrorBody::Message(m) => m,
            TokenErrorBody::Detailed { message } => message,
        }
    }
}

/// HTTP client for the token-issuing backend.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TokenClient {
    pub fn new(endpoint: impl Into<String>) -> VoiceResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| VoiceSessionError::InvalidConfiguration(e.to_string()))?;
        Ok(Self::with_client(http, endpoint))
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Exchange the long-lived credential for an ephemeral one.
    ///
    /// # Errors
    /// `TokenExchange` when the request fails, the endpoint answers non-2xx or
    /// the body lacks `client_secret.value`.
    pub async fn exchange(&self, credential: &str) -> VoiceResult<EphemeralToken> {
        tracing::debug!("Requesting ephemeral token from {}", self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "apiKey": credential }))
            .send()
            .await
            .map_err(|e| VoiceSessionError::TokenExchange(format!("Request failed: {e}")))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            VoiceSessionError::TokenExchange(format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            let error_msg = match serde_json::from_str::<TokenErrorResponse>(&response_text) {
                Ok(error_response) => error_response.error.into_message(),
                Err(_) => format!("Token endpoint returned {status}"),
            };
            tracing::warn!("Token exchange rejected ({}): {}", status, error_msg);
            return Err(VoiceSessionError::TokenExchange(error_msg));
        }

        let parsed: TokenResponse = serde_json::from_str(&response_text).map_err(|e| {
            VoiceSessionError::TokenExchange(format!("Invalid token response: {e}"))
        })?;

        let secret = parsed.client_secret.ok_or_else(|| {
            VoiceSessionError::TokenExchange("Response is missing client_secret".to_string())
        })?;

        match secret.value {
            Some(value) if !value.is_empty() => Ok(EphemeralToken {
                value,
                expires_at: secret.expires_at,
            }),
            _ => Err(VoiceSessionError::TokenExchange(
                "Response is missing client_secret.value".to_string(),
            )),
        }
    }
}
