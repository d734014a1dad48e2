//! Token endpoint mock
//!
//! Issues ephemeral credentials the way the advisor backend does:
//! `POST {"apiKey": ...}` answered with `{"client_secret": {"value": ...}}`.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/api/realtime/session";

/// Token endpoint answering with `value`.
pub async fn issuing(value: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_secret": { "value": value, "expires_at": 1735689600u64 }
        })))
        .mount(&server)
        .await;
    server
}

/// Token endpoint answering with `value` after `delay`.
pub async fn slow(value: &str, delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "client_secret": { "value": value } }))
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

/// Token endpoint rejecting every request with `status`.
pub async fn rejecting(status: u16, message: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "error": message })))
        .mount(&server)
        .await;
    server
}

pub fn endpoint(server: &MockServer) -> String {
    format!("{}{}", server.uri(), TOKEN_PATH)
}
