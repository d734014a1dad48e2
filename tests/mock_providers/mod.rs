//! Mock servers for the realtime voice session
//!
//! - WebSocket realtime endpoint (OpenAI Realtime style)
//! - Token endpoint helpers built on `wiremock`

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod realtime_mock;
pub mod token_mock;
