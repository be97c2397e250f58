//! Confirmation Gateway — the external voice/SMS delivery service.
//!
//! The engine only consumes the contract: place a call that speaks a script
//! and gathers one keypress, or send a text. Keypress responses come back
//! later through the webhook endpoints; from here a call is fire-and-forget.

pub mod scripts;
pub mod twilio;
pub mod twiml;

pub use twilio::TwilioGateway;

use async_trait::async_trait;

use twiml::VoiceResponse;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected request: HTTP {status}: {body}")]
    Provider { status: u16, body: String },
}

/// One outbound call: who to ring and what to play.
/// Gather digits, timeouts, and the callback URL are all carried inside
/// the voice response.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub to: String,
    pub voice: VoiceResponse,
}

#[async_trait]
pub trait ConfirmationGateway: Send + Sync {
    async fn place_call(&self, call: CallRequest) -> Result<(), GatewayError>;
    async fn send_text(&self, to: &str, body: &str) -> Result<(), GatewayError>;
}

/// Numbers stored without an international prefix get the configured one.
pub fn normalize_phone(raw: &str, country_prefix: &str) -> String {
    if raw.starts_with('+') {
        raw.to_string()
    } else {
        format!("{country_prefix}{raw}")
    }
}
