//! Shared types for the API layer.

use std::sync::Arc;

use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::core_state::CoreState;
use crate::gateway::twiml::VoiceResponse;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// A rendered TwiML document. The gateway callbacks always answer 200 with
/// `text/xml`, even on internal failure; the error is spoken, not coded.
pub struct Twiml(pub VoiceResponse);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "text/xml")],
            self.0.render(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::twiml::Say;

    #[tokio::test]
    async fn twiml_response_is_xml() {
        let response =
            Twiml(VoiceResponse::new().say(Say::new("en-IN", "Hello"))).into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("<Response>"));
    }
}
