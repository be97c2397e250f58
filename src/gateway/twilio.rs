//! Twilio-backed Confirmation Gateway.
//!
//! Calls and texts go out as form-encoded POSTs against the Twilio REST
//! API with HTTP basic auth. The engine treats both as fire-and-forget:
//! non-2xx answers surface as `GatewayError::Provider` and the caller
//! decides whether the escalation clock still advances.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::TwilioConfig;

use super::{CallRequest, ConfirmationGateway, GatewayError};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioGateway {
    http: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioGateway {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            http: Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
        }
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{API_BASE}/Accounts/{}/{resource}.json", self.account_sid)
    }

    async fn post_form(
        &self,
        resource: &str,
        form: &[(&str, &str)],
    ) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(self.resource_url(resource))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConfirmationGateway for TwilioGateway {
    async fn place_call(&self, call: CallRequest) -> Result<(), GatewayError> {
        let twiml = call.voice.render();
        self.post_form(
            "Calls",
            &[
                ("Twiml", twiml.as_str()),
                ("To", call.to.as_str()),
                ("From", self.from_number.as_str()),
            ],
        )
        .await
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<(), GatewayError> {
        self.post_form(
            "Messages",
            &[("Body", body), ("To", to), ("From", self.from_number.as_str())],
        )
        .await
    }
}
