//! Engine configuration, read once from the environment at startup.
//!
//! Every timing knob the escalation engine uses lives here so deployments
//! can tune them without rebuilding: the poller cadence, the wait interval
//! between escalation levels, and the grace window for the first call.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Application-level constants
pub const APP_NAME: &str = "MedGuard Engine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when MEDGUARD_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "medguard_engine=info"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
    #[error("missing required variable {0}")]
    Missing(&'static str),
}

/// Credentials and sender identity for the Twilio-backed gateway.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address the webhook server binds to.
    pub bind_addr: SocketAddr,
    /// Externally reachable base URL, embedded in gather callback URLs.
    pub public_url: String,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Poller cadence. Must match the minute resolution of target times.
    pub tick_interval: Duration,
    /// Wait between escalation levels (L1→L2 and L2→L3).
    pub wait_interval: Duration,
    /// How long past its target time a first call may still fire.
    /// One minute reproduces the reference exact-minute match; widen it to
    /// tolerate missed ticks.
    pub first_call_grace: Duration,
    /// Prefix applied to phone numbers stored without one.
    pub country_prefix: String,
    pub twilio: TwilioConfig,
}

impl EngineConfig {
    /// Read configuration from the environment. Twilio credentials are
    /// required; everything else has a sensible default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: parse_var("MEDGUARD_BIND", "0.0.0.0:5000")?,
            public_url: trim_trailing_slash(
                std::env::var("MEDGUARD_PUBLIC_URL")
                    .unwrap_or_else(|_| "http://localhost:5000".into()),
            ),
            db_path: std::env::var("MEDGUARD_DB")
                .unwrap_or_else(|_| "medguard.db".into())
                .into(),
            tick_interval: secs_var("MEDGUARD_TICK_SECS", 60)?,
            wait_interval: secs_var("MEDGUARD_WAIT_SECS", 600)?,
            first_call_grace: secs_var("MEDGUARD_GRACE_SECS", 60)?,
            country_prefix: std::env::var("MEDGUARD_COUNTRY_PREFIX")
                .unwrap_or_else(|_| "+91".into()),
            twilio: TwilioConfig {
                account_sid: required("TWILIO_ACCOUNT_SID")?,
                auth_token: required("TWILIO_AUTH_TOKEN")?,
                from_number: required("TWILIO_PHONE_NUMBER")?,
            },
        })
    }

    /// Callback URL for the dose-confirmation gather.
    pub fn confirm_webhook_url(&self, dose_id: &Uuid) -> String {
        format!("{}/api/alerts/webhook/{dose_id}", self.public_url)
    }

    /// Callback URL for the language-selection gather.
    pub fn language_webhook_url(&self, dose_id: &Uuid) -> String {
        format!("{}/api/alerts/language/{dose_id}", self.public_url)
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.into());
    raw.parse()
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}

fn secs_var(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_var(var, &default.to_string())?;
    Ok(Duration::from_secs(secs))
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
impl EngineConfig {
    /// Fixture configuration pointing at the given database file, with the
    /// short intervals the reference deployment demonstrates with.
    pub fn for_tests(db_path: PathBuf) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            public_url: "http://localhost:5000".into(),
            db_path,
            tick_interval: Duration::from_secs(60),
            wait_interval: Duration::from_secs(60),
            first_call_grace: Duration::from_secs(60),
            country_prefix: "+91".into(),
            twilio: TwilioConfig {
                account_sid: "ACtest".into(),
                auth_token: "secret".into(),
                from_number: "+15550100".into(),
            },
        }
    }
}
