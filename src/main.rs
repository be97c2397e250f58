use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use medguard_engine::config::{self, EngineConfig};
use medguard_engine::core_state::CoreState;
use medguard_engine::gateway::TwilioGateway;
use medguard_engine::{api, db, engine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MEDGUARD_LOG")
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = EngineConfig::from_env()?;

    // Open once at startup so migrations run before anything else touches
    // the database.
    db::open_database(&config.db_path)?;

    let gateway = Arc::new(TwilioGateway::new(&config.twilio));
    let core = Arc::new(CoreState::new(config, gateway));

    tokio::spawn(engine::poller::run(core.clone()));
    api::server::serve(core).await?;

    Ok(())
}
