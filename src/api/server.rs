//! Webhook server lifecycle — binds the configured address, mounts
//! `engine_router()`, and serves until shutdown.

use std::sync::Arc;

use tracing::info;

use crate::api::router::engine_router;
use crate::core_state::CoreState;

/// Serve the engine API. Runs until ctrl-c.
pub async fn serve(core: Arc<CoreState>) -> Result<(), std::io::Error> {
    let app = engine_router(core.clone());
    let listener = tokio::net::TcpListener::bind(core.config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
