//! Engine API router.
//!
//! Gateway callbacks and the collaborator-facing schedule/patient surface,
//! all nested under `/api/`.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the engine router.
pub fn engine_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    let routes = Router::new()
        // Gateway callbacks (TwiML in, TwiML out).
        .route("/alerts/webhook/:dose_id", post(endpoints::alerts::confirm))
        .route("/alerts/language/:dose_id", post(endpoints::alerts::language))
        // Schedule surface.
        .route("/schedules/sync", post(endpoints::schedules::sync_fulfillment))
        .route("/schedules", post(endpoints::schedules::create))
        .route("/schedules/:id/take", post(endpoints::schedules::take))
        .route("/schedules/:id/time", post(endpoints::schedules::update_time))
        // Patient preferences.
        .route("/patients", put(endpoints::patients::upsert))
        .route("/patients/:phone", get(endpoints::patients::get_one))
        .route(
            "/patients/:phone/schedules",
            get(endpoints::schedules::list_for_patient),
        )
        .with_state(ctx);

    Router::new().nest("/api", routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::EngineConfig;
    use crate::gateway::mock::RecordingGateway;

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::for_tests(dir.path().join("engine.db"));
        let state = Arc::new(CoreState::new(config, Arc::new(RecordingGateway::new())));
        let app = engine_router(state);

        let response = app
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
