//! Inbound HTTP surface.
//!
//! Two kinds of endpoints: the gateway-facing callbacks (dose confirmation
//! and language capture, answering TwiML), and the collaborator-facing
//! schedule/patient surface (JSON). The router is composable;
//! `engine_router()` returns a `Router` that can be mounted on any axum
//! server.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::engine_router;
pub use types::ApiContext;
