//! obd-api - Snapshot API for the OBD telemetry gateway
//!
//! Serves the latest telemetry snapshot over REST and streams every published
//! snapshot to WebSocket subscribers registered with the engine's
//! [`Broadcaster`](obd_core::Broadcaster).
//!
//! # Usage
//!
//! ```ignore
//! use obd_api::{create_router, AppState};
//!
//! let handle = engine.spawn(cancel.clone());
//! let state = AppState::new(handle.broadcaster(), cancel);
//! let router = create_router(state);
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the gateway router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Live snapshot stream
        .route("/ws", get(handlers::ws::subscribe))
        // Most recent snapshot
        .route(
            "/vehicle/v1/telemetry",
            get(handlers::telemetry::latest_snapshot),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
