//! Route-Definitionen

use axum::{
    routing::{get, post},
    Router,
};

use crate::rest::{handlers, stream, AppState};

/// Stream- und Steuerungs-Routen
pub fn broadcast_router() -> Router<AppState> {
    Router::new()
        .route("/stream", get(stream::get_stream))
        .route("/broadcast/start", post(handlers::post_start))
        .route("/broadcast/stop", post(handlers::post_stop))
        .route("/broadcast/stats", get(handlers::get_stats))
        .route("/broadcast/devices", get(handlers::get_devices))
}
