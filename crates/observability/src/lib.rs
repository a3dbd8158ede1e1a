//! # roomcast-observability
//!
//! Observability-Crate fuer roomcast:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::{logging_initialisieren, LogFormat};
pub use metrics::{metrics_router, BroadcastKennzahlen, BroadcastMetrics};
pub use middleware::{request_timing_layer, timing_middleware};

use axum::Router;

/// Router mit `/metrics` und `/health`
///
/// Wird vom Server in die Haupt-Anwendung eingehaengt.
pub fn observability_router(metriken: BroadcastMetrics, health: HealthState) -> Router {
    Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health))
}
