//! Request-Timing Middleware fuer Axum
//!
//! Misst die Antwortzeit jeder HTTP-Anfrage, protokolliert sie als
//! strukturiertes Log-Event und traegt sie in die Prometheus-Metriken ein.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::Next,
};
use std::time::Instant;

use crate::metrics::BroadcastMetrics;

/// tower-http TraceLayer fuer Request-Spans
pub fn request_timing_layer() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
> {
    tower_http::trace::TraceLayer::new_for_http()
}

/// Axum-Middleware-Funktion: misst Antwortzeit, loggt und zaehlt.
///
/// Verwendung:
/// ```ignore
/// Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn_with_state(metriken, timing_middleware))
/// ```
///
/// Bei `/stream` misst die Dauer nur bis zum Beginn des Bodys.
pub async fn timing_middleware(
    State(metriken): State<BroadcastMetrics>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let methode = req.method().to_string();
    let pfad = pfad_label(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    let dauer = start.elapsed();
    let status = response.status().as_u16();
    let status_text = status.to_string();

    metriken
        .http_requests_total
        .with_label_values(&[methode.as_str(), pfad, status_text.as_str()])
        .inc();
    metriken
        .http_request_duration_seconds
        .with_label_values(&[methode.as_str(), pfad])
        .observe(dauer.as_secs_f64());

    tracing::info!(
        method = %methode,
        path = pfad,
        status,
        dauer = dauer_bucket(dauer.as_millis() as u64),
        duration_ms = dauer.as_millis() as u64,
        "HTTP-Anfrage abgeschlossen"
    );

    response
}

/// Begrenzt die Label-Kardinalitaet auf die bekannten Routen
pub fn pfad_label(pfad: &str) -> &'static str {
    match pfad {
        "/stream" => "/stream",
        "/broadcast/start" => "/broadcast/start",
        "/broadcast/stop" => "/broadcast/stop",
        "/broadcast/stats" => "/broadcast/stats",
        "/broadcast/devices" => "/broadcast/devices",
        "/metrics" => "/metrics",
        "/health" => "/health",
        _ => "andere",
    }
}

/// Grober Dauer-Bucket fuer Log-Auswertungen
pub fn dauer_bucket(dauer_ms: u64) -> &'static str {
    match dauer_ms {
        0..=1 => "<=1ms",
        2..=5 => "<=5ms",
        6..=10 => "<=10ms",
        11..=25 => "<=25ms",
        26..=50 => "<=50ms",
        51..=100 => "<=100ms",
        101..=250 => "<=250ms",
        251..=500 => "<=500ms",
        501..=1000 => "<=1s",
        _ => ">1s",
    }
}
