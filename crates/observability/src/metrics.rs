//! Prometheus-kompatible Metriken fuer roomcast
//!
//! Registrierte Metriken:
//! - `roomcast_consumers_active` – Gauge: Registrierte Consumer
//! - `roomcast_consumers_peak` – Gauge: Hoechste gleichzeitige Anzahl Consumer
//! - `roomcast_broadcast_running` – Gauge: 1 waehrend ein Broadcast laeuft
//! - `roomcast_bytes_read_total` – Counter: Vom Encoder gelesene Bytes
//! - `roomcast_chunks_read_total` – Counter: Vom Encoder gelesene Chunks
//! - `roomcast_chunks_broadcast_total` – Counter: Verteilte Chunks
//! - `roomcast_broadcast_failures_total` – Counter: Fehlgeschlagene Zustellungen
//! - `roomcast_intake_dropped_total` – Counter: Im Intake verworfene Chunks
//! - `roomcast_evictions_total` – Counter: Entfernte Consumer
//! - `roomcast_keepalives_total` – Counter: Gesendete Keepalives
//! - `roomcast_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `roomcast_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit
//!
//! Die Engine zaehlt selbst; die Counter hier werden periodisch per
//! [`BroadcastMetrics::aktualisieren`] auf deren Stand nachgezogen.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Momentaufnahme der Engine-Zaehler (entkoppelt vom Engine-Crate)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastKennzahlen {
    pub laeuft: bool,
    pub consumer: usize,
    pub consumer_spitze: usize,
    pub bytes_gelesen: u64,
    pub chunks_gelesen: u64,
    pub chunks_verteilt: u64,
    pub zustellfehler: u64,
    pub intake_verworfen: u64,
    pub entfernt: u64,
    pub keepalives: u64,
}

/// Alle roomcast-Prometheus-Metriken
#[derive(Clone)]
pub struct BroadcastMetrics {
    pub registry: Arc<Registry>,

    // Broadcast-Metriken
    pub consumers_active: IntGauge,
    pub consumers_peak: IntGauge,
    pub broadcast_running: IntGauge,
    pub bytes_read_total: IntCounter,
    pub chunks_read_total: IntCounter,
    pub chunks_broadcast_total: IntCounter,
    pub broadcast_failures_total: IntCounter,
    pub intake_dropped_total: IntCounter,
    pub evictions_total: IntCounter,
    pub keepalives_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let g = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn counter(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

/// Zieht einen Counter auf einen absoluten Stand nach (nie rueckwaerts)
fn nachziehen(counter: &IntCounter, stand: u64) {
    let aktuell = counter.get();
    if stand > aktuell {
        counter.inc_by(stand - aktuell);
    }
}

impl BroadcastMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Broadcast-Metriken ---
        let consumers_active = gauge(
            &registry,
            "roomcast_consumers_active",
            "Anzahl registrierter Consumer",
        )?;
        let consumers_peak = gauge(
            &registry,
            "roomcast_consumers_peak",
            "Hoechste gleichzeitige Anzahl Consumer",
        )?;
        let broadcast_running = gauge(
            &registry,
            "roomcast_broadcast_running",
            "1 waehrend ein Broadcast laeuft, sonst 0",
        )?;
        let bytes_read_total = counter(
            &registry,
            "roomcast_bytes_read_total",
            "Vom Encoder gelesene Bytes",
        )?;
        let chunks_read_total = counter(
            &registry,
            "roomcast_chunks_read_total",
            "Vom Encoder gelesene Chunks",
        )?;
        let chunks_broadcast_total = counter(
            &registry,
            "roomcast_chunks_broadcast_total",
            "An die Consumer verteilte Chunks",
        )?;
        let broadcast_failures_total = counter(
            &registry,
            "roomcast_broadcast_failures_total",
            "Fehlgeschlagene Zustellungen (Consumer x Chunk)",
        )?;
        let intake_dropped_total = counter(
            &registry,
            "roomcast_intake_dropped_total",
            "Im Intake verdraengte Chunks",
        )?;
        let evictions_total = counter(
            &registry,
            "roomcast_evictions_total",
            "Wegen Inaktivitaet entfernte Consumer",
        )?;
        let keepalives_total = counter(
            &registry,
            "roomcast_keepalives_total",
            "Eingereihte Keepalive-Eintraege",
        )?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("roomcast_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "roomcast_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            consumers_active,
            consumers_peak,
            broadcast_running,
            bytes_read_total,
            chunks_read_total,
            chunks_broadcast_total,
            broadcast_failures_total,
            intake_dropped_total,
            evictions_total,
            keepalives_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Uebernimmt den aktuellen Stand der Engine
    pub fn aktualisieren(&self, k: &BroadcastKennzahlen) {
        self.broadcast_running.set(i64::from(k.laeuft));
        self.consumers_active.set(k.consumer as i64);
        self.consumers_peak.set(k.consumer_spitze as i64);

        nachziehen(&self.bytes_read_total, k.bytes_gelesen);
        nachziehen(&self.chunks_read_total, k.chunks_gelesen);
        nachziehen(&self.chunks_broadcast_total, k.chunks_verteilt);
        nachziehen(&self.broadcast_failures_total, k.zustellfehler);
        nachziehen(&self.intake_dropped_total, k.intake_verworfen);
        nachziehen(&self.evictions_total, k.entfernt);
        nachziehen(&self.keepalives_total, k.keepalives);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: BroadcastMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<BroadcastMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(fehler = %err, "Metriken-Export fehlgeschlagen");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
