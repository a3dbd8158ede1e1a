//! Health-Check-Endpunkt fuer roomcast
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Broadcast-Zustand

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub broadcast_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Wird vom Server periodisch aus der Engine-Statistik nachgefuehrt.
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    broadcast_laeuft: Arc<AtomicBool>,
    letzter_fehler: Arc<RwLock<Option<String>>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            broadcast_laeuft: Arc::new(AtomicBool::new(false)),
            letzter_fehler: Arc::new(RwLock::new(None)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn broadcast_status_setzen(&self, laeuft: bool, letzter_fehler: Option<String>) {
        self.broadcast_laeuft.store(laeuft, Ordering::Relaxed);
        *self.letzter_fehler.write() = letzter_fehler;
    }

    /// Gestoppt mit Fehler ist `degraded`, gestoppt ohne Fehler ist Leerlauf
    pub fn status(&self) -> HealthStatus {
        let laeuft = self.broadcast_laeuft.load(Ordering::Relaxed);
        if !laeuft && self.letzter_fehler.read().is_some() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            broadcast_running: self.broadcast_laeuft.load(Ordering::Relaxed),
            last_error: self.letzter_fehler.read().clone(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        // 200 auch bei degraded (Probe soll nicht failen)
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frischer_zustand_ist_gesund() {
        let state = HealthState::neu();
        assert!(state.uptime_seconds() < 5);
        assert_eq!(state.status(), HealthStatus::Healthy);
        assert!(!state.antwort().broadcast_running);
    }

    #[test]
    fn gestoppt_mit_fehler_ist_degraded() {
        let state = HealthState::neu();
        state.broadcast_status_setzen(false, Some("Encoder-Ausgabe beendet (EOF)".into()));
        assert_eq!(state.status(), HealthStatus::Degraded);

        state.broadcast_status_setzen(true, None);
        assert_eq!(state.status(), HealthStatus::Healthy);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            broadcast_running: true,
            last_error: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"broadcast_running\":true"));
        assert!(!json.contains("last_error"));
    }

    #[test]
    fn health_response_deserialisierung() {
        let json = r#"{"status":"degraded","version":"0.1.0","uptime_seconds":100,"broadcast_running":false,"last_error":"EOF"}"#;
        let response: HealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.last_error.as_deref(), Some("EOF"));
    }
}
