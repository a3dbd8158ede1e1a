//! HTTP-Oberflaeche des Broadcast-Servers
//!
//! - `GET /stream` liefert den Live-Stream an einen neuen Consumer
//! - `/broadcast/*` steuert und beobachtet die Engine

pub mod handlers;
pub mod routes;
pub mod stream;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use roomcast_broadcast::{AudioFormat, BroadcastEngine};
use roomcast_core::RoomcastError;
use serde_json::json;

/// Geteilter Zustand aller Handler
#[derive(Clone)]
pub struct AppState {
    pub engine: BroadcastEngine,
    /// Geraet fuer Start-Anfragen ohne `device`
    pub standard_geraet: String,
    /// Format fuer Start-Anfragen ohne `format`
    pub standard_format: AudioFormat,
}

impl AppState {
    pub fn neu(
        engine: BroadcastEngine,
        standard_geraet: impl Into<String>,
        standard_format: AudioFormat,
    ) -> Self {
        Self {
            engine,
            standard_geraet: standard_geraet.into(),
            standard_format,
        }
    }
}

/// Einheitliche JSON-Fehlerantwort
pub(crate) fn fehler_antwort(status: StatusCode, nachricht: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": nachricht.into(),
            }
        })),
    )
        .into_response()
}

/// HTTP-Status fuer einen Fehler an der Server-Grenze
pub(crate) fn status_fuer(fehler: &RoomcastError) -> StatusCode {
    match fehler {
        RoomcastError::Formatkonflikt { .. } => StatusCode::CONFLICT,
        RoomcastError::UnbekanntesFormat(_) | RoomcastError::Konfiguration(_) => {
            StatusCode::BAD_REQUEST
        }
        RoomcastError::ConsumerNichtGefunden(_) => StatusCode::NOT_FOUND,
        RoomcastError::Zeitlimit(_) => StatusCode::GATEWAY_TIMEOUT,
        RoomcastError::EncoderStart(_)
        | RoomcastError::EncoderBeendet(_)
        | RoomcastError::GeraetNichtVerfuegbar(_) => StatusCode::BAD_GATEWAY,
        RoomcastError::Intern(_) | RoomcastError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Fehlerantwort aus einem Engine- oder Core-Fehler
pub(crate) fn fehler_aus(fehler: impl Into<RoomcastError>) -> Response {
    let fehler = fehler.into();
    fehler_antwort(status_fuer(&fehler), fehler.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_broadcast::BroadcastError;

    #[test]
    fn status_je_fehlerart() {
        let konflikt = RoomcastError::Formatkonflikt {
            aktiv: "mp3".into(),
            angefordert: "opus".into(),
        };
        assert_eq!(status_fuer(&konflikt), StatusCode::CONFLICT);
        assert_eq!(
            status_fuer(&RoomcastError::Zeitlimit("Geraete".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_fuer(&RoomcastError::intern("kaputt")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn engine_fehler_werden_abgebildet() {
        let antwort = fehler_aus(BroadcastError::UnbekanntesFormat("midi".into()));
        assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);

        let antwort = fehler_aus(BroadcastError::Geraeteliste("exit status: 1".into()));
        assert_eq!(antwort.status(), StatusCode::BAD_GATEWAY);
    }
}
