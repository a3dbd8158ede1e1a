//! Handler fuer die Broadcast-Steuerung

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use roomcast_broadcast::AudioFormat;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::rest::{fehler_aus, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartAnfrage {
    pub device: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartAntwort {
    pub started: bool,
    pub device: String,
    pub format: AudioFormat,
}

/// `POST /broadcast/start`
///
/// Ein abgelehnter Start ist keine HTTP-Fehlersituation: die Antwort ist
/// immer 200 mit `started: false`. Nur ein unbekanntes Format ergibt 400.
pub async fn post_start(
    State(state): State<AppState>,
    Json(anfrage): Json<StartAnfrage>,
) -> Response {
    let format = match anfrage.format.as_deref() {
        Some(text) => match text.parse::<AudioFormat>() {
            Ok(f) => f,
            Err(e) => return fehler_aus(e),
        },
        None => state.standard_format,
    };
    let geraet = anfrage
        .device
        .unwrap_or_else(|| state.standard_geraet.clone());

    let started = state.engine.start_broadcast(&geraet, format).await;
    if !started {
        tracing::warn!(geraet = %geraet, format = %format, "Broadcast-Start abgelehnt");
    }

    (
        StatusCode::OK,
        Json(StartAntwort {
            started,
            device: geraet,
            format,
        }),
    )
        .into_response()
}

/// `POST /broadcast/stop`
pub async fn post_stop(State(state): State<AppState>) -> Response {
    state.engine.stop_broadcast().await;
    (
        StatusCode::OK,
        Json(json!({ "running": state.engine.laeuft() })),
    )
        .into_response()
}

/// `GET /broadcast/stats`
pub async fn get_stats(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.engine.stats())).into_response()
}

/// `GET /broadcast/devices`
pub async fn get_devices(State(state): State<AppState>) -> Response {
    match state.engine.list_devices().await {
        Ok(devices) => (StatusCode::OK, Json(json!({ "devices": devices }))).into_response(),
        Err(e) => {
            tracing::warn!(fehler = %e, "Geraeteliste nicht verfuegbar");
            fehler_aus(e)
        }
    }
}
