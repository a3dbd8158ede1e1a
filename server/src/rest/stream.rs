//! `GET /stream` – Live-Stream an einen HTTP-Client
//!
//! Jede Anfrage registriert einen eigenen Consumer. Der Body ist ein
//! unendlicher Chunked-Stream aus dessen Queue, gebuendelt zu Bloecken
//! bis zur `read_chunk_size` des Profils; wird der Body verworfen
//! (Client weg, Server faehrt herunter), meldet der Guard den Consumer ab.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use roomcast_broadcast::BroadcastEngine;
use roomcast_core::ConsumerId;
use serde::Deserialize;

use crate::rest::{fehler_antwort, AppState};

/// Antwort-Header mit der ID des registrierten Consumers
pub const CONSUMER_HEADER: &str = "x-roomcast-consumer";

#[derive(Debug, Default, Deserialize)]
pub struct StreamParameter {
    pub profile: Option<String>,
}

/// Meldet den Consumer ab, sobald der Body-Stream verworfen wird
struct AbmeldeGuard {
    engine: BroadcastEngine,
    id: ConsumerId,
}

impl Drop for AbmeldeGuard {
    fn drop(&mut self) {
        if self.engine.unregister_consumer(&self.id) {
            tracing::info!(consumer = %self.id, "Stream-Client getrennt");
        }
    }
}

/// Profil-Label: Query-Parameter, sonst User-Agent, sonst leer
pub fn profil_label(parameter: &StreamParameter, headers: &HeaderMap) -> String {
    parameter
        .profile
        .clone()
        .filter(|p| !p.trim().is_empty())
        .or_else(|| {
            headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

pub async fn get_stream(
    State(state): State<AppState>,
    Query(parameter): Query<StreamParameter>,
    headers: HeaderMap,
) -> Response {
    let label = profil_label(&parameter, &headers);
    let (id, _queue) = state.engine.register_consumer(&label);

    let (Some(session), Some(drain)) = (
        state.engine.registry().get(&id),
        state.engine.drain_consumer(&id),
    ) else {
        // Zwischen Registrierung und Entnahme bereits entfernt
        return fehler_antwort(StatusCode::SERVICE_UNAVAILABLE, "Consumer nicht verfuegbar");
    };
    let profil = session.profile();

    let format = state
        .engine
        .aktives_format()
        .unwrap_or(state.standard_format);

    tracing::info!(
        consumer = %id,
        label = %label,
        profil = profil.name,
        block_groesse = profil.read_chunk_size,
        format = %format,
        "Stream-Client verbunden"
    );

    let guard = AbmeldeGuard {
        engine: state.engine.clone(),
        id,
    };
    let body = drain.into_byte_stream(profil.read_chunk_size).map(move |block| {
        let _guard = &guard;
        Ok::<_, Infallible>(block)
    });

    let mut response = Body::from_stream(body).into_response();
    let kopf = response.headers_mut();
    kopf.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    kopf.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store"),
    );
    if let Ok(wert) = HeaderValue::from_str(&id.to_string()) {
        kopf.insert(CONSUMER_HEADER, wert);
    }
    response
}
