//! roomcast-server – Bibliotheks-Root
//!
//! Setzt Engine, HTTP-Oberflaeche und Observability zusammen und stellt
//! den Einstiegspunkt fuer Tests bereit.

pub mod config;
pub mod rest;

use std::time::Duration;

use anyhow::{Context, Result};
use axum::{middleware, Router};
use config::ServerConfig;
use roomcast_broadcast::{BroadcastEngine, StatsSnapshot};
use roomcast_core::BroadcastEvent;
use roomcast_observability::{
    observability_router, request_timing_layer, timing_middleware, BroadcastKennzahlen,
    BroadcastMetrics, HealthState,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use rest::{routes::broadcast_router, AppState};

/// Uebertraegt die Engine-Statistik in die Metrik-Kennzahlen
pub fn kennzahlen_aus(stats: &StatsSnapshot) -> BroadcastKennzahlen {
    BroadcastKennzahlen {
        laeuft: stats.running,
        consumer: stats.registry_size,
        consumer_spitze: stats.peak_concurrent,
        bytes_gelesen: stats.total_bytes,
        chunks_gelesen: stats.chunks_read,
        chunks_verteilt: stats.chunks_broadcast,
        zustellfehler: stats.broadcast_failures,
        intake_verworfen: stats.intake_dropped,
        entfernt: stats.evictions,
        keepalives: stats.keepalives,
    }
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    engine: BroadcastEngine,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        let engine = BroadcastEngine::neu(config.broadcast_config());
        Self { config, engine }
    }

    pub fn engine(&self) -> &BroadcastEngine {
        &self.engine
    }

    /// Baut den vollstaendigen Router
    ///
    /// Ohne Observability fehlen `/metrics`, `/health` und die Timing-Middleware.
    pub fn router(&self, observability: Option<(BroadcastMetrics, HealthState)>) -> Router {
        let state = AppState::neu(
            self.engine.clone(),
            self.config.broadcast.standard_geraet.clone(),
            self.config.broadcast.standard_format,
        );
        let app = broadcast_router().with_state(state);

        match observability {
            Some((metriken, health)) => app
                .merge(observability_router(metriken.clone(), health))
                .layer(middleware::from_fn_with_state(metriken, timing_middleware))
                .layer(request_timing_layer()),
            None => app.layer(request_timing_layer()),
        }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Engine-Tasks (Dispatcher, Heartbeat) starten
    /// 2. Ereignis-Log und Metrik-Aktualisierung starten
    /// 3. HTTP-Listener binden
    /// 4. Auf Ctrl-C warten, Engine herunterfahren, offene Streams enden lassen
    pub async fn starten(self) -> Result<()> {
        let adresse = self.config.http_bind_adresse();
        tracing::info!(
            server_name = %self.config.server.name,
            http = %adresse,
            worker = self.engine.config().worker,
            "Server startet"
        );

        self.engine.starten();
        let token = CancellationToken::new();

        tokio::spawn(ereignisse_loggen(self.engine.clone(), token.child_token()));

        let observability = if self.config.observability.aktiviert {
            let metriken = BroadcastMetrics::neu().context("Metriken nicht registrierbar")?;
            let health = HealthState::neu();
            tokio::spawn(kennzahlen_aktualisieren(
                self.engine.clone(),
                metriken.clone(),
                health.clone(),
                self.config.aktualisierungs_intervall(),
                token.child_token(),
            ));
            Some((metriken, health))
        } else {
            None
        };

        let app = self.router(observability);
        let listener = tokio::net::TcpListener::bind(&adresse)
            .await
            .with_context(|| format!("HTTP-Listener auf {adresse} nicht verfuegbar"))?;
        tracing::info!(adresse = %adresse, "HTTP-Server bereit");

        let engine = self.engine.clone();
        let shutdown_token = token.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(fehler = %e, "Signal-Handler nicht verfuegbar");
                }
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                shutdown_token.cancel();
                // Entfernt alle Consumer; offene Stream-Bodies enden damit
                engine.shutdown().await;
            })
            .await
            .context("HTTP-Server beendet mit Fehler")?;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Schreibt Engine-Ereignisse ins Log
async fn ereignisse_loggen(engine: BroadcastEngine, token: CancellationToken) {
    let mut empfaenger = engine.events();
    loop {
        let ereignis = tokio::select! {
            _ = token.cancelled() => break,
            e = empfaenger.recv() => e,
        };
        match ereignis {
            Ok(BroadcastEvent::BroadcastGestoppt {
                grund: Some(grund), ..
            }) => {
                tracing::error!(grund = %grund, "Broadcast durch Fehler beendet");
            }
            Ok(ereignis) => {
                tracing::debug!(ereignis = ereignis.name(), details = ?ereignis, "Engine-Ereignis");
            }
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(verpasst = n, "Ereignis-Log kommt nicht hinterher");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Fuehrt Prometheus-Metriken und Health-Zustand periodisch nach
async fn kennzahlen_aktualisieren(
    engine: BroadcastEngine,
    metriken: BroadcastMetrics,
    health: HealthState,
    intervall: Duration,
    token: CancellationToken,
) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = takt.tick() => {}
        }
        let stats = engine.stats();
        metriken.aktualisieren(&kennzahlen_aus(&stats));
        health.broadcast_status_setzen(stats.running, stats.last_error.clone());
    }
}
