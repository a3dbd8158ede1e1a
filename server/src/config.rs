//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use roomcast_broadcast::{AudioFormat, BroadcastConfig, CaptureConfig, EncoderConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Broadcast-Engine (Queues, Worker, Zeitlimits)
    pub broadcast: BroadcastEinstellungen,
    /// Encoder- und Geraete-Programm
    pub encoder: EncoderConfig,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    pub bind_adresse: String,
    /// Port fuer HTTP (Stream, Steuerung, Metriken)
    pub port: u16,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "roomcast".into(),
            bind_adresse: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

/// Broadcast-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastEinstellungen {
    /// Kapazitaet der Intake-Queue in Chunks
    pub intake_kapazitaet: usize,
    /// Anzahl Dispatcher-Worker
    pub worker: usize,
    pub heartbeat_takt_ms: u64,
    pub retransmit_kapazitaet: usize,
    /// Geraet, wenn eine Start-Anfrage keines nennt
    pub standard_geraet: String,
    /// Format, wenn eine Start-Anfrage keines nennt
    pub standard_format: AudioFormat,
    /// Wartezeit auf den ersten Chunk
    pub anlaufzeit_ms: u64,
    pub lese_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    /// Maximale Chunk-Groesse in Bytes
    pub lese_groesse: usize,
}

impl Default for BroadcastEinstellungen {
    fn default() -> Self {
        let engine = BroadcastConfig::default();
        Self {
            intake_kapazitaet: engine.intake_kapazitaet,
            worker: engine.worker,
            heartbeat_takt_ms: engine.heartbeat_takt.as_millis() as u64,
            retransmit_kapazitaet: engine.retransmit_kapazitaet,
            standard_geraet: "default".into(),
            standard_format: AudioFormat::Mp3,
            anlaufzeit_ms: engine.capture.anlaufzeit.as_millis() as u64,
            lese_timeout_ms: engine.capture.lese_timeout.as_millis() as u64,
            stop_timeout_ms: engine.capture.stop_timeout.as_millis() as u64,
            lese_groesse: engine.capture.lese_groesse,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Haengt `/metrics` und `/health` in den HTTP-Server ein
    pub aktiviert: bool,
    /// Intervall, in dem Metriken und Health nachgefuehrt werden
    pub aktualisierung_ms: u64,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            aktualisierung_ms: 1000,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer HTTP zurueck
    pub fn http_bind_adresse(&self) -> String {
        format!("{}:{}", self.server.bind_adresse, self.server.port)
    }

    /// Uebersetzt die Einstellungen in die Engine-Konfiguration
    pub fn broadcast_config(&self) -> BroadcastConfig {
        let b = &self.broadcast;
        let standard = BroadcastConfig::default();
        BroadcastConfig {
            intake_kapazitaet: b.intake_kapazitaet.max(1),
            worker: b.worker.max(1),
            heartbeat_takt: Duration::from_millis(b.heartbeat_takt_ms.max(10)),
            retransmit_kapazitaet: b.retransmit_kapazitaet.max(1),
            capture: CaptureConfig {
                encoder: self.encoder.clone(),
                anlaufzeit: Duration::from_millis(b.anlaufzeit_ms),
                lese_timeout: Duration::from_millis(b.lese_timeout_ms.max(1)),
                lese_groesse: b.lese_groesse.max(1),
                stop_timeout: Duration::from_millis(b.stop_timeout_ms),
                ..standard.capture
            },
            ..standard
        }
    }

    pub fn aktualisierungs_intervall(&self) -> Duration {
        Duration::from_millis(self.observability.aktualisierung_ms.max(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.broadcast.intake_kapazitaet, 8000);
        assert_eq!(cfg.broadcast.worker, 1);
        assert_eq!(cfg.broadcast.standard_format, AudioFormat::Mp3);
        assert_eq!(cfg.encoder.programm, "ffmpeg");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adresse() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_bind_adresse(), "0.0.0.0:8000");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Wohnzimmer"
            port = 9000

            [broadcast]
            worker = 2
            standard_format = "opus"
            anlaufzeit_ms = 5000

            [encoder]
            programm = "/usr/local/bin/ffmpeg"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Wohnzimmer");
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.broadcast.worker, 2);
        assert_eq!(cfg.broadcast.standard_format, AudioFormat::Opus);
        assert_eq!(cfg.encoder.programm, "/usr/local/bin/ffmpeg");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.encoder.geraete_programm, "ffmpeg");
        assert!(!cfg.encoder.argumente.is_empty());
    }

    #[test]
    fn engine_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.broadcast.worker = 0;
        cfg.broadcast.anlaufzeit_ms = 1500;
        cfg.broadcast.lese_groesse = 8192;

        let engine = cfg.broadcast_config();
        assert_eq!(engine.worker, 1, "Mindestens ein Worker");
        assert_eq!(engine.capture.anlaufzeit, Duration::from_millis(1500));
        assert_eq!(engine.capture.lese_groesse, 8192);
        assert_eq!(engine.capture.encoder, cfg.encoder);
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/roomcast.toml").unwrap();
        assert_eq!(cfg.server.port, 8000);
    }
}
