//! Lebenszyklus-Ereignisse der Broadcast-Engine
//!
//! Die Engine veroeffentlicht diese Ereignisse ueber einen
//! `tokio::sync::broadcast`-Kanal; der Server loggt sie und leitet daraus
//! Metriken ab. Audio-Chunks selbst laufen nie ueber diesen Kanal.

use crate::types::ConsumerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alle Ereignisse, die die Engine nach aussen meldet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// Ein Consumer wurde registriert
    ConsumerRegistriert {
        consumer: ConsumerId,
        profil: String,
    },
    /// Ein Consumer wurde explizit abgemeldet
    ConsumerAbgemeldet { consumer: ConsumerId },
    /// Ein Consumer wurde vom Heartbeat-Monitor entfernt
    ConsumerEntfernt {
        consumer: ConsumerId,
        grund: EntfernungsGrund,
    },
    /// Eine Capture-Session liefert Daten
    BroadcastGestartet {
        geraet: String,
        format: String,
        zeitpunkt: DateTime<Utc>,
    },
    /// Eine Capture-Session wurde beendet (explizit oder durch Fehler)
    BroadcastGestoppt {
        grund: Option<String>,
        zeitpunkt: DateTime<Utc>,
    },
}

/// Warum ein Consumer entfernt wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntfernungsGrund {
    /// Kein Eintrag (weder Daten noch Keepalive) innerhalb des Idle-Timeouts
    Inaktiv,
    /// Queue voll und vom Transport seit dem Idle-Timeout nicht geleert
    Blockiert,
}

impl BroadcastEvent {
    /// Kurzer Name fuer Logs und Metrik-Labels
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConsumerRegistriert { .. } => "consumer_registriert",
            Self::ConsumerAbgemeldet { .. } => "consumer_abgemeldet",
            Self::ConsumerEntfernt { .. } => "consumer_entfernt",
            Self::BroadcastGestartet { .. } => "broadcast_gestartet",
            Self::BroadcastGestoppt { .. } => "broadcast_gestoppt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ereignis_serialisierung_mit_tag() {
        let ev = BroadcastEvent::ConsumerEntfernt {
            consumer: ConsumerId::new(),
            grund: EntfernungsGrund::Inaktiv,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"typ\":\"consumer_entfernt\""));
        assert!(json.contains("\"grund\":\"inaktiv\""));

        let zurueck: BroadcastEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, ev);
    }

    #[test]
    fn ereignis_namen() {
        let ev = BroadcastEvent::BroadcastGestoppt {
            grund: None,
            zeitpunkt: Utc::now(),
        };
        assert_eq!(ev.name(), "broadcast_gestoppt");
    }
}
