//! Aggregierte Zaehler und der Statistik-Snapshot der Engine
//!
//! Alle Zaehler sind Atomics und werden ohne Lock aus Capture, Dispatcher
//! und Heartbeat fortgeschrieben. Der Snapshot ist eine reine Lese-Sicht
//! und darf jederzeit parallel zu allen anderen Operationen erstellt werden.

use parking_lot::RwLock;
use roomcast_core::ConsumerId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Laufende Zaehler der Engine
#[derive(Debug, Default)]
pub struct BroadcastZaehler {
    /// Ob aktuell eine Capture-Session Daten liefert
    pub laeuft: AtomicBool,
    /// Gelesene Bytes vom Encoder (ueber alle Sessions)
    pub bytes_gelesen: AtomicU64,
    /// Gelesene Chunks vom Encoder
    pub chunks_gelesen: AtomicU64,
    /// Vom Dispatcher verteilte Intake-Eintraege
    pub chunks_verteilt: AtomicU64,
    /// Fehlgeschlagene Zustellungen (ein Consumer, ein Chunk)
    pub zustellfehler: AtomicU64,
    /// In der Intake-Queue verdraengte Chunks
    pub intake_verworfen: AtomicU64,
    /// Vom Heartbeat-Monitor entfernte Consumer
    pub entfernt: AtomicU64,
    /// Gesendete Keepalive-Eintraege
    pub keepalives: AtomicU64,
    session: RwLock<SessionInfo>,
}

/// Beschreibung der aktuellen bzw. letzten Capture-Session
#[derive(Debug, Clone, Default)]
struct SessionInfo {
    format: Option<String>,
    geraet: Option<String>,
    letzter_fehler: Option<String>,
}

impl BroadcastZaehler {
    pub fn neu() -> Self {
        Self::default()
    }

    pub(crate) fn erhoehen(zaehler: &AtomicU64, um: u64) {
        zaehler.fetch_add(um, Ordering::Relaxed);
    }

    pub fn laeuft(&self) -> bool {
        self.laeuft.load(Ordering::Acquire)
    }

    /// Markiert den Start einer Session und loescht den letzten Fehler
    pub(crate) fn session_gestartet(&self, geraet: &str, format: &str) {
        let mut info = self.session.write();
        info.geraet = Some(geraet.to_string());
        info.format = Some(format.to_string());
        info.letzter_fehler = None;
        self.laeuft.store(true, Ordering::Release);
    }

    /// Markiert das Ende einer Session, optional mit Fehlergrund
    pub(crate) fn session_beendet(&self, fehler: Option<String>) {
        self.laeuft.store(false, Ordering::Release);
        if fehler.is_some() {
            self.session.write().letzter_fehler = fehler;
        }
    }

    /// Setzt den letzten Fehler ohne Session (z.B. fehlgeschlagener Start)
    pub(crate) fn fehler_setzen(&self, fehler: impl Into<String>) {
        self.session.write().letzter_fehler = Some(fehler.into());
    }

    /// Format der aktiven Session (nur solange sie laeuft)
    pub fn aktives_format(&self) -> Option<String> {
        if !self.laeuft() {
            return None;
        }
        self.session.read().format.clone()
    }

    pub fn letzter_fehler(&self) -> Option<String> {
        self.session.read().letzter_fehler.clone()
    }

    /// Liest die skalaren Zaehler in einen Snapshot (ohne Consumer-Liste)
    pub(crate) fn snapshot_basis(&self) -> StatsSnapshot {
        let info = self.session.read().clone();
        let laeuft = self.laeuft();
        StatsSnapshot {
            running: laeuft,
            format: if laeuft { info.format } else { None },
            device: if laeuft { info.geraet } else { None },
            total_bytes: self.bytes_gelesen.load(Ordering::Relaxed),
            chunks_read: self.chunks_gelesen.load(Ordering::Relaxed),
            chunks_broadcast: self.chunks_verteilt.load(Ordering::Relaxed),
            broadcast_failures: self.zustellfehler.load(Ordering::Relaxed),
            intake_dropped: self.intake_verworfen.load(Ordering::Relaxed),
            evictions: self.entfernt.load(Ordering::Relaxed),
            keepalives: self.keepalives.load(Ordering::Relaxed),
            per_consumer: Vec::new(),
            registry_size: 0,
            peak_concurrent: 0,
            last_error: info.letzter_fehler,
        }
    }
}

/// Statistik eines einzelnen Consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStats {
    pub id: ConsumerId,
    pub profile: String,
    pub bytes_sent: u64,
    pub chunks_sent: u64,
    pub queue_len: usize,
    pub uptime_secs: u64,
}

/// Read-only Sicht auf den Zustand der Engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub format: Option<String>,
    pub device: Option<String>,
    pub total_bytes: u64,
    pub chunks_read: u64,
    pub chunks_broadcast: u64,
    pub broadcast_failures: u64,
    pub intake_dropped: u64,
    pub evictions: u64,
    pub keepalives: u64,
    pub per_consumer: Vec<ConsumerStats>,
    pub registry_size: usize,
    pub peak_concurrent: usize,
    pub last_error: Option<String>,
}

impl StatsSnapshot {
    /// Kurze einzeilige Zusammenfassung fuer Logs
    pub fn zusammenfassung(&self) -> String {
        format!(
            "running={} format={} consumer={} gelesen={} verteilt={} fehler={} verworfen={}",
            self.running,
            self.format.as_deref().unwrap_or("-"),
            self.registry_size,
            self.chunks_read,
            self.chunks_broadcast,
            self.broadcast_failures,
            self.intake_dropped,
        )
    }

    /// Sucht die Statistik eines Consumers
    pub fn consumer(&self, id: &ConsumerId) -> Option<&ConsumerStats> {
        self.per_consumer.iter().find(|c| &c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neue_zaehler_sind_null() {
        let z = BroadcastZaehler::neu();
        let snap = z.snapshot_basis();
        assert!(!snap.running);
        assert_eq!(snap.total_bytes, 0);
        assert!(snap.format.is_none());
        assert!(snap.last_error.is_none());
    }

    #[test]
    fn session_lebenszyklus() {
        let z = BroadcastZaehler::neu();
        z.session_gestartet("default", "mp3");
        assert_eq!(z.aktives_format().as_deref(), Some("mp3"));

        let snap = z.snapshot_basis();
        assert!(snap.running);
        assert_eq!(snap.device.as_deref(), Some("default"));

        z.session_beendet(Some("Encoder beendet".into()));
        assert!(z.aktives_format().is_none());
        let snap = z.snapshot_basis();
        assert!(!snap.running);
        assert!(snap.format.is_none());
        assert_eq!(snap.last_error.as_deref(), Some("Encoder beendet"));

        // Neuer Start loescht den alten Fehler
        z.session_gestartet("default", "opus");
        assert!(z.letzter_fehler().is_none());
    }

    #[test]
    fn snapshot_serialisierung() {
        let z = BroadcastZaehler::neu();
        BroadcastZaehler::erhoehen(&z.chunks_gelesen, 3);
        let snap = z.snapshot_basis();
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"chunks_read\":3"));
        assert!(json.contains("\"running\":false"));
        assert!(snap.zusammenfassung().contains("gelesen=3"));
    }
}
