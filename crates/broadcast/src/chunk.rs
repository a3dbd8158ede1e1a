//! Chunk – eine Einheit kodierter Audiodaten mit Sequenz-ID
//!
//! Die Nutzdaten liegen in `bytes::Bytes`: ein Chunk wird einmal alloziert
//! und von allen Consumer-Queues nur per Referenzzaehler geteilt.

use bytes::Bytes;
use tokio::time::Instant;

/// Reservierte Sequenz-ID fuer Keepalive-Eintraege
pub const KEEPALIVE_SEQUENZ: i64 = -1;

/// Ein Eintrag in einer Consumer-Queue: (Sequenz-ID, Nutzdaten)
pub type QueueEintrag = (i64, Bytes);

/// Unveraenderlicher Audio-Chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Monoton steigend innerhalb einer Capture-Session
    pub sequence_id: i64,
    /// Kodierte Audiodaten (vom Engine-Kern nicht interpretiert)
    pub payload: Bytes,
    /// Zeitpunkt, zu dem der Chunk vom Encoder gelesen wurde
    pub captured_at: Instant,
}

impl Chunk {
    /// Erstellt einen neuen Daten-Chunk
    pub fn neu(sequence_id: i64, payload: Bytes) -> Self {
        Self {
            sequence_id,
            payload,
            captured_at: Instant::now(),
        }
    }

    /// Erstellt den Keepalive-Sentinel (leere Nutzdaten, ID -1)
    pub fn keepalive() -> Self {
        Self::neu(KEEPALIVE_SEQUENZ, Bytes::new())
    }

    /// Prueft ob es sich um einen Keepalive-Eintrag handelt
    pub fn ist_keepalive(&self) -> bool {
        self.sequence_id == KEEPALIVE_SEQUENZ
    }

    /// Laenge der Nutzdaten in Bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Queue-Eintrag fuer einen Consumer (teilt die Nutzdaten, kein Memcpy)
    pub fn eintrag(&self) -> QueueEintrag {
        (self.sequence_id, self.payload.clone())
    }
}

/// Prueft ob ein Queue-Eintrag ein Keepalive ist
pub fn ist_keepalive_eintrag(eintrag: &QueueEintrag) -> bool {
    eintrag.0 == KEEPALIVE_SEQUENZ
}
