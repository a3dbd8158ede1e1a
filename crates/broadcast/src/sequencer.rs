//! Sequencer – vergibt monotone Sequenz-IDs fuer gelesene Chunks

use std::sync::atomic::{AtomicI64, Ordering};

/// Atomarer Sequenzzaehler einer Capture-Session
///
/// Beginnt bei 0; -1 ist fuer Keepalives reserviert und wird nie vergeben.
#[derive(Debug, Default)]
pub struct Sequencer {
    naechste: AtomicI64,
}

impl Sequencer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Naechste freie Sequenz-ID (atomares Inkrement)
    pub fn next_sequence_id(&self) -> i64 {
        self.naechste.fetch_add(1, Ordering::Relaxed)
    }

    /// Anzahl bisher vergebener IDs
    pub fn vergeben(&self) -> i64 {
        self.naechste.load(Ordering::Relaxed)
    }

    /// Startet einen neuen Sequenzraum (nur beim Start einer neuen Session)
    pub fn zuruecksetzen(&self) {
        self.naechste.store(0, Ordering::Relaxed);
    }
}
