//! Retransmit-Buffer – begrenzte Historie der letzten Chunks
//!
//! Nur fuer Diagnose und Tests: kein Consumer liest automatisch daraus.
//! Neue Eintraege ueberschreiben die aeltesten (FIFO), Einfuegen ist O(1)
//! und blockiert nie laenger als die kurze Mutex-Sektion.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::chunk::Chunk;

/// Standard-Kapazitaet (Anzahl Chunks)
pub const RETRANSMIT_KAPAZITAET: usize = 2000;

/// Ringpuffer der zuletzt gelesenen Chunks
#[derive(Debug)]
pub struct RetransmitBuffer {
    kapazitaet: usize,
    ring: Mutex<VecDeque<Chunk>>,
}

impl RetransmitBuffer {
    /// # Panics
    /// Bei Kapazitaet 0.
    pub fn neu(kapazitaet: usize) -> Self {
        assert!(kapazitaet > 0, "Retransmit-Kapazitaet muss > 0 sein");
        Self {
            kapazitaet,
            ring: Mutex::new(VecDeque::with_capacity(kapazitaet)),
        }
    }

    /// Legt einen Chunk ab, der aelteste faellt bei voller Kapazitaet heraus
    pub fn record(&self, sequence_id: i64, payload: Bytes) {
        self.record_chunk(Chunk::neu(sequence_id, payload));
    }

    pub fn record_chunk(&self, chunk: Chunk) {
        let mut ring = self.ring.lock();
        if ring.len() == self.kapazitaet {
            ring.pop_front();
        }
        ring.push_back(chunk);
    }

    /// Sucht die Nutzdaten zu einer Sequenz-ID
    pub fn lookup(&self, sequence_id: i64) -> Option<Bytes> {
        self.lookup_chunk(sequence_id).map(|c| c.payload)
    }

    pub fn lookup_chunk(&self, sequence_id: i64) -> Option<Chunk> {
        let ring = self.ring.lock();
        let erste = ring.front()?.sequence_id;

        // Schneller Pfad: IDs sind innerhalb einer Session lueckenlos
        if sequence_id >= erste {
            if let Ok(index) = usize::try_from(sequence_id - erste) {
                if let Some(chunk) = ring.get(index) {
                    if chunk.sequence_id == sequence_id {
                        return Some(chunk.clone());
                    }
                }
            }
        }

        ring.iter().find(|c| c.sequence_id == sequence_id).cloned()
    }

    /// Aelteste noch vorhandene Sequenz-ID
    pub fn aelteste_id(&self) -> Option<i64> {
        self.ring.lock().front().map(|c| c.sequence_id)
    }

    /// Neueste Sequenz-ID
    pub fn neueste_id(&self) -> Option<i64> {
        self.ring.lock().back().map(|c| c.sequence_id)
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.kapazitaet
    }

    /// Leert den Puffer (neue Capture-Session)
    pub fn leeren(&self) {
        self.ring.lock().clear();
    }
}

impl Default for RetransmitBuffer {
    fn default() -> Self {
        Self::neu(RETRANSMIT_KAPAZITAET)
    }
}
