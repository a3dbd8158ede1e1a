//! Client-Registry – Buchfuehrung aller Broadcast-Consumer
//!
//! Einzige Stelle, an der die Zuordnung ConsumerId -> Session lebt.
//! Dispatcher und Heartbeat iterieren ueber einen Snapshot
//! (copy-then-iterate), damit waehrend des Fan-outs kein Shard-Lock der
//! DashMap gehalten wird.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use roomcast_core::ConsumerId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use tokio::time::Instant;

use crate::chunk::{QueueEintrag, KEEPALIVE_SEQUENZ};
use crate::profile::{profil_aufloesen, DeliveryProfile};
use crate::queue::ConsumerQueue;
use crate::stats::ConsumerStats;

// ---------------------------------------------------------------------------
// ConsumerSession
// ---------------------------------------------------------------------------

/// Zustand eines Consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Active,
    /// Endzustand; der Consumer ist aus der Registry entfernt
    Evicted,
}

/// Zeitstempel eines Consumers (gemeinsam unter einem Lock)
#[derive(Debug, Clone, Copy)]
struct Zeitstempel {
    letzte_aktivitaet: Instant,
    letzter_keepalive: Instant,
}

/// Ein registrierter Broadcast-Empfaenger mit eigener Queue
#[derive(Debug)]
pub struct ConsumerSession {
    id: ConsumerId,
    queue: ConsumerQueue,
    profile: DeliveryProfile,
    created_at: Instant,
    zeiten: Mutex<Zeitstempel>,
    bytes_sent: AtomicU64,
    chunks_sent: AtomicU64,
    state: AtomicU8,
}

const STATE_ACTIVE: u8 = 0;
const STATE_EVICTED: u8 = 1;

impl ConsumerSession {
    fn neu(id: ConsumerId, profile: DeliveryProfile) -> Self {
        let jetzt = Instant::now();
        Self {
            id,
            queue: ConsumerQueue::neu(profile.queue_capacity),
            profile,
            created_at: jetzt,
            zeiten: Mutex::new(Zeitstempel {
                letzte_aktivitaet: jetzt,
                letzter_keepalive: jetzt,
            }),
            bytes_sent: AtomicU64::new(0),
            chunks_sent: AtomicU64::new(0),
            state: AtomicU8::new(STATE_ACTIVE),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn queue(&self) -> &ConsumerQueue {
        &self.queue
    }

    pub fn profile(&self) -> &DeliveryProfile {
        &self.profile
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    pub fn last_activity(&self) -> Instant {
        self.zeiten.lock().letzte_aktivitaet
    }

    pub fn last_keepalive(&self) -> Instant {
        self.zeiten.lock().letzter_keepalive
    }

    pub fn state(&self) -> ConsumerState {
        match self.state.load(Ordering::Acquire) {
            STATE_ACTIVE => ConsumerState::Active,
            _ => ConsumerState::Evicted,
        }
    }

    pub fn ist_aktiv(&self) -> bool {
        self.state() == ConsumerState::Active
    }

    /// Nach erfolgreichem Einfuegen eines Daten-Eintrags
    pub(crate) fn zustellung_verbuchen(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.zeiten.lock().letzte_aktivitaet = Instant::now();
    }

    /// Versucht einen Keepalive einzureihen (ohne Verdraengung)
    ///
    /// Der Keepalive-Takt laeuft ab `jetzt` neu, auch wenn die Queue voll
    /// war: eine volle Queue bedeutet, dass bereits Daten fliessen.
    pub(crate) fn keepalive_senden(&self, jetzt: Instant) -> bool {
        let eintrag: QueueEintrag = (KEEPALIVE_SEQUENZ, Bytes::new());
        let eingereiht = self.queue.try_push(eintrag).is_ok();
        let mut zeiten = self.zeiten.lock();
        zeiten.letzter_keepalive = jetzt;
        if eingereiht {
            zeiten.letzte_aktivitaet = jetzt;
        }
        eingereiht
    }

    /// Endzustand setzen und die Queue schliessen; true beim ersten Aufruf
    pub(crate) fn entfernen(&self) -> bool {
        let vorher = self.state.swap(STATE_EVICTED, Ordering::AcqRel);
        self.queue.close();
        vorher == STATE_ACTIVE
    }

    /// Statistik-Zeile fuer den Snapshot
    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            id: self.id,
            profile: self.profile.name.to_string(),
            bytes_sent: self.bytes_sent(),
            chunks_sent: self.chunks_sent(),
            queue_len: self.queue.len(),
            uptime_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientRegistry
// ---------------------------------------------------------------------------

/// Nebenlaeufige Registry aller Consumer
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: DashMap<ConsumerId, Arc<ConsumerSession>>,
    /// Hoechste gleichzeitige Anzahl Consumer
    spitze: AtomicUsize,
}

impl ClientRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert einen neuen Consumer mit frischer ID
    pub fn register(&self, profil_label: &str) -> (ConsumerId, ConsumerQueue) {
        self.register_with_id(ConsumerId::new(), profil_label)
    }

    /// Registriert unter einer vorgegebenen ID (idempotent)
    ///
    /// Ist die ID bereits bekannt, wird die bestehende Queue
    /// zurueckgegeben; Zaehler und Profil bleiben unveraendert.
    pub fn register_with_id(&self, id: ConsumerId, profil_label: &str) -> (ConsumerId, ConsumerQueue) {
        let session = self
            .inner
            .sessions
            .entry(id)
            .or_insert_with(|| {
                let profil = profil_aufloesen(profil_label);
                tracing::info!(
                    consumer = %id,
                    profil = profil.name,
                    label = profil_label,
                    "Consumer registriert"
                );
                Arc::new(ConsumerSession::neu(id, profil))
            })
            .value()
            .clone();

        self.inner
            .spitze
            .fetch_max(self.inner.sessions.len(), Ordering::Relaxed);

        (id, session.queue.clone())
    }

    /// Entfernt einen Consumer; mehrfacher Aufruf ist ein No-op
    pub fn unregister(&self, id: &ConsumerId) -> bool {
        match self.inner.sessions.remove(id) {
            Some((_, session)) => {
                session.entfernen();
                tracing::info!(consumer = %id, "Consumer abgemeldet");
                true
            }
            None => false,
        }
    }

    /// Konsistente Momentaufnahme aller Sessions
    ///
    /// Die DashMap-Locks sind beim Rueckgabezeitpunkt bereits freigegeben.
    pub fn snapshot(&self) -> Vec<Arc<ConsumerSession>> {
        self.inner
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn get(&self, id: &ConsumerId) -> Option<Arc<ConsumerSession>> {
        self.inner.sessions.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn enthaelt(&self, id: &ConsumerId) -> bool {
        self.inner.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Hoechste bisher beobachtete Anzahl gleichzeitiger Consumer
    pub fn peak_concurrent(&self) -> usize {
        self.inner.spitze.load(Ordering::Relaxed)
    }

    /// Entfernt alle Consumer (Engine-Shutdown)
    pub fn alle_entfernen(&self) -> usize {
        let ids: Vec<ConsumerId> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        ids.iter().filter(|id| self.unregister(id)).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{MOBIL, STANDARD};

    #[test]
    fn register_liefert_queue_mit_profilkapazitaet() {
        let registry = ClientRegistry::neu();
        let (id, queue) = registry.register("unbekannt");
        assert_eq!(queue.capacity(), STANDARD.queue_capacity);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).unwrap().profile().name, "standard");

        let (_, queue) = registry.register("Mozilla/5.0 (iPhone) Mobile Safari");
        assert_eq!(queue.capacity(), MOBIL.queue_capacity);
    }

    #[test]
    fn register_ist_idempotent() {
        let registry = ClientRegistry::neu();
        let id = ConsumerId::new();
        let (_, q1) = registry.register_with_id(id, "standard");

        registry.get(&id).unwrap().zustellung_verbuchen(100);

        // Zweite Registrierung, sogar mit anderem Label
        let (_, q2) = registry.register_with_id(id, "mobil");
        assert!(q1.gleiche_queue(&q2));
        assert_eq!(registry.len(), 1);

        let session = registry.get(&id).unwrap();
        assert_eq!(session.bytes_sent(), 100, "Zaehler duerfen nicht zurueckgesetzt werden");
        assert_eq!(session.profile().name, "standard", "Profil bleibt lebenslang");
    }

    #[test]
    fn unregister_mehrfach_ist_noop() {
        let registry = ClientRegistry::neu();
        let (id, queue) = registry.register("standard");
        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
        assert!(queue.ist_geschlossen(), "Transport muss das Ende sehen");
    }

    #[test]
    fn snapshot_haelt_keine_locks() {
        let registry = ClientRegistry::neu();
        let (a, _) = registry.register("standard");
        let (b, _) = registry.register("standard");

        let snapshot = registry.snapshot();
        // Aenderungen waehrend der Iteration duerfen nicht blockieren
        for session in &snapshot {
            registry.unregister(&session.id());
        }
        assert_eq!(snapshot.len(), 2);
        assert!(!registry.enthaelt(&a));
        assert!(!registry.enthaelt(&b));
        assert!(snapshot.iter().all(|s| !s.ist_aktiv()));
    }

    #[test]
    fn spitzenwert_bleibt_nach_abmeldung() {
        let registry = ClientRegistry::neu();
        let ids: Vec<_> = (0..5).map(|_| registry.register("standard").0).collect();
        for id in &ids[..3] {
            registry.unregister(id);
        }
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.peak_concurrent(), 5);
    }

    #[test]
    fn clone_teilt_state() {
        let r1 = ClientRegistry::neu();
        let r2 = r1.clone();
        let (id, _) = r1.register("standard");
        assert!(r2.enthaelt(&id));
        assert_eq!(r2.alle_entfernen(), 1);
        assert!(r1.is_empty());
    }

    #[test]
    fn keepalive_ohne_verdraengung() {
        let registry = ClientRegistry::neu();
        let (id, queue) = registry.register("standard");
        let session = registry.get(&id).unwrap();

        for i in 0..queue.capacity() as i64 {
            queue.try_push((i, Bytes::from_static(b"x"))).unwrap();
        }
        assert!(!session.keepalive_senden(Instant::now()));
        // Daten bleiben unangetastet
        assert_eq!(queue.try_pop().map(|e| e.0), Some(0));
    }
}
