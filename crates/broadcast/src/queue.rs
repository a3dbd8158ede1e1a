//! Begrenzte Queue mit Drop-Oldest-Politik
//!
//! Grundlage fuer die globale Intake-Queue und fuer jede Consumer-Queue.
//! Mehrere Produzenten (Dispatcher-Worker, Heartbeat-Monitor) schreiben
//! lock-frei hinein, ein einzelner Leser (Transport bzw. Dispatcher) wartet
//! asynchron ueber ein `Notify`.
//!
//! Eine volle Queue blockiert nie den Produzenten: entweder wird der
//! Eintrag abgelehnt ([`BoundedQueue::try_push`]) oder der aelteste
//! Eintrag verdraengt ([`BoundedQueue::push_drop_oldest`]).
//!
//! Ein zweites `Notify` meldet, wenn eine Entnahme die Queue geleert hat
//! ([`BoundedQueue::warten_bis_leer`]).

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::chunk::{Chunk, QueueEintrag};

/// Queue eines Consumers: (Sequenz-ID, Nutzdaten)
pub type ConsumerQueue = BoundedQueue<QueueEintrag>;

/// Globale Intake-Queue zwischen Capture und Dispatcher
pub type IntakeQueue = BoundedQueue<Chunk>;

/// Begrenzte MPSC-Queue mit expliziter Verdraengungspolitik
///
/// `Clone` teilt den inneren Zustand (Arc).
pub struct BoundedQueue<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    eintraege: ArrayQueue<T>,
    signal: Notify,
    /// Weckt alle Warter auf eine leere Queue
    geleert: Notify,
    geschlossen: AtomicBool,
    /// Anzahl verdraengter Eintraege seit Erstellung
    verdraengt: AtomicU64,
    /// Zeitpunkt der letzten Entnahme durch den Leser
    letzte_entnahme: Mutex<Instant>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("kapazitaet", &self.capacity())
            .field("geschlossen", &self.ist_geschlossen())
            .finish()
    }
}

impl<T> BoundedQueue<T> {
    /// Erstellt eine leere Queue mit fester Kapazitaet
    ///
    /// # Panics
    /// Bei Kapazitaet 0.
    pub fn neu(kapazitaet: usize) -> Self {
        assert!(kapazitaet > 0, "Queue-Kapazitaet muss > 0 sein");
        Self {
            inner: Arc::new(QueueInner {
                eintraege: ArrayQueue::new(kapazitaet),
                signal: Notify::new(),
                geleert: Notify::new(),
                geschlossen: AtomicBool::new(false),
                verdraengt: AtomicU64::new(0),
                letzte_entnahme: Mutex::new(Instant::now()),
            }),
        }
    }

    /// Nicht-blockierendes Einfuegen; gibt den Eintrag bei voller Queue zurueck
    pub fn try_push(&self, eintrag: T) -> Result<(), T> {
        if self.ist_geschlossen() {
            return Err(eintrag);
        }
        self.inner.eintraege.push(eintrag)?;
        self.inner.signal.notify_one();
        Ok(())
    }

    /// Fuegt ein und verdraengt bei Bedarf den aeltesten Eintrag
    ///
    /// Gibt den verdraengten Eintrag zurueck. Auf einer geschlossenen
    /// Queue wird der neue Eintrag selbst verworfen und zurueckgegeben.
    pub fn push_drop_oldest(&self, eintrag: T) -> Option<T> {
        if self.ist_geschlossen() {
            return Some(eintrag);
        }
        let verdraengt = self.inner.eintraege.force_push(eintrag);
        if verdraengt.is_some() {
            self.inner.verdraengt.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.signal.notify_one();
        verdraengt
    }

    /// Entfernt den aeltesten Eintrag, um Platz zu schaffen
    ///
    /// Zaehlt als Verdraengung, nicht als Entnahme durch den Leser.
    pub fn evict_oldest(&self) -> Option<T> {
        let alt = self.inner.eintraege.pop();
        if alt.is_some() {
            self.inner.verdraengt.fetch_add(1, Ordering::Relaxed);
            self.leer_melden();
        }
        alt
    }

    /// Nicht-blockierende Entnahme durch den Leser
    pub fn try_pop(&self) -> Option<T> {
        let eintrag = self.inner.eintraege.pop();
        if eintrag.is_some() {
            *self.inner.letzte_entnahme.lock() = Instant::now();
            self.leer_melden();
        }
        eintrag
    }

    fn leer_melden(&self) {
        if self.inner.eintraege.is_empty() {
            self.inner.geleert.notify_waiters();
        }
    }

    /// Wartet auf den naechsten Eintrag
    ///
    /// Gibt `None` zurueck, sobald die Queue geschlossen und leer ist.
    pub async fn recv(&self) -> Option<T> {
        loop {
            if let Some(eintrag) = self.try_pop() {
                return Some(eintrag);
            }
            if self.ist_geschlossen() {
                return None;
            }
            self.inner.signal.notified().await;
        }
    }

    /// Wie [`recv`](Self::recv), aber hoechstens `dauer` lang
    ///
    /// `None` bedeutet Zeitlimit oder geschlossen-und-leer.
    pub async fn recv_timeout(&self, dauer: Duration) -> Option<T> {
        tokio::time::timeout(dauer, self.recv()).await.ok().flatten()
    }

    /// Wartet hoechstens `dauer`, bis ein Eintrag bereitliegt, ohne ihn zu entnehmen
    ///
    /// `false` bei Zeitlimit oder geschlossener, leerer Queue.
    pub async fn warten_auf_eintrag(&self, dauer: Duration) -> bool {
        let warten = async {
            loop {
                if !self.is_empty() {
                    return true;
                }
                if self.ist_geschlossen() {
                    return false;
                }
                self.inner.signal.notified().await;
            }
        };
        tokio::time::timeout(dauer, warten).await.unwrap_or(false)
    }

    /// Wartet hoechstens `dauer`, bis die Queue leer ist
    ///
    /// `false` wenn nach Ablauf noch Eintraege liegen.
    pub async fn warten_bis_leer(&self, dauer: Duration) -> bool {
        let warten = async {
            loop {
                let geleert = self.inner.geleert.notified();
                tokio::pin!(geleert);
                // Vor der Pruefung anmelden, sonst geht ein notify_waiters verloren
                geleert.as_mut().enable();
                if self.is_empty() {
                    return;
                }
                geleert.await;
            }
        };
        tokio::time::timeout(dauer, warten).await.is_ok()
    }

    /// Schliesst die Queue: keine neuen Eintraege, der Leser sieht das Ende
    /// nachdem er die restlichen Eintraege entnommen hat
    pub fn close(&self) {
        self.inner.geschlossen.store(true, Ordering::Release);
        self.inner.signal.notify_one();
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.inner.geschlossen.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.eintraege.is_empty()
    }

    pub fn ist_voll(&self) -> bool {
        self.inner.eintraege.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.inner.eintraege.capacity()
    }

    /// Anzahl verdraengter Eintraege seit Erstellung
    pub fn verdraengt(&self) -> u64 {
        self.inner.verdraengt.load(Ordering::Relaxed)
    }

    /// Zeitpunkt der letzten Entnahme (Erstellungszeit, falls nie entnommen)
    pub fn letzte_entnahme(&self) -> Instant {
        *self.inner.letzte_entnahme.lock()
    }

    /// Prueft ob zwei Handles dieselbe Queue bezeichnen
    pub fn gleiche_queue(&self, andere: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &andere.inner)
    }
}
