//! Broadcast-Dispatcher – verteilt Intake-Chunks an alle Consumer-Queues
//!
//! ## Design-Entscheidungen
//! - Jeder Consumer hat eine eigene Queue, eingefuegt wird nie blockierend:
//!   ein langsamer Consumer kann weder andere Consumer noch den Intake
//!   aufhalten.
//! - Volle Queue: aeltesten Eintrag verdraengen, dann erneut einfuegen.
//! - Zustellfehler sind nie fatal, sie werden nur gezaehlt.
//! - Mehrere Worker teilen sich einen Intake. Entnahme und Verteilung
//!   eines Chunks laufen unter einem gemeinsamen Lock, damit jede
//!   Consumer-Queue die Intake-Reihenfolge sieht.
//!
//! ## Wiederholungs- und Redundanzbudget
//! - `redundancy == 1`: ein Einfuegeversuch plus hoechstens
//!   [`ZUSTELL_WIEDERHOLUNGEN`] sofortige Wiederholungen, jeweils nach
//!   einer Verdraengung.
//! - `redundancy > 1`: der Chunk wird bis zu `min(redundancy, MAX_REDUNDANZ)`
//!   mal eingereiht, jede Einfuegung mit genau einer Verdraengung.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::chunk::{Chunk, QueueEintrag};
use crate::profile::ZUSTELL_WIEDERHOLUNGEN;
use crate::queue::{ConsumerQueue, IntakeQueue};
use crate::registry::{ClientRegistry, ConsumerSession};
use crate::stats::BroadcastZaehler;

/// Standard-Kapazitaet der Intake-Queue (Chunks)
pub const INTAKE_KAPAZITAET: usize = 8000;

/// Wartezeit eines Workers auf neue Intake-Eintraege vor erneuter Pruefung
pub const INTAKE_WARTEZEIT: Duration = Duration::from_millis(250);

/// Reiht einen Chunk in die Intake-Queue ein, ohne den Produzenten zu blockieren
///
/// Bei voller Queue wird der aelteste Eintrag verworfen und gezaehlt.
pub fn intake_einreihen(intake: &IntakeQueue, chunk: Chunk, zaehler: &BroadcastZaehler) {
    if let Some(verworfen) = intake.push_drop_oldest(chunk) {
        BroadcastZaehler::erhoehen(&zaehler.intake_verworfen, 1);
        tracing::trace!(
            sequence_id = verworfen.sequence_id,
            "Intake voll – aeltester Chunk verworfen"
        );
    }
}

/// Fuegt einen Eintrag ein und verdraengt bei voller Queue hoechstens
/// `verdraengungen` mal den aeltesten Eintrag
///
/// Gibt true zurueck, sobald der Eintrag in der Queue liegt.
pub fn einreihen_mit_verdraengung(
    queue: &ConsumerQueue,
    eintrag: QueueEintrag,
    verdraengungen: u32,
) -> bool {
    let mut eintrag = eintrag;
    for _ in 0..verdraengungen {
        match queue.try_push(eintrag) {
            Ok(()) => return true,
            Err(zurueck) => {
                if queue.ist_geschlossen() {
                    return false;
                }
                queue.evict_oldest();
                eintrag = zurueck;
            }
        }
    }
    queue.try_push(eintrag).is_ok()
}

/// Verteilt Chunks aus der Intake-Queue an alle registrierten Consumer
///
/// Thread-safe und `Clone`-faehig; mehrere Worker teilen sich eine Instanz.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ClientRegistry,
    intake: IntakeQueue,
    zaehler: Arc<BroadcastZaehler>,
    /// Serialisiert Entnahme plus Verteilung ueber alle Worker
    reihenfolge: Arc<Mutex<()>>,
}

impl Dispatcher {
    pub fn neu(registry: ClientRegistry, intake: IntakeQueue, zaehler: Arc<BroadcastZaehler>) -> Self {
        Self {
            registry,
            intake,
            zaehler,
            reihenfolge: Arc::new(Mutex::new(())),
        }
    }

    /// Verteilt einen Chunk an alle Consumer eines Registry-Snapshots
    ///
    /// Gibt die Anzahl der Consumer zurueck, die den Chunk erhalten haben.
    pub fn verteilen(&self, chunk: &Chunk) -> usize {
        let mut erreicht = 0usize;

        for session in self.registry.snapshot() {
            if !session.ist_aktiv() {
                continue;
            }
            if self.an_consumer_liefern(&session, chunk) {
                erreicht += 1;
            } else {
                BroadcastZaehler::erhoehen(&self.zaehler.zustellfehler, 1);
                tracing::trace!(
                    consumer = %session.id(),
                    sequence_id = chunk.sequence_id,
                    "Zustellung fehlgeschlagen"
                );
            }
        }

        BroadcastZaehler::erhoehen(&self.zaehler.chunks_verteilt, 1);
        erreicht
    }

    /// Wendet die Profil-Politik fuer einen Consumer an
    fn an_consumer_liefern(&self, session: &ConsumerSession, chunk: &Chunk) -> bool {
        let profil = session.profile();
        let queue = session.queue();
        let redundanz = profil.effektive_redundanz();

        if redundanz > 1 {
            let mut erfolgreich = 0u32;
            for _ in 0..redundanz {
                if einreihen_mit_verdraengung(queue, chunk.eintrag(), 1) {
                    session.zustellung_verbuchen(chunk.len());
                    erfolgreich += 1;
                }
            }
            erfolgreich > 0
        } else if einreihen_mit_verdraengung(queue, chunk.eintrag(), ZUSTELL_WIEDERHOLUNGEN) {
            session.zustellung_verbuchen(chunk.len());
            true
        } else {
            false
        }
    }

    /// Entnimmt und verteilt genau einen Chunk unter dem Reihenfolge-Lock
    ///
    /// `false` wenn der Intake leer war.
    fn naechsten_verteilen(&self) -> bool {
        let _reihenfolge = self.reihenfolge.lock();
        match self.intake.try_pop() {
            Some(chunk) => {
                self.verteilen(&chunk);
                true
            }
            None => false,
        }
    }

    /// Worker-Schleife: laeuft bis das Token abgebrochen wird
    ///
    /// Wartet mit Zeitlimit auf den Intake, damit das Token auch ohne
    /// Datenfluss regelmaessig geprueft wird.
    pub async fn worker_starten(self, nummer: usize, token: CancellationToken) {
        tracing::debug!(worker = nummer, "Dispatcher-Worker gestartet");

        loop {
            if token.is_cancelled() {
                break;
            }

            let bereit = tokio::select! {
                _ = token.cancelled() => break,
                b = self.intake.warten_auf_eintrag(INTAKE_WARTEZEIT) => b,
            };
            if !bereit {
                if self.intake.ist_geschlossen() && self.intake.is_empty() {
                    break;
                }
                continue;
            }

            while !token.is_cancelled() && self.naechsten_verteilen() {
                // Andere Worker und Tasks nicht aushungern
                tokio::task::yield_now().await;
            }
        }

        tracing::debug!(worker = nummer, "Dispatcher-Worker beendet");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::Ordering;

    fn aufbau() -> (Dispatcher, ClientRegistry, Arc<BroadcastZaehler>) {
        let registry = ClientRegistry::neu();
        let zaehler = Arc::new(BroadcastZaehler::neu());
        let intake = IntakeQueue::neu(INTAKE_KAPAZITAET);
        let d = Dispatcher::neu(registry.clone(), intake, Arc::clone(&zaehler));
        (d, registry, zaehler)
    }

    fn chunk(seq: i64) -> Chunk {
        Chunk::neu(seq, Bytes::from(vec![seq as u8]))
    }

    fn alle_ids(queue: &ConsumerQueue) -> Vec<i64> {
        std::iter::from_fn(|| queue.try_pop()).map(|(seq, _)| seq).collect()
    }

    #[test]
    fn vierzig_chunks_in_queue_mit_kapazitaet_32() {
        let (d, registry, _) = aufbau();
        let (_, queue) = registry.register("standard");

        for seq in 0..40 {
            d.verteilen(&chunk(seq));
        }

        assert_eq!(queue.len(), 32);
        assert_eq!(alle_ids(&queue), (8..40).collect::<Vec<_>>());
    }

    #[test]
    fn reihenfolge_ohne_verluste_lueckenlos() {
        let (d, registry, _) = aufbau();
        let (_, queue) = registry.register("standard");

        let mut gesehen = Vec::new();
        for seq in 0..200 {
            d.verteilen(&chunk(seq));
            // Transport leert schneller als produziert wird
            gesehen.extend(alle_ids(&queue));
        }

        assert_eq!(gesehen, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn zaehler_pro_consumer() {
        let (d, registry, zaehler) = aufbau();
        let (id, _) = registry.register("standard");

        d.verteilen(&Chunk::neu(0, Bytes::from_static(b"abcd")));
        d.verteilen(&Chunk::neu(1, Bytes::from_static(b"ef")));

        let session = registry.get(&id).unwrap();
        assert_eq!(session.bytes_sent(), 6);
        assert_eq!(session.chunks_sent(), 2);
        assert_eq!(zaehler.chunks_verteilt.load(Ordering::Relaxed), 2);
        assert_eq!(zaehler.zustellfehler.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn redundantes_profil_erhaelt_duplikate() {
        let (d, registry, _) = aufbau();
        let (id, queue) = registry.register("mobil");

        d.verteilen(&chunk(0));
        d.verteilen(&chunk(1));

        assert_eq!(alle_ids(&queue), vec![0, 0, 1, 1]);
        assert_eq!(registry.get(&id).unwrap().chunks_sent(), 4);
    }

    #[test]
    fn langsamer_consumer_bremst_niemanden() {
        let (d, registry, _) = aufbau();
        let (_, blockiert) = registry.register("standard");
        let (_, schnell) = registry.register("standard");

        let mut gesehen = Vec::new();
        for seq in 0..1000 {
            assert_eq!(d.verteilen(&chunk(seq)), 2, "beide Consumer muessen jeden Chunk erhalten");
            gesehen.extend(alle_ids(&schnell));
        }

        assert_eq!(gesehen.len(), 1000);
        assert_eq!(blockiert.len(), blockiert.capacity());
    }

    #[test]
    fn geschlossene_queue_zaehlt_als_fehler() {
        let (d, registry, zaehler) = aufbau();
        let (_, queue) = registry.register("standard");
        // Transport hat die Queue geschlossen, Consumer aber noch registriert
        queue.close();

        assert_eq!(d.verteilen(&chunk(0)), 0);
        assert_eq!(zaehler.zustellfehler.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn intake_verwirft_aeltesten() {
        let zaehler = BroadcastZaehler::neu();
        let intake = IntakeQueue::neu(2);
        for seq in 0..5 {
            intake_einreihen(&intake, chunk(seq), &zaehler);
        }
        assert_eq!(intake.len(), 2);
        assert_eq!(zaehler.intake_verworfen.load(Ordering::Relaxed), 3);
        assert_eq!(intake.try_pop().map(|c| c.sequence_id), Some(3));
    }

    #[tokio::test]
    async fn worker_verteilt_und_endet_auf_token() {
        let (d, registry, _) = aufbau();
        let (_, queue) = registry.register("standard");
        let token = CancellationToken::new();

        let worker = tokio::spawn(d.clone().worker_starten(0, token.clone()));
        intake_einreihen(&d.intake, chunk(0), &BroadcastZaehler::neu());

        let eintrag = queue.recv_timeout(Duration::from_secs(2)).await;
        assert_eq!(eintrag.map(|e| e.0), Some(0));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("Worker muss nach Abbruch enden")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mehrere_worker_halten_reihenfolge() {
        const ANZAHL: i64 = 20_000;
        let (d, registry, _) = aufbau();
        let (_, queue) = registry.register("empfaenger");
        let token = CancellationToken::new();

        let worker: Vec<_> = (0..4)
            .map(|n| tokio::spawn(d.clone().worker_starten(n, token.clone())))
            .collect();

        let leser_queue = queue.clone();
        let leser = tokio::spawn(async move {
            let mut ids = Vec::with_capacity(ANZAHL as usize);
            while ids.len() < ANZAHL as usize {
                match leser_queue.recv_timeout(Duration::from_secs(5)).await {
                    Some((seq, _)) => ids.push(seq),
                    None => break,
                }
            }
            ids
        });

        let zaehler = BroadcastZaehler::neu();
        for seq in 0..ANZAHL {
            intake_einreihen(&d.intake, chunk(seq), &zaehler);
            // Takt so waehlen, dass die Consumer-Queue nie ueberlaeuft
            if seq % 64 == 63 {
                while !d.intake.is_empty() || queue.len() > 128 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }

        let ids = leser.await.unwrap();
        assert_eq!(queue.verdraengt(), 0);
        assert_eq!(ids.len(), ANZAHL as usize);
        assert_eq!(ids.first(), Some(&0));
        assert!(
            ids.windows(2).all(|w| w[1] == w[0] + 1),
            "Consumer muss lueckenlos aufsteigende IDs sehen"
        );

        token.cancel();
        for w in worker {
            w.await.unwrap();
        }
    }
}
