//! Heartbeat-Monitor – Keepalives fuer stille Consumer, Entfernen toter Consumer
//!
//! Laeuft in einem festen, kurzen Takt unabhaengig von den Profil-Intervallen.
//! Pro Consumer gibt es zwei Uhren:
//! - `last_activity`: jede Einfuegung (Daten oder Keepalive), steuert das
//!   Entfernen nach `idle_timeout`
//! - `last_keepalive`: steuert, wann der naechste Sentinel faellig ist
//!
//! Zusaetzlich wird ein Consumer entfernt, dessen Queue voll ist und den
//! der Transport seit `idle_timeout` nicht mehr geleert hat. Ohne diese
//! Regel bliebe ein toter Consumer waehrend eines laufenden Broadcasts ewig
//! registriert, weil Drop-Oldest jede Einfuegung gelingen laesst.

use roomcast_core::event::EntfernungsGrund;
use roomcast_core::{BroadcastEvent, ConsumerId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::{ClientRegistry, ConsumerSession};
use crate::stats::BroadcastZaehler;

/// Standard-Takt des Monitors
pub const HEARTBEAT_TAKT: Duration = Duration::from_millis(250);

/// Ergebnis eines einzelnen Monitor-Takts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeartbeatBericht {
    /// Eingereihte Keepalives
    pub keepalives: usize,
    /// Verworfene Keepalives (Queue voll)
    pub keepalives_verworfen: usize,
    /// Entfernte Consumer mit Grund
    pub entfernt: Vec<(ConsumerId, EntfernungsGrund)>,
}

/// Periodischer Keepalive- und Eviction-Monitor
#[derive(Clone)]
pub struct HeartbeatMonitor {
    registry: ClientRegistry,
    zaehler: Arc<BroadcastZaehler>,
    ereignisse: broadcast::Sender<BroadcastEvent>,
    takt: Duration,
}

impl HeartbeatMonitor {
    pub fn neu(
        registry: ClientRegistry,
        zaehler: Arc<BroadcastZaehler>,
        ereignisse: broadcast::Sender<BroadcastEvent>,
        takt: Duration,
    ) -> Self {
        Self {
            registry,
            zaehler,
            ereignisse,
            takt,
        }
    }

    /// Ein Monitor-Schritt zum aktuellen Zeitpunkt
    pub fn tick(&self) -> HeartbeatBericht {
        self.tick_at(Instant::now())
    }

    /// Ein Monitor-Schritt zu einem vorgegebenen Zeitpunkt
    pub fn tick_at(&self, jetzt: Instant) -> HeartbeatBericht {
        let mut bericht = HeartbeatBericht::default();

        for session in self.registry.snapshot() {
            if !session.ist_aktiv() {
                continue;
            }

            if let Some(grund) = entfernungsgrund(&session, jetzt) {
                if self.registry.unregister(&session.id()) {
                    BroadcastZaehler::erhoehen(&self.zaehler.entfernt, 1);
                    tracing::info!(
                        consumer = %session.id(),
                        profil = session.profile().name,
                        grund = ?grund,
                        "Consumer entfernt"
                    );
                    let _ = self.ereignisse.send(BroadcastEvent::ConsumerEntfernt {
                        consumer: session.id(),
                        grund,
                    });
                    bericht.entfernt.push((session.id(), grund));
                }
                continue;
            }

            let seit_keepalive = jetzt.saturating_duration_since(session.last_keepalive());
            if seit_keepalive >= session.profile().heartbeat_interval {
                if session.keepalive_senden(jetzt) {
                    BroadcastZaehler::erhoehen(&self.zaehler.keepalives, 1);
                    bericht.keepalives += 1;
                } else {
                    bericht.keepalives_verworfen += 1;
                }
            }
        }

        bericht
    }

    /// Monitor-Schleife: laeuft bis das Token abgebrochen wird
    pub async fn starten(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.takt);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // Ersten Tick ueberspringen

        tracing::debug!(takt_ms = self.takt.as_millis() as u64, "Heartbeat-Monitor gestartet");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let bericht = self.tick();
                    if !bericht.entfernt.is_empty() {
                        tracing::debug!(
                            entfernt = bericht.entfernt.len(),
                            verbleibend = self.registry.len(),
                            "Heartbeat-Takt mit Entfernungen"
                        );
                    }
                }
            }
        }

        tracing::debug!("Heartbeat-Monitor beendet");
    }
}

/// Prueft ob ein Consumer entfernt werden muss
fn entfernungsgrund(session: &ConsumerSession, jetzt: Instant) -> Option<EntfernungsGrund> {
    let timeout = session.profile().idle_timeout;

    if jetzt.saturating_duration_since(session.last_activity()) >= timeout {
        return Some(EntfernungsGrund::Inaktiv);
    }

    let queue = session.queue();
    if queue.ist_voll() && jetzt.saturating_duration_since(queue.letzte_entnahme()) >= timeout {
        return Some(EntfernungsGrund::Blockiert);
    }

    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{EMPFAENGER, STANDARD};
    use crate::queue::ConsumerQueue;
    use bytes::Bytes;

    fn monitor(registry: &ClientRegistry) -> (HeartbeatMonitor, broadcast::Receiver<BroadcastEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let m = HeartbeatMonitor::neu(
            registry.clone(),
            Arc::new(BroadcastZaehler::neu()),
            tx,
            HEARTBEAT_TAKT,
        );
        (m, rx)
    }

    fn leeren(queue: &ConsumerQueue) -> Vec<i64> {
        std::iter::from_fn(|| queue.try_pop()).map(|(seq, _)| seq).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn kurzer_timeout_wird_entfernt_langer_bleibt() {
        let registry = ClientRegistry::neu();
        let (a, _) = registry.register("standard");
        let (b, _) = registry.register("empfaenger");
        let (m, mut rx) = monitor(&registry);

        let start = Instant::now();
        tokio::time::advance(STANDARD.idle_timeout + Duration::from_secs(1)).await;
        let bericht = m.tick_at(start + STANDARD.idle_timeout + Duration::from_secs(1));

        assert_eq!(bericht.entfernt, vec![(a, EntfernungsGrund::Inaktiv)]);
        assert!(!registry.enthaelt(&a));
        assert!(registry.enthaelt(&b));
        assert!(EMPFAENGER.idle_timeout > STANDARD.idle_timeout + Duration::from_secs(1));

        match rx.try_recv().unwrap() {
            BroadcastEvent::ConsumerEntfernt { consumer, grund } => {
                assert_eq!(consumer, a);
                assert_eq!(grund, EntfernungsGrund::Inaktiv);
            }
            andere => panic!("Unerwartetes Ereignis: {andere:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn genau_ein_keepalive_pro_intervall() {
        let registry = ClientRegistry::neu();
        let (_, queue) = registry.register("standard");
        let (m, _rx) = monitor(&registry);

        let intervall = STANDARD.heartbeat_interval;
        let schritte = (intervall.as_millis() / HEARTBEAT_TAKT.as_millis()) as usize;

        let mut keepalives = 0usize;
        for _ in 0..(schritte * 5) {
            tokio::time::advance(HEARTBEAT_TAKT).await;
            keepalives += m.tick().keepalives;
            // Transport leert sofort
            for seq in leeren(&queue) {
                assert_eq!(seq, -1);
            }
        }

        assert_eq!(keepalives, 5, "genau ein Sentinel pro Intervall");
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_haelt_consumer_am_leben() {
        let registry = ClientRegistry::neu();
        let (id, queue) = registry.register("standard");
        let (m, _rx) = monitor(&registry);

        // Doppelt so lange wie der Idle-Timeout, Transport leert regelmaessig
        let takte = (STANDARD.idle_timeout.as_millis() * 2 / HEARTBEAT_TAKT.as_millis()) as usize;
        for _ in 0..takte {
            tokio::time::advance(HEARTBEAT_TAKT).await;
            m.tick();
            leeren(&queue);
        }

        assert!(registry.enthaelt(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn volle_queue_verwirft_keepalive_still() {
        let registry = ClientRegistry::neu();
        let (_, queue) = registry.register("standard");
        let (m, _rx) = monitor(&registry);

        for seq in 0..queue.capacity() as i64 {
            queue.try_push((seq, Bytes::from_static(b"a"))).unwrap();
        }

        tokio::time::advance(STANDARD.heartbeat_interval).await;
        let bericht = m.tick();
        assert_eq!(bericht.keepalives, 0);
        assert_eq!(bericht.keepalives_verworfen, 1);
        assert!(leeren(&queue).iter().all(|seq| *seq >= 0));
    }

    #[tokio::test(start_paused = true)]
    async fn blockierter_consumer_wird_trotz_datenfluss_entfernt() {
        let registry = ClientRegistry::neu();
        let (id, queue) = registry.register("standard");
        let (m, _rx) = monitor(&registry);
        let session = registry.get(&id).unwrap();

        // Daten fliessen weiter (Drop-Oldest), aber niemand leert die Queue
        let takte = (STANDARD.idle_timeout.as_millis() / HEARTBEAT_TAKT.as_millis()) as i64 + 1;
        for seq in 0..takte {
            tokio::time::advance(HEARTBEAT_TAKT).await;
            queue.push_drop_oldest((seq, Bytes::from_static(b"a")));
            session.zustellung_verbuchen(1);
            m.tick();
        }

        assert!(!registry.enthaelt(&id));
        assert!(queue.ist_geschlossen());
    }

    #[tokio::test(start_paused = true)]
    async fn entfernte_consumer_tauchen_nicht_mehr_auf() {
        let registry = ClientRegistry::neu();
        let (id, queue) = registry.register("standard");
        let (m, _rx) = monitor(&registry);

        tokio::time::advance(STANDARD.idle_timeout).await;
        m.tick();

        assert!(registry.get(&id).is_none());
        assert!(registry.snapshot().is_empty());
        // Queue ist geschlossen, weitere Keepalives gibt es nicht
        tokio::time::advance(STANDARD.heartbeat_interval).await;
        assert_eq!(m.tick(), HeartbeatBericht::default());
        assert!(queue.ist_geschlossen());
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn schleife_endet_auf_token() {
        let registry = ClientRegistry::neu();
        let (m, _rx) = monitor(&registry);
        let token = CancellationToken::new();
        let handle = tokio::spawn(m.starten(token.clone()));

        tokio::time::advance(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
