//! BroadcastEngine – Komposition und Lebenszyklus der Broadcast-Engine
//!
//! Eine Instanz pro Prozess, erzeugt von der Composition-Root und per
//! `Clone` (innerer Arc) an alle Aufrufer weitergereicht. Es gibt keine
//! globalen Singletons.
//!
//! Dispatcher-Worker und Heartbeat-Monitor laufen fuer die gesamte
//! Lebensdauer der Engine, damit Consumer schon vor dem ersten Broadcast
//! registriert werden koennen und Keepalives erhalten. Die Capture-Session
//! lebt nur zwischen `start_broadcast` und `stop_broadcast`.

use bytes::Bytes;
use roomcast_core::{BroadcastEvent, ConsumerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use crate::capture::{self, CaptureConfig, CaptureKontext, CaptureSession};
use crate::dispatcher::{Dispatcher, INTAKE_KAPAZITAET};
use crate::drain::ConsumerDrain;
use crate::error::{BroadcastError, BroadcastResult};
use crate::format::AudioFormat;
use crate::heartbeat::{HeartbeatMonitor, HEARTBEAT_TAKT};
use crate::queue::{ConsumerQueue, IntakeQueue};
use crate::registry::ClientRegistry;
use crate::retransmit::{RetransmitBuffer, RETRANSMIT_KAPAZITAET};
use crate::sequencer::Sequencer;
use crate::stats::{BroadcastZaehler, StatsSnapshot};
use crate::supervisor::Supervisor;

/// Konfiguration der Engine
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Kapazitaet der Intake-Queue in Chunks
    pub intake_kapazitaet: usize,
    /// Anzahl Dispatcher-Worker
    pub worker: usize,
    /// Takt des Heartbeat-Monitors
    pub heartbeat_takt: Duration,
    pub retransmit_kapazitaet: usize,
    /// Puffer des Ereignis-Kanals
    pub ereignis_kapazitaet: usize,
    /// Begrenzte Wartezeit je Task beim Herunterfahren
    pub herunterfahren_zeitlimit: Duration,
    pub capture: CaptureConfig,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            intake_kapazitaet: INTAKE_KAPAZITAET,
            worker: 1,
            heartbeat_takt: HEARTBEAT_TAKT,
            retransmit_kapazitaet: RETRANSMIT_KAPAZITAET,
            ereignis_kapazitaet: 256,
            herunterfahren_zeitlimit: Duration::from_secs(2),
            capture: CaptureConfig::default(),
        }
    }
}

/// Die Broadcast-Engine
///
/// Thread-safe und `Clone`-faehig; alle Clones teilen denselben Zustand.
#[derive(Clone)]
pub struct BroadcastEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: BroadcastConfig,
    registry: ClientRegistry,
    sequencer: Arc<Sequencer>,
    retransmit: Arc<RetransmitBuffer>,
    intake: IntakeQueue,
    zaehler: Arc<BroadcastZaehler>,
    ereignisse: broadcast::Sender<BroadcastEvent>,
    supervisor: Supervisor,
    /// Hoechstens eine Session; der Lock serialisiert Start und Stop
    capture: AsyncMutex<Option<CaptureSession>>,
    tasks_gestartet: AtomicBool,
}

impl BroadcastEngine {
    /// Erstellt die Engine ohne Hintergrund-Tasks zu starten
    pub fn neu(config: BroadcastConfig) -> Self {
        let (ereignisse, _) = broadcast::channel(config.ereignis_kapazitaet.max(1));
        let inner = EngineInner {
            registry: ClientRegistry::neu(),
            sequencer: Arc::new(Sequencer::neu()),
            retransmit: Arc::new(RetransmitBuffer::neu(config.retransmit_kapazitaet.max(1))),
            intake: IntakeQueue::neu(config.intake_kapazitaet.max(1)),
            zaehler: Arc::new(BroadcastZaehler::neu()),
            ereignisse,
            supervisor: Supervisor::neu(),
            capture: AsyncMutex::new(None),
            tasks_gestartet: AtomicBool::new(false),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Startet Dispatcher-Worker und Heartbeat-Monitor (idempotent)
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn starten(&self) {
        if self.inner.tasks_gestartet.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = &self.inner;

        let dispatcher = Dispatcher::neu(
            inner.registry.clone(),
            inner.intake.clone(),
            Arc::clone(&inner.zaehler),
        );
        let worker = inner.config.worker.max(1);
        for nummer in 0..worker {
            inner.supervisor.spawn(
                format!("dispatch-{nummer}"),
                dispatcher.clone().worker_starten(nummer, inner.supervisor.token()),
            );
        }

        let monitor = HeartbeatMonitor::neu(
            inner.registry.clone(),
            Arc::clone(&inner.zaehler),
            inner.ereignisse.clone(),
            inner.config.heartbeat_takt,
        );
        inner
            .supervisor
            .spawn("heartbeat", monitor.starten(inner.supervisor.token()));

        tracing::info!(
            worker,
            intake_kapazitaet = inner.intake.capacity(),
            heartbeat_takt_ms = inner.config.heartbeat_takt.as_millis() as u64,
            "Broadcast-Engine gestartet"
        );
    }

    // -----------------------------------------------------------------------
    // Consumer
    // -----------------------------------------------------------------------

    /// Registriert einen Consumer; das Profil wird aus dem Label bestimmt
    pub fn register_consumer(&self, profil_label: &str) -> (ConsumerId, ConsumerQueue) {
        self.register_consumer_with_id(ConsumerId::new(), profil_label)
    }

    /// Registriert unter vorgegebener ID (idempotent)
    pub fn register_consumer_with_id(
        &self,
        id: ConsumerId,
        profil_label: &str,
    ) -> (ConsumerId, ConsumerQueue) {
        let neu = !self.inner.registry.enthaelt(&id);
        let (id, queue) = self.inner.registry.register_with_id(id, profil_label);
        if neu {
            if let Some(session) = self.inner.registry.get(&id) {
                let _ = self.inner.ereignisse.send(BroadcastEvent::ConsumerRegistriert {
                    consumer: id,
                    profil: session.profile().name.to_string(),
                });
            }
        }
        (id, queue)
    }

    /// Meldet einen Consumer ab; false wenn er nicht (mehr) registriert war
    pub fn unregister_consumer(&self, id: &ConsumerId) -> bool {
        let entfernt = self.inner.registry.unregister(id);
        if entfernt {
            let _ = self
                .inner
                .ereignisse
                .send(BroadcastEvent::ConsumerAbgemeldet { consumer: *id });
        }
        entfernt
    }

    /// Entnahme-Handle fuer den Transport eines Consumers
    pub fn drain_consumer(&self, id: &ConsumerId) -> Option<ConsumerDrain> {
        self.inner
            .registry
            .get(id)
            .map(|session| ConsumerDrain::neu(*id, session.queue().clone()))
    }

    // -----------------------------------------------------------------------
    // Broadcast-Lebenszyklus
    // -----------------------------------------------------------------------

    /// Startet eine Capture-Session
    ///
    /// `false` bei Formatkonflikt, fehlgeschlagenem Encoder-Start oder wenn
    /// innerhalb der Anlaufzeit keine Daten kommen. Der Grund steht im Log
    /// und in `stats().last_error`.
    pub async fn start_broadcast(&self, geraet: &str, format: AudioFormat) -> bool {
        let inner = &self.inner;
        if inner.supervisor.ist_beendet() {
            tracing::warn!("Broadcast-Start nach Shutdown abgelehnt");
            return false;
        }
        if geraet.trim().is_empty() {
            tracing::warn!("Broadcast-Start ohne Geraet abgelehnt");
            inner.zaehler.fehler_setzen("Kein Geraet angegeben");
            return false;
        }
        self.starten();

        let mut slot = inner.capture.lock().await;

        if let Some(aktiv) = slot.as_ref() {
            if aktiv.ist_aktiv() && aktiv.format() != format && !inner.registry.is_empty() {
                let fehler = BroadcastError::Formatkonflikt {
                    aktiv: aktiv.format().to_string(),
                    angefordert: format.to_string(),
                };
                tracing::warn!(
                    consumer = inner.registry.len(),
                    fehler = %fehler,
                    "Broadcast-Start abgelehnt"
                );
                inner.zaehler.fehler_setzen(fehler.to_string());
                return false;
            }
        }

        if let Some(alt) = slot.take() {
            alt.stoppen(&inner.intake, inner.config.capture.stop_timeout).await;
        }

        let kontext = CaptureKontext {
            sequencer: Arc::clone(&inner.sequencer),
            retransmit: Arc::clone(&inner.retransmit),
            intake: inner.intake.clone(),
            zaehler: Arc::clone(&inner.zaehler),
            ereignisse: inner.ereignisse.clone(),
        };

        match CaptureSession::starten(
            &kontext,
            &inner.config.capture,
            geraet,
            format,
            inner.supervisor.kind_token(),
        )
        .await
        {
            Ok(session) => {
                *slot = Some(session);
                true
            }
            Err(e) => {
                tracing::warn!(geraet, format = %format, fehler = %e, "Broadcast konnte nicht gestartet werden");
                inner.zaehler.fehler_setzen(e.to_string());
                false
            }
        }
    }

    /// Stoppt die laufende Capture-Session (No-op ohne Session)
    pub async fn stop_broadcast(&self) {
        let session = self.inner.capture.lock().await.take();
        match session {
            Some(session) => {
                session
                    .stoppen(&self.inner.intake, self.inner.config.capture.stop_timeout)
                    .await
            }
            None => tracing::debug!("Kein Broadcast aktiv"),
        }
    }

    /// Stoppt Broadcast und Hintergrund-Tasks, entfernt alle Consumer
    pub async fn shutdown(&self) {
        tracing::info!("Broadcast-Engine wird heruntergefahren");
        self.stop_broadcast().await;
        let sauber = self
            .inner
            .supervisor
            .herunterfahren(self.inner.config.herunterfahren_zeitlimit)
            .await;
        let entfernt = self.inner.registry.alle_entfernen();
        self.inner.intake.close();
        tracing::info!(tasks = sauber, consumer = entfernt, "Broadcast-Engine beendet");
    }

    // -----------------------------------------------------------------------
    // Lesende Sichten
    // -----------------------------------------------------------------------

    /// Momentaufnahme aller Zaehler und Consumer
    pub fn stats(&self) -> StatsSnapshot {
        let inner = &self.inner;
        let mut snapshot = inner.zaehler.snapshot_basis();
        snapshot.per_consumer = inner
            .registry
            .snapshot()
            .iter()
            .filter(|s| s.ist_aktiv())
            .map(|s| s.stats())
            .collect();
        snapshot.registry_size = inner.registry.len();
        snapshot.peak_concurrent = inner.registry.peak_concurrent();
        snapshot
    }

    /// Format des laufenden Broadcasts
    pub fn aktives_format(&self) -> Option<AudioFormat> {
        self.inner.zaehler.aktives_format()?.parse().ok()
    }

    pub fn laeuft(&self) -> bool {
        self.inner.zaehler.laeuft()
    }

    /// Abonniert Lebenszyklus-Ereignisse
    pub fn events(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.inner.ereignisse.subscribe()
    }

    /// Listet die Audio-Quellen ueber das konfigurierte Programm auf
    pub async fn list_devices(&self) -> BroadcastResult<Vec<String>> {
        let config = &self.inner.config.capture;
        capture::list_devices(&config.encoder, config.geraete_zeitlimit).await
    }

    /// Diagnose: Nutzdaten einer Sequenz-ID aus dem Retransmit-Buffer
    pub fn retransmit_lookup(&self, sequence_id: i64) -> Option<Bytes> {
        self.inner.retransmit.lookup(sequence_id)
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.inner.config
    }

    /// Namen der laufenden Hintergrund-Tasks
    pub fn laufende_tasks(&self) -> Vec<String> {
        self.inner.supervisor.laufende_tasks()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
