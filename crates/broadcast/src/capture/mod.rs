//! Capture-Session – liest den kodierten Stream des Encoders
//!
//! Ablauf:
//! 1. Encoder starten (stdout/stderr umgeleitet)
//! 2. Lese-Task starten, auf den ersten Chunk innerhalb der Anlaufzeit warten
//! 3. Jeder Lesevorgang wird zum Chunk: Sequenz-ID vergeben, im
//!    Retransmit-Buffer ablegen, in den Intake einreihen (Drop-Oldest)
//! 4. EOF, Lesefehler oder zu viele Lese-Timeouts in Folge beenden die
//!    Session endgueltig; es gibt keinen automatischen Neustart
//!
//! Liefert der Encoder innerhalb der Anlaufzeit nichts, wird die
//! Geraete-Auflistung als Diagnose ausgefuehrt und der Start schlaegt fehl.

pub mod devices;
pub mod encoder;

use bytes::Bytes;
use chrono::Utc;
use roomcast_core::BroadcastEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::chunk::Chunk;
use crate::dispatcher::intake_einreihen;
use crate::error::{BroadcastError, BroadcastResult};
use crate::format::AudioFormat;
use crate::queue::IntakeQueue;
use crate::retransmit::RetransmitBuffer;
use crate::sequencer::Sequencer;
use crate::stats::BroadcastZaehler;

pub use devices::{list_devices, GERAETE_ZEITLIMIT};
pub use encoder::EncoderConfig;
use encoder::EncoderProzess;

/// Lese-Timeouts in Folge, ab denen der Encoder als haengend gilt
pub const MAX_STALLED_READS: u32 = 5;

/// Konfiguration der Capture-Session
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub encoder: EncoderConfig,
    /// Wartezeit auf den ersten Chunk
    pub anlaufzeit: Duration,
    /// Zeitlimit eines einzelnen Lesevorgangs
    pub lese_timeout: Duration,
    /// Maximale Laenge eines Chunks in Bytes
    pub lese_groesse: usize,
    /// Begrenzte Wartezeit beim Stoppen (Intake leeren, SIGTERM)
    pub stop_timeout: Duration,
    pub max_stillstand: u32,
    pub geraete_zeitlimit: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            anlaufzeit: Duration::from_secs(3),
            lese_timeout: Duration::from_secs(2),
            lese_groesse: 4096,
            stop_timeout: Duration::from_secs(2),
            max_stillstand: MAX_STALLED_READS,
            geraete_zeitlimit: GERAETE_ZEITLIMIT,
        }
    }
}

/// Gemeinsame Engine-Bausteine, in die eine Session schreibt
#[derive(Clone)]
pub struct CaptureKontext {
    pub sequencer: Arc<Sequencer>,
    pub retransmit: Arc<RetransmitBuffer>,
    pub intake: IntakeQueue,
    pub zaehler: Arc<BroadcastZaehler>,
    pub ereignisse: broadcast::Sender<BroadcastEvent>,
}

/// Grund fuer das Ende der Lese-Schleife
#[derive(Debug)]
enum LeseEnde {
    Gestoppt,
    Fehler(String),
}

/// Eine laufende Capture-Session
///
/// Besitzt den Encoder-Prozess und den Lese-Task; beide enden spaetestens
/// mit [`CaptureSession::stoppen`] bzw. beim Drop (`kill_on_drop`).
pub struct CaptureSession {
    geraet: String,
    format: AudioFormat,
    started_at: Instant,
    token: CancellationToken,
    prozess: Option<EncoderProzess>,
    leser: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("geraet", &self.geraet)
            .field("format", &self.format)
            .field("aktiv", &self.ist_aktiv())
            .finish()
    }
}

impl CaptureSession {
    /// Startet Encoder und Lese-Task und wartet auf den ersten Chunk
    ///
    /// `token` ist ein Kind-Token der Engine; es wird bei Stop oder
    /// fatalem Lesefehler abgebrochen.
    pub async fn starten(
        kontext: &CaptureKontext,
        config: &CaptureConfig,
        geraet: &str,
        format: AudioFormat,
        token: CancellationToken,
    ) -> BroadcastResult<Self> {
        let mut prozess = config.encoder.starten(geraet, format)?;
        let stdout = prozess.stdout_nehmen().ok_or_else(|| BroadcastError::Spawn {
            programm: config.encoder.programm.clone(),
            grund: "stdout bereits vergeben".into(),
        })?;

        kontext.sequencer.zuruecksetzen();
        kontext.retransmit.leeren();

        let (erster_tx, erster_rx) = oneshot::channel();
        let leser = tokio::spawn(lese_schleife(
            kontext.clone(),
            LeseParameter {
                geraet: geraet.to_string(),
                format,
                lese_timeout: config.lese_timeout,
                lese_groesse: config.lese_groesse.max(1),
                max_stillstand: config.max_stillstand,
            },
            stdout,
            token.clone(),
            erster_tx,
        ));

        let mut session = Self {
            geraet: geraet.to_string(),
            format,
            started_at: Instant::now(),
            token,
            prozess: Some(prozess),
            leser: Some(leser),
        };

        match tokio::time::timeout(config.anlaufzeit, erster_rx).await {
            Ok(Ok(())) => Ok(session),
            anders => {
                let fehler = match anders {
                    Err(_) => BroadcastError::KeineDaten(config.anlaufzeit),
                    _ => BroadcastError::ProzessBeendet(
                        "Encoder endete vor dem ersten Chunk".into(),
                    ),
                };
                tracing::warn!(geraet, format = %format, fehler = %fehler, "Capture-Start fehlgeschlagen");
                session.abbauen(config.stop_timeout).await;
                devices::diagnose_loggen(&config.encoder, config.geraete_zeitlimit).await;
                Err(fehler)
            }
        }
    }

    pub fn geraet(&self) -> &str {
        &self.geraet
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Liefert die Session noch Daten?
    pub fn ist_aktiv(&self) -> bool {
        !self.token.is_cancelled() && self.leser.as_ref().is_some_and(|l| !l.is_finished())
    }

    /// Stoppt die Session
    ///
    /// Token abbrechen, begrenzt auf das Leeren des Intakes warten, dann
    /// den Encoder beenden (SIGTERM, danach Kill).
    pub async fn stoppen(mut self, intake: &IntakeQueue, stop_timeout: Duration) {
        tracing::info!(geraet = %self.geraet, format = %self.format, "Stoppe Capture-Session");
        self.token.cancel();
        auf_leeren_intake_warten(intake, stop_timeout).await;
        self.abbauen(stop_timeout).await;
    }

    async fn abbauen(&mut self, wartezeit: Duration) {
        self.token.cancel();
        if let Some(prozess) = self.prozess.take() {
            prozess.beenden(wartezeit).await;
        }
        if let Some(leser) = self.leser.take() {
            if tokio::time::timeout(wartezeit, leser).await.is_err() {
                tracing::warn!("Lese-Task endete nicht rechtzeitig");
            }
        }
    }
}

/// Wartet begrenzt, bis die Dispatcher-Worker den Intake geleert haben
pub(crate) async fn auf_leeren_intake_warten(intake: &IntakeQueue, max: Duration) -> bool {
    let geleert = intake.warten_bis_leer(max).await;
    if !geleert {
        tracing::warn!(verbleibend = intake.len(), "Intake nicht rechtzeitig geleert");
    }
    geleert
}

struct LeseParameter {
    geraet: String,
    format: AudioFormat,
    lese_timeout: Duration,
    lese_groesse: usize,
    max_stillstand: u32,
}

/// Lese-Task einer Session
///
/// Markiert die Session beim ersten Chunk als laufend. Endet sie danach
/// mit einem Fehler, wird das Token abgebrochen und der Fehler in der
/// Statistik hinterlegt.
async fn lese_schleife(
    kontext: CaptureKontext,
    param: LeseParameter,
    mut stdout: ChildStdout,
    token: CancellationToken,
    erster_chunk: oneshot::Sender<()>,
) {
    let mut erster_chunk = Some(erster_chunk);
    let mut puffer = vec![0u8; param.lese_groesse];
    let mut stillstand = 0u32;

    let ende = loop {
        let gelesen = tokio::select! {
            biased;
            _ = token.cancelled() => break LeseEnde::Gestoppt,
            r = tokio::time::timeout(param.lese_timeout, stdout.read(&mut puffer)) => r,
        };

        match gelesen {
            Err(_) => {
                stillstand += 1;
                tracing::debug!(stillstand, "Lese-Timeout");
                if stillstand > param.max_stillstand {
                    break LeseEnde::Fehler(format!(
                        "Encoder liefert seit {stillstand} Lesevorgaengen keine Daten"
                    ));
                }
            }
            Ok(Ok(0)) => break LeseEnde::Fehler("Encoder-Ausgabe beendet (EOF)".into()),
            Ok(Ok(n)) => {
                stillstand = 0;

                if let Some(tx) = erster_chunk.take() {
                    kontext.zaehler.session_gestartet(&param.geraet, param.format.as_str());
                    tracing::info!(geraet = %param.geraet, format = %param.format, "Broadcast laeuft");
                    let _ = kontext.ereignisse.send(BroadcastEvent::BroadcastGestartet {
                        geraet: param.geraet.clone(),
                        format: param.format.to_string(),
                        zeitpunkt: Utc::now(),
                    });
                    let _ = tx.send(());
                }

                let payload = Bytes::copy_from_slice(&puffer[..n]);
                let chunk = Chunk::neu(kontext.sequencer.next_sequence_id(), payload);
                kontext.retransmit.record_chunk(chunk.clone());
                intake_einreihen(&kontext.intake, chunk, &kontext.zaehler);

                BroadcastZaehler::erhoehen(&kontext.zaehler.bytes_gelesen, n as u64);
                BroadcastZaehler::erhoehen(&kontext.zaehler.chunks_gelesen, 1);
            }
            Ok(Err(e)) => break LeseEnde::Fehler(format!("Lesefehler: {e}")),
        }
    };

    if erster_chunk.is_some() {
        // Start nie bestaetigt: der Aufrufer von `starten` meldet den Fehler
        tracing::debug!(ende = ?ende, "Lese-Task vor dem ersten Chunk beendet");
        return;
    }

    match ende {
        LeseEnde::Gestoppt => {
            kontext.zaehler.session_beendet(None);
            tracing::info!(
                sequenzen = kontext.sequencer.vergeben(),
                "Capture-Session gestoppt"
            );
            let _ = kontext.ereignisse.send(BroadcastEvent::BroadcastGestoppt {
                grund: None,
                zeitpunkt: Utc::now(),
            });
        }
        LeseEnde::Fehler(grund) => {
            token.cancel();
            kontext.zaehler.session_beendet(Some(grund.clone()));
            tracing::error!(grund = %grund, "Capture-Session abgebrochen");
            let _ = kontext.ereignisse.send(BroadcastEvent::BroadcastGestoppt {
                grund: Some(grund),
                zeitpunkt: Utc::now(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
