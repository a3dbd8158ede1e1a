//! Externer Encoder-Prozess
//!
//! Der Encoder liest vom Audio-Geraet und schreibt den kodierten Stream
//! auf stdout. Programm und Argumente sind frei konfigurierbar; in jedem
//! Argument werden `{device}`, `{format}` und `{codec}` ersetzt.

use serde::{Deserialize, Serialize};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::{BroadcastError, BroadcastResult};
use crate::format::AudioFormat;

/// Aufruf des Encoders und des Programms zur Geraete-Auflistung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder-Programm (Standard: ffmpeg)
    pub programm: String,
    /// Argumente mit Platzhaltern `{device}`, `{format}`, `{codec}`
    pub argumente: Vec<String>,
    /// Programm zur Geraete-Auflistung
    pub geraete_programm: String,
    pub geraete_argumente: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            programm: "ffmpeg".into(),
            argumente: [
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "pulse",
                "-i",
                "{device}",
                "-ac",
                "2",
                "-ar",
                "44100",
                "-c:a",
                "{codec}",
                "-f",
                "{format}",
                "-",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            geraete_programm: "ffmpeg".into(),
            geraete_argumente: ["-hide_banner", "-sources", "pulse"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl EncoderConfig {
    /// Argumentliste mit ersetzten Platzhaltern
    pub fn argumente_fuer(&self, geraet: &str, format: AudioFormat) -> Vec<String> {
        self.argumente
            .iter()
            .map(|arg| {
                arg.replace("{device}", geraet)
                    .replace("{format}", format.container())
                    .replace("{codec}", format.codec())
            })
            .collect()
    }

    /// Startet den Encoder mit umgeleitetem stdout und stderr
    pub(crate) fn starten(&self, geraet: &str, format: AudioFormat) -> BroadcastResult<EncoderProzess> {
        let argumente = self.argumente_fuer(geraet, format);
        tracing::debug!(programm = %self.programm, argumente = ?argumente, "Starte Encoder");

        let mut child = Command::new(&self.programm)
            .args(&argumente)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BroadcastError::Spawn {
                programm: self.programm.clone(),
                grund: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| BroadcastError::Spawn {
            programm: self.programm.clone(),
            grund: "stdout nicht verfuegbar".into(),
        })?;

        // stderr eigenstaendig leeren, sonst blockiert ein gespraechiger Encoder
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut zeilen = BufReader::new(stderr).lines();
                while let Ok(Some(zeile)) = zeilen.next_line().await {
                    if !zeile.trim().is_empty() {
                        tracing::debug!(encoder = %zeile, "Encoder-Meldung");
                    }
                }
            })
        });

        tracing::info!(pid = child.id(), geraet, format = %format, "Encoder gestartet");

        Ok(EncoderProzess {
            child,
            stdout: Some(stdout),
            stderr_task,
        })
    }
}

/// Laufender Encoder-Prozess
///
/// `kill_on_drop` stellt sicher, dass kein Prozess die Session ueberlebt.
#[derive(Debug)]
pub(crate) struct EncoderProzess {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_task: Option<JoinHandle<()>>,
}

impl EncoderProzess {
    /// Uebergibt stdout an den Lese-Task (nur einmal moeglich)
    pub(crate) fn stdout_nehmen(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Beendet den Prozess: SIGTERM, begrenzte Wartezeit, dann Kill
    ///
    /// Gibt den Exit-Status zurueck, sofern der Prozess ohne Kill endete.
    pub(crate) async fn beenden(mut self, wartezeit: Duration) -> Option<ExitStatus> {
        self.stdout = None;

        let status = if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!(status = %status, "Encoder war bereits beendet");
            Some(status)
        } else {
            self.terminieren();

            match tokio::time::timeout(wartezeit, self.child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(status = %status, "Encoder beendet");
                    Some(status)
                }
                Ok(Err(e)) => {
                    tracing::warn!(fehler = %e, "Warten auf Encoder fehlgeschlagen");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        wartezeit_ms = wartezeit.as_millis() as u64,
                        "Encoder reagiert nicht auf SIGTERM – erzwinge Kill"
                    );
                    if let Err(e) = self.child.kill().await {
                        tracing::warn!(fehler = %e, "Kill des Encoders fehlgeschlagen");
                    }
                    None
                }
            }
        };

        if let Some(task) = self.stderr_task.take() {
            // Ende von stderr folgt dem Prozessende
            if tokio::time::timeout(wartezeit, task).await.is_err() {
                tracing::debug!("stderr-Task des Encoders abgebrochen");
            }
        }
        status
    }

    #[cfg(unix)]
    fn terminieren(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            tracing::debug!(pid, fehler = %e, "SIGTERM konnte nicht zugestellt werden");
        }
    }

    #[cfg(not(unix))]
    fn terminieren(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(fehler = %e, "Kill des Encoders fehlgeschlagen");
        }
    }
}
