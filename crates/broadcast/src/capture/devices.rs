//! Geraete-Auflistung ueber das konfigurierte Diagnose-Programm
//!
//! Dient zwei Zwecken: Diagnose nach einem fehlgeschlagenen Start und
//! Anzeige der verfuegbaren Quellen an der HTTP-Oberflaeche.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::encoder::EncoderConfig;
use crate::error::{BroadcastError, BroadcastResult};

/// Standard-Zeitlimit fuer die Auflistung
pub const GERAETE_ZEITLIMIT: Duration = Duration::from_secs(5);

/// Fuehrt das Auflistungs-Programm aus und liefert die nicht-leeren Zeilen
///
/// ffmpeg schreibt je nach Version nach stdout oder stderr, daher werden
/// beide Kanaele ausgewertet. Ein Fehler-Exit ohne Ausgabe ist ein Fehler.
pub async fn list_devices(config: &EncoderConfig, zeitlimit: Duration) -> BroadcastResult<Vec<String>> {
    let ausgabe = Command::new(&config.geraete_programm)
        .args(&config.geraete_argumente)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let ausgabe = tokio::time::timeout(zeitlimit, ausgabe)
        .await
        .map_err(|_| BroadcastError::Zeitlimit(format!("Geraete-Auflistung nach {zeitlimit:?}")))?
        .map_err(|e| BroadcastError::Geraeteliste(format!("{}: {e}", config.geraete_programm)))?;

    let zeilen: Vec<String> = String::from_utf8_lossy(&ausgabe.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&ausgabe.stderr).lines())
        .map(str::trim)
        .filter(|zeile| !zeile.is_empty())
        .map(String::from)
        .collect();

    if zeilen.is_empty() && !ausgabe.status.success() {
        return Err(BroadcastError::Geraeteliste(format!(
            "{} beendet mit {}",
            config.geraete_programm, ausgabe.status
        )));
    }

    tracing::debug!(anzahl = zeilen.len(), "Geraete aufgelistet");
    Ok(zeilen)
}

/// Diagnose-Lauf nach einem fehlgeschlagenen Start: loggt jede Zeile
pub(crate) async fn diagnose_loggen(config: &EncoderConfig, zeitlimit: Duration) {
    match list_devices(config, zeitlimit).await {
        Ok(zeilen) if zeilen.is_empty() => {
            tracing::warn!("Geraete-Diagnose: keine Quellen gefunden");
        }
        Ok(zeilen) => {
            tracing::warn!(anzahl = zeilen.len(), "Geraete-Diagnose: verfuegbare Quellen");
            for zeile in zeilen {
                tracing::warn!(quelle = %zeile, "Geraete-Diagnose");
            }
        }
        Err(e) => tracing::warn!(fehler = %e, "Geraete-Diagnose fehlgeschlagen"),
    }
}
