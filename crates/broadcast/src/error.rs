//! Fehlertypen fuer die Broadcast-Engine
//!
//! `start_broadcast` liefert `false` und legt den Grund in der Statistik ab.
//! Fehlerwerte (Formate, Geraeteliste) erreichen den Server als
//! [`RoomcastError`].

use roomcast_core::RoomcastError;
use thiserror::Error;

/// Alle moeglichen Fehler der Broadcast-Engine
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Encoder-Prozess '{programm}' konnte nicht gestartet werden: {grund}")]
    Spawn { programm: String, grund: String },

    #[error("Encoder lieferte innerhalb von {0:?} keine Daten")]
    KeineDaten(std::time::Duration),

    #[error("Encoder-Prozess vorzeitig beendet: {0}")]
    ProzessBeendet(String),

    #[error("Formatkonflikt: aktiv={aktiv}, angefordert={angefordert}")]
    Formatkonflikt { aktiv: String, angefordert: String },

    #[error("Unbekanntes Audioformat: {0}")]
    UnbekanntesFormat(String),

    #[error("Geraete-Auflistung fehlgeschlagen: {0}")]
    Geraeteliste(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type BroadcastResult<T> = Result<T, BroadcastError>;

impl From<BroadcastError> for RoomcastError {
    fn from(err: BroadcastError) -> Self {
        match err {
            BroadcastError::Spawn { programm, grund } => {
                RoomcastError::EncoderStart(format!("{programm}: {grund}"))
            }
            BroadcastError::KeineDaten(_) => RoomcastError::GeraetNichtVerfuegbar(err.to_string()),
            BroadcastError::ProzessBeendet(grund) => RoomcastError::EncoderBeendet(grund),
            BroadcastError::Formatkonflikt { aktiv, angefordert } => {
                RoomcastError::Formatkonflikt { aktiv, angefordert }
            }
            BroadcastError::UnbekanntesFormat(f) => RoomcastError::UnbekanntesFormat(f),
            BroadcastError::Geraeteliste(grund) => RoomcastError::GeraetNichtVerfuegbar(grund),
            BroadcastError::Zeitlimit(s) => RoomcastError::Zeitlimit(s),
            BroadcastError::Anyhow(e) => RoomcastError::Anyhow(e),
            andere => RoomcastError::Intern(andere.to_string()),
        }
    }
}
