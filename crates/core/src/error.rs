//! Fehlertypen fuer roomcast
//!
//! Zentraler Fehler-Enum fuer alles, was Crate-Grenzen ueberschreitet.
//! Die Engine definiert eigene Fehler und konvertiert via `From`.

use thiserror::Error;

/// Globaler Result-Alias fuer roomcast
pub type Result<T> = std::result::Result<T, RoomcastError>;

/// Alle moeglichen Fehler im roomcast-System
#[derive(Debug, Error)]
pub enum RoomcastError {
    // --- Capture & Encoder ---
    #[error("Encoder konnte nicht gestartet werden: {0}")]
    EncoderStart(String),

    #[error("Encoder beendet: {0}")]
    EncoderBeendet(String),

    #[error("Audio-Geraet nicht verfuegbar: {0}")]
    GeraetNichtVerfuegbar(String),

    #[error("Formatkonflikt: aktiv={aktiv}, angefordert={angefordert}")]
    Formatkonflikt { aktiv: String, angefordert: String },

    #[error("Unbekanntes Audioformat: {0}")]
    UnbekanntesFormat(String),

    // --- Consumer ---
    #[error("Consumer nicht gefunden: {0}")]
    ConsumerNichtGefunden(String),

    // --- Zeit ---
    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl RoomcastError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Aufrufer den Fehler selbst beheben kann
    ///
    /// Ein Formatkonflikt verschwindet z.B. sobald alle Consumer getrennt sind.
    pub fn ist_korrigierbar(&self) -> bool {
        matches!(
            self,
            Self::Formatkonflikt { .. } | Self::UnbekanntesFormat(_) | Self::Konfiguration(_)
        )
    }
}
