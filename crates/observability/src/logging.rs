//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigurationsdatei):
//! - `RC_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `roomcast_broadcast=debug`)
//! - `RC_LOG_FORMAT`: Format (text/json), Standard: text

use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "RC_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "RC_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// Eine JSON-Zeile pro Ereignis, mit Thread-ID und aktuellem Span
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            anderes => Err(format!("Unbekanntes Log-Format: {anderes}")),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `RC_LOG_LEVEL` und `RC_LOG_FORMAT` haben Vorrang vor den Argumenten.
/// Ungueltige Werte fallen auf `info` / `text` zurueck. Ein zweiter Aufruf
/// (z.B. in Tests) ist wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = filter_aufloesen(std::env::var(ENV_LOG_LEVEL).ok().as_deref(), level);
    let format = format_aufloesen(std::env::var(ENV_LOG_FORMAT).ok().as_deref(), format);

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging war bereits initialisiert");
    }
}

/// Bestimmt den Filter: Umgebung vor Konfiguration vor `info`
pub fn filter_aufloesen(env_wert: Option<&str>, level: &str) -> EnvFilter {
    env_wert
        .and_then(|wert| EnvFilter::try_new(wert).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Bestimmt das Format: Umgebung vor Konfiguration vor Text
pub fn format_aufloesen(env_wert: Option<&str>, format: &str) -> LogFormat {
    env_wert
        .and_then(|wert| wert.parse().ok())
        .or_else(|| format.parse().ok())
        .unwrap_or_default()
}

/// Validiert ob ein einfacher Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}
