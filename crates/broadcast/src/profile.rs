//! Delivery-Profile – Tuning-Parameter pro Consumer-Klasse
//!
//! Ein Profil wird genau einmal bei der Registrierung aus einem Label
//! bestimmt (z.B. einem erkannten User-Agent) und gilt fuer die gesamte
//! Lebensdauer des Consumers. Unbekannte Labels fallen auf
//! [`STANDARD`] zurueck.

use serde::Serialize;
use std::time::Duration;

/// Obergrenze fuer redundante Einfuegungen pro Chunk und Consumer
pub const MAX_REDUNDANZ: u32 = 4;

/// Sofortige Wiederholungen bei Profilen ohne Redundanz
pub const ZUSTELL_WIEDERHOLUNGEN: u32 = 3;

/// Unveraenderliches Delivery-Profil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryProfile {
    /// Profilname (auch Label fuer Statistik und Logs)
    pub name: &'static str,
    /// Maximale Anzahl Eintraege in der Consumer-Queue
    pub queue_capacity: usize,
    /// Bytes pro Schreibblock auf der Transportseite
    pub read_chunk_size: usize,
    /// Abstand zwischen zwei Keepalive-Eintraegen
    pub heartbeat_interval: Duration,
    /// Ohne Eintrag in dieser Zeit wird der Consumer entfernt
    pub idle_timeout: Duration,
    /// Wie oft jeder Chunk eingereiht wird (1 = keine Duplikate)
    pub redundancy: u32,
}

impl DeliveryProfile {
    /// Effektive Redundanz, begrenzt auf [`MAX_REDUNDANZ`]
    pub fn effektive_redundanz(&self) -> u32 {
        self.redundancy.clamp(1, MAX_REDUNDANZ)
    }
}

/// Standardprofil fuer unbekannte Clients
pub const STANDARD: DeliveryProfile = DeliveryProfile {
    name: "standard",
    queue_capacity: 32,
    read_chunk_size: 4096,
    heartbeat_interval: Duration::from_secs(2),
    idle_timeout: Duration::from_secs(30),
    redundancy: 1,
};

/// Desktop-Browser (Chrome, Firefox, Edge): puffern selbst grosszuegig
pub const DESKTOP: DeliveryProfile = DeliveryProfile {
    name: "desktop",
    queue_capacity: 64,
    read_chunk_size: 8192,
    heartbeat_interval: Duration::from_secs(5),
    idle_timeout: Duration::from_secs(60),
    redundancy: 1,
};

/// Mobile Browser: verlustbehaftete Funkstrecke, kurze Transport-Timeouts
pub const MOBIL: DeliveryProfile = DeliveryProfile {
    name: "mobil",
    queue_capacity: 128,
    read_chunk_size: 4096,
    heartbeat_interval: Duration::from_secs(1),
    idle_timeout: Duration::from_secs(20),
    redundancy: 2,
};

/// Streaming-Empfaenger (Chromecast, Sonos, VLC, mpv): grosse Puffer
pub const EMPFAENGER: DeliveryProfile = DeliveryProfile {
    name: "empfaenger",
    queue_capacity: 256,
    read_chunk_size: 16384,
    heartbeat_interval: Duration::from_secs(10),
    idle_timeout: Duration::from_secs(120),
    redundancy: 1,
};

/// Alle bekannten Profile
pub const ALLE_PROFILE: [DeliveryProfile; 4] = [STANDARD, DESKTOP, MOBIL, EMPFAENGER];

/// User-Agent-Fragmente -> Profil (erste Uebereinstimmung gewinnt)
///
/// Mobile Kennungen stehen vor den Desktop-Kennungen, weil mobile
/// User-Agents meist auch "Chrome" oder "Safari" enthalten.
const ERKENNUNG: &[(&str, DeliveryProfile)] = &[
    ("crkey", EMPFAENGER),
    ("chromecast", EMPFAENGER),
    ("sonos", EMPFAENGER),
    ("vlc", EMPFAENGER),
    ("mpv", EMPFAENGER),
    ("lavf", EMPFAENGER),
    ("iphone", MOBIL),
    ("ipad", MOBIL),
    ("android", MOBIL),
    ("mobile", MOBIL),
    ("firefox", DESKTOP),
    ("edg/", DESKTOP),
    ("chrome", DESKTOP),
    ("safari", DESKTOP),
];

/// Bestimmt das Profil fuer ein Label
///
/// Zuerst exakter Profilname (Gross-/Kleinschreibung egal), dann
/// User-Agent-Erkennung, sonst [`STANDARD`].
pub fn profil_aufloesen(label: &str) -> DeliveryProfile {
    let label = label.trim().to_ascii_lowercase();
    if label.is_empty() {
        return STANDARD;
    }

    if let Some(profil) = ALLE_PROFILE.iter().find(|p| p.name == label) {
        return *profil;
    }

    ERKENNUNG
        .iter()
        .find(|(fragment, _)| label.contains(fragment))
        .map(|(_, profil)| *profil)
        .unwrap_or(STANDARD)
}
