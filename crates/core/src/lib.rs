//! roomcast-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von der Broadcast-Engine,
//! der Observability-Schicht und dem Server gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, RoomcastError};
pub use event::BroadcastEvent;
pub use types::ConsumerId;
