//! Gemeinsame Identifikationstypen fuer roomcast
//!
//! IDs verwenden das Newtype-Pattern, damit eine Consumer-ID nicht mit
//! einer beliebigen UUID verwechselt werden kann.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID eines registrierten Broadcast-Consumers
///
/// Ein Client, der sich neu verbindet, erhaelt immer eine neue ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(pub Uuid);

impl ConsumerId {
    /// Erstellt eine neue zufaellige ConsumerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer:{}", self.0)
    }
}

impl std::str::FromStr for ConsumerId {
    type Err = uuid::Error;

    /// Akzeptiert sowohl `consumer:<uuid>` als auch die nackte UUID
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roh = s.strip_prefix("consumer:").unwrap_or(s);
        Uuid::parse_str(roh).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_id_eindeutig() {
        let a = ConsumerId::new();
        let b = ConsumerId::new();
        assert_ne!(a, b, "Zwei neue ConsumerIds muessen verschieden sein");
    }

    #[test]
    fn consumer_id_display() {
        let id = ConsumerId(Uuid::nil());
        assert!(id.to_string().starts_with("consumer:"));
    }

    #[test]
    fn consumer_id_parsen_mit_und_ohne_praefix() {
        let id = ConsumerId::new();
        let mit: ConsumerId = id.to_string().parse().unwrap();
        let ohne: ConsumerId = id.inner().to_string().parse().unwrap();
        assert_eq!(mit, id);
        assert_eq!(ohne, id);
        assert!("consumer:kaputt".parse::<ConsumerId>().is_err());
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let id = ConsumerId::new();
        let json = serde_json::to_string(&id).unwrap();
        let id2: ConsumerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }
}
