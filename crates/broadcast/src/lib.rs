//! roomcast-broadcast – Live-Broadcast-Engine
//!
//! Verteilt einen kontinuierlichen Encoder-Stream an beliebig viele,
//! unabhaengig schnelle Consumer:
//!
//! ```text
//! Encoder -> Capture -> Sequencer -> Intake -> Dispatcher -> Consumer-Queues -> Transport
//!                          |                                       ^
//!                          v                                       |
//!                    Retransmit-Buffer                     Heartbeat-Monitor
//! ```
//!
//! Jede Queue ist begrenzt und verdraengt bei Ueberlauf den aeltesten
//! Eintrag. Kein Consumer kann einen anderen oder den Capture aufhalten.

pub mod capture;
pub mod chunk;
pub mod dispatcher;
pub mod drain;
pub mod engine;
pub mod error;
pub mod format;
pub mod heartbeat;
pub mod profile;
pub mod queue;
pub mod registry;
pub mod retransmit;
pub mod sequencer;
pub mod stats;
pub mod supervisor;

pub use capture::{CaptureConfig, EncoderConfig};
pub use chunk::{Chunk, QueueEintrag, KEEPALIVE_SEQUENZ};
pub use drain::ConsumerDrain;
pub use engine::{BroadcastConfig, BroadcastEngine};
pub use error::{BroadcastError, BroadcastResult};
pub use format::AudioFormat;
pub use profile::{profil_aufloesen, DeliveryProfile};
pub use queue::ConsumerQueue;
pub use registry::{ClientRegistry, ConsumerSession, ConsumerState};
pub use stats::{ConsumerStats, StatsSnapshot};
