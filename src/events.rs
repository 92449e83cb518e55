//! Observation model and the in-process broadcast point that carries it.

/// Broadcast relay delivering every event to every live subscriber.
pub mod event_bus;
/// Observation records and the tagged envelope.
pub mod types;

pub use event_bus::{EventBus, EventSubscription};
pub use types::{AuthAttempt, CommandRecord, Event, EventKind, NetworkEvent, SessionEvent};
