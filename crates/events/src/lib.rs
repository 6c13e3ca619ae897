//! Domain events, envelopes and the publish/subscribe seam.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, StreamRef};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
