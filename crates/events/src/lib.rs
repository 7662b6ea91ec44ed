//! Change events and their distribution.
//!
//! Aggregates record events while they are mutated; once the surrounding
//! transaction commits, the application layer wraps them in an
//! [`EventEnvelope`] and publishes them on an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
