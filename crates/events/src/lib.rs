//! `medledger-events`: event mechanics (no domain rules).
//!
//! Ledger notifications are modelled as events: the aggregate returns them from
//! `handle`, the service journals and publishes them, and subscribers (claim
//! generators, audit logs, read models) consume them over an `EventBus`.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
