use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: they can be dropped and rebuilt by replaying the
/// journal at any time, because events are the source of truth. Storage of the
/// read model is up to the implementation.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// Must not fail: events that are irrelevant to the read model are ignored.
    /// Sequencing and duplicate detection are handled by `ProjectionRunner`.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
