use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use medledger_core::{ExpectedVersion, LedgerId};
use medledger_events::EventEnvelope;

/// An event ready to be appended (not yet assigned a sequence number).
///
/// Build one with [`UncommittedEvent::from_typed`], which serializes the typed
/// event to JSON and captures the metadata needed to decode it again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub ledger_id: LedgerId,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A journaled event.
///
/// Sequence numbers start at 1, increase by exactly one per event and never
/// change once assigned. The sequence number of the last event is the ledger
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub ledger_id: LedgerId,

    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    /// Convert into an envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.ledger_id,
            self.event_type.clone(),
            self.sequence_number,
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

impl UncommittedEvent {
    pub fn from_typed<E>(
        ledger_id: LedgerId,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, JournalError>
    where
        E: medledger_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)?;

        Ok(Self {
            event_id,
            ledger_id,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Journal operation error.
///
/// Infrastructure failures only; domain rejections never reach the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("journal io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("journal corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

/// Append-only, single-ledger event journal.
///
/// `append` must:
/// - reject the batch unless `expected_version` matches the current version
/// - reject events for a different ledger than the one already journaled
/// - assign sequence numbers `current + 1 ..`
/// - persist the batch entirely or not at all
pub trait EventJournal: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, JournalError>;

    /// Load every event in sequence order.
    fn load(&self) -> Result<Vec<StoredEvent>, JournalError>;
}

impl<J> EventJournal for Arc<J>
where
    J: EventJournal + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, JournalError> {
        (**self).append(events, expected_version)
    }

    fn load(&self) -> Result<Vec<StoredEvent>, JournalError> {
        (**self).load()
    }
}

/// Validate a batch against the journal head and assign sequence numbers.
///
/// Shared by every backend so they agree on append semantics.
pub(crate) fn sequence_batch(
    head: Option<&StoredEvent>,
    events: Vec<UncommittedEvent>,
    expected_version: ExpectedVersion,
) -> Result<Vec<StoredEvent>, JournalError> {
    let current = head.map(|e| e.sequence_number).unwrap_or(0);
    if !expected_version.matches(current) {
        return Err(JournalError::Concurrency(format!(
            "expected {expected_version:?}, found {current}"
        )));
    }

    let ledger_id = match (head, events.first()) {
        (Some(h), _) => h.ledger_id,
        (None, Some(first)) => first.ledger_id,
        (None, None) => return Ok(vec![]),
    };

    let mut next = current;
    let mut committed = Vec::with_capacity(events.len());
    for (idx, e) in events.into_iter().enumerate() {
        if e.ledger_id != ledger_id {
            return Err(JournalError::InvalidAppend(format!(
                "event at index {idx} targets ledger {}, journal holds {ledger_id}",
                e.ledger_id
            )));
        }
        next = next
            .checked_add(1)
            .ok_or_else(|| JournalError::InvalidAppend("sequence number overflow".to_string()))?;
        committed.push(StoredEvent {
            event_id: e.event_id,
            ledger_id: e.ledger_id,
            sequence_number: next,
            event_type: e.event_type,
            event_version: e.event_version,
            occurred_at: e.occurred_at,
            payload: e.payload,
        });
    }
    Ok(committed)
}

/// Check that a loaded stream is gapless from 1 and belongs to a single ledger.
///
/// `line` in the error is the 1-based position of the offending event.
pub(crate) fn validate_stream(stream: &[StoredEvent]) -> Result<(), JournalError> {
    let ledger_id = stream.first().map(|e| e.ledger_id);
    for (idx, (expected, e)) in (1u64..).zip(stream).enumerate() {
        if Some(e.ledger_id) != ledger_id {
            return Err(JournalError::Corrupt {
                line: idx + 1,
                reason: format!("event belongs to foreign ledger {}", e.ledger_id),
            });
        }
        if e.sequence_number != expected {
            return Err(JournalError::Corrupt {
                line: idx + 1,
                reason: format!(
                    "non-monotonic sequence_number (expected {expected}, found {})",
                    e.sequence_number
                ),
            });
        }
    }
    Ok(())
}
