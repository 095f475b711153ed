use std::sync::RwLock;

use medledger_core::ExpectedVersion;

use super::r#trait::{EventJournal, JournalError, StoredEvent, UncommittedEvent, sequence_batch};

/// In-memory append-only journal.
///
/// Intended for tests/dev; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    events: RwLock<Vec<StoredEvent>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventJournal for InMemoryJournal {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, JournalError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut stream = self
            .events
            .write()
            .map_err(|_| JournalError::InvalidAppend("lock poisoned".to_string()))?;

        let committed = sequence_batch(stream.last(), events, expected_version)?;
        stream.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load(&self) -> Result<Vec<StoredEvent>, JournalError> {
        let stream = self
            .events
            .read()
            .map_err(|_| JournalError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(stream.clone())
    }
}
