//! JSON-lines journal: one serialized `StoredEvent` per line.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use medledger_core::ExpectedVersion;

use super::r#trait::{
    EventJournal, JournalError, StoredEvent, UncommittedEvent, sequence_batch, validate_stream,
};

/// File-backed journal.
///
/// Every append is written as a single buffer and flushed to disk before it
/// returns. A failed write is truncated back to the previous length, so the
/// file only ever holds whole batches. If that truncation fails too, the
/// journal is poisoned and refuses further appends and loads until reopened.
/// Opening an existing file validates it; a corrupt file is refused.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    inner: Mutex<Writer>,
}

#[derive(Debug)]
struct Writer {
    file: File,
    head: Option<StoredEvent>,
    poisoned: bool,
}

impl Writer {
    fn ensure_usable(&self) -> Result<(), JournalError> {
        if self.poisoned {
            return Err(JournalError::InvalidAppend(
                "journal poisoned by a failed rollback; reopen it".to_string(),
            ));
        }
        Ok(())
    }
}

impl FileJournal {
    /// Open (or create) the journal at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let existing = read_events(&path)?;

        tracing::debug!(path = %path.display(), events = existing.len(), "journal opened");

        Ok(Self {
            path,
            inner: Mutex::new(Writer {
                file,
                head: existing.last().cloned(),
                poisoned: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Writer>, JournalError> {
        self.inner
            .lock()
            .map_err(|_| JournalError::InvalidAppend("lock poisoned".to_string()))
    }

    /// Append through `write`, undoing whatever it left behind on failure.
    fn append_with<F>(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
        write: F,
    ) -> Result<Vec<StoredEvent>, JournalError>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut writer = self.lock()?;
        writer.ensure_usable()?;

        let committed = sequence_batch(writer.head.as_ref(), events, expected_version)?;

        let mut buf = Vec::new();
        for e in &committed {
            serde_json::to_writer(&mut buf, e)?;
            buf.push(b'\n');
        }

        let committed_len = writer.file.metadata()?.len();
        if let Err(err) = write(&mut writer.file, &buf) {
            match rollback(&writer.file, committed_len) {
                Ok(()) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "journal write failed; truncated to last committed batch"
                    );
                }
                Err(rollback_err) => {
                    writer.poisoned = true;
                    tracing::error!(
                        path = %self.path.display(),
                        error = %err,
                        rollback_error = %rollback_err,
                        "journal write failed and could not be rolled back"
                    );
                }
            }
            return Err(err.into());
        }

        writer.head = committed.last().cloned();
        Ok(committed)
    }
}

impl EventJournal for FileJournal {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, JournalError> {
        self.append_with(events, expected_version, write_durably)
    }

    fn load(&self) -> Result<Vec<StoredEvent>, JournalError> {
        // Hold the writer lock so a concurrent append is never half-read.
        let writer = self.lock()?;
        writer.ensure_usable()?;
        read_events(&self.path)
    }
}

fn write_durably(file: &mut File, buf: &[u8]) -> io::Result<()> {
    file.write_all(buf)?;
    file.flush()?;
    file.sync_data()
}

fn rollback(file: &File, len: u64) -> io::Result<()> {
    file.set_len(len)?;
    file.sync_data()
}

fn read_events(path: &Path) -> Result<Vec<StoredEvent>, JournalError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: StoredEvent = serde_json::from_str(&line).map_err(|e| JournalError::Corrupt {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        events.push(event);
    }
    validate_stream(&events)?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use medledger_core::LedgerId;
    use uuid::Uuid;

    fn event(ledger_id: LedgerId, n: u64) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            ledger_id,
            event_type: "medledger.ledger.paused".to_string(),
            event_version: 1,
            occurred_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            payload: serde_json::json!({ "n": n }),
        }
    }

    #[test]
    fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = LedgerId::new();

        {
            let journal = FileJournal::open(&path).unwrap();
            journal
                .append(vec![event(ledger, 1), event(ledger, 2)], ExpectedVersion::Exact(0))
                .unwrap();
            journal
                .append(vec![event(ledger, 3)], ExpectedVersion::Exact(2))
                .unwrap();
        }

        let reopened = FileJournal::open(&path).unwrap();
        let events = reopened.load().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].sequence_number, 3);
        assert_eq!(events[2].payload["n"], 3);

        // The head is restored too, so a stale writer is still rejected.
        assert!(matches!(
            reopened.append(vec![event(ledger, 4)], ExpectedVersion::Exact(1)),
            Err(JournalError::Concurrency(_))
        ));
    }

    /// Writes the first half of the batch, then fails like a full disk.
    fn torn_write(file: &mut File, buf: &[u8]) -> io::Result<()> {
        file.write_all(&buf[..buf.len() / 2])?;
        Err(io::Error::new(io::ErrorKind::StorageFull, "no space left on device"))
    }

    #[test]
    fn torn_write_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = LedgerId::new();

        let journal = FileJournal::open(&path).unwrap();
        journal
            .append(vec![event(ledger, 1), event(ledger, 2)], ExpectedVersion::Exact(0))
            .unwrap();
        let committed_len = std::fs::metadata(&path).unwrap().len();

        let err = journal
            .append_with(
                vec![event(ledger, 3), event(ledger, 4)],
                ExpectedVersion::Exact(2),
                torn_write,
            )
            .unwrap_err();
        assert!(matches!(err, JournalError::Io(_)));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_len);

        // The same handle retries with the next sequence number.
        let retried = journal
            .append(vec![event(ledger, 3)], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(retried[0].sequence_number, 3);
        drop(journal);

        let reopened = FileJournal::open(&path).unwrap();
        let events = reopened.load().unwrap();
        assert_eq!(
            events.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(events[2].payload["n"], 3);
    }

    #[test]
    fn poisoned_journal_refuses_appends_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = LedgerId::new();

        let journal = FileJournal::open(&path).unwrap();
        journal.append(vec![event(ledger, 1)], ExpectedVersion::Any).unwrap();
        journal.lock().unwrap().poisoned = true;

        assert!(matches!(
            journal.append(vec![event(ledger, 2)], ExpectedVersion::Exact(1)),
            Err(JournalError::InvalidAppend(_))
        ));
        assert!(journal.load().is_err());
        drop(journal);

        // Reopening re-reads the file and clears the flag.
        assert_eq!(FileJournal::open(&path).unwrap().load().unwrap().len(), 1);
    }

    #[test]
    fn garbage_line_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = LedgerId::new();

        let journal = FileJournal::open(&path).unwrap();
        journal.append(vec![event(ledger, 1)], ExpectedVersion::Any).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        match FileJournal::open(&path) {
            Err(JournalError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt journal, got {other:?}"),
        }
    }
}
