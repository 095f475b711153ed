//! Append-only event journal.
//!
//! One journal holds the event stream of exactly one ledger. It is the source of
//! truth: `LedgerService::restore` rebuilds the whole ledger from it.

pub mod file;
pub mod in_memory;
pub mod r#trait;

pub use file::FileJournal;
pub use in_memory::InMemoryJournal;
pub use r#trait::{EventJournal, JournalError, StoredEvent, UncommittedEvent};
