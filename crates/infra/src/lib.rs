//! Infrastructure layer: journal, single-writer service, config, clock, read models.

pub mod clock;
pub mod config;
pub mod journal;
pub mod projections;
pub mod service;

#[cfg(test)]
mod integration_tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, LedgerConfig};
pub use journal::{EventJournal, FileJournal, InMemoryJournal, JournalError, StoredEvent};
pub use projections::{ProcedureStats, ProcedureStatsProjection};
pub use service::{ErrorKind, LedgerError, LedgerService, NewProcedure, Receipt};
