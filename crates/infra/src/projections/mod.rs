//! Projection implementations (read model builders).
//!
//! Projections consume published ledger events and are rebuildable from the
//! journal at any time.

pub mod stats;

pub use stats::{ProcedureStats, ProcedureStatsProjection, decode_envelope};
