//! `medledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the error taxonomy, the aggregate contract, and the strongly-typed
//! identifiers and digests every ledger operation is expressed in.

pub mod aggregate;
pub mod digest;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use digest::{ConsentHash, PatientRef, DIGEST_LEN};
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, LedgerId, ProcedureId};
