//! `medledger-procedures`: the medical procedure ledger domain.
//!
//! A single `MedicalLedger` aggregate owns procedures, patient summaries, the
//! practitioner/patient indices, role grants and the pause flag. Every mutation
//! is a `LedgerCommand` decided by `handle` and applied as `LedgerEvent`s.

pub mod command;
pub mod event;
pub mod ledger;
pub mod model;

pub use command::{
    DeleteProcedure, GrantRole, Initialize, LedgerCommand, RecordProcedure, RevokeRole, SetPaused,
    UpdateConsent,
};
pub use event::{
    ConsentUpdated, LedgerEvent, LedgerInitialized, PatientRegistered, PauseChanged,
    ProcedureDeactivated, ProcedureRecorded, RoleChanged,
};
pub use ledger::MedicalLedger;
pub use model::{DEFAULT_MAX_DURATION_MINUTES, LedgerPolicy, Patient, Procedure};
