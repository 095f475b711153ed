use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medledger_auth::Role;
use medledger_core::{AccountId, ConsentHash, LedgerId, PatientRef, ProcedureId};
use medledger_events::Event;

use crate::model::LedgerPolicy;

/// Event: LedgerInitialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInitialized {
    pub ledger_id: LedgerId,
    pub deployer: AccountId,
    pub policy: LedgerPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PatientRegistered (first procedure for a patient reference).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRegistered {
    pub patient_ref: PatientRef,
    pub first_procedure: ProcedureId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProcedureRecorded.
///
/// Carries the full record so the ledger can be rebuilt from the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureRecorded {
    pub procedure_id: ProcedureId,
    pub patient_ref: PatientRef,
    pub practitioner: AccountId,
    pub procedure_type: String,
    pub duration_minutes: u32,
    pub consent_hash: ConsentHash,
    pub metadata: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ConsentUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentUpdated {
    pub procedure_id: ProcedureId,
    pub consent_hash: ConsentHash,
    pub updated_by: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProcedureDeactivated (logical delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureDeactivated {
    pub procedure_id: ProcedureId,
    pub deactivated_by: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RoleGranted / RoleRevoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanged {
    pub role: Role,
    pub account: AccountId,
    pub sender: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Paused / Unpaused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseChanged {
    pub account: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Ledger notification. Every committed state change is exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    LedgerInitialized(LedgerInitialized),
    PatientRegistered(PatientRegistered),
    ProcedureRecorded(ProcedureRecorded),
    ConsentUpdated(ConsentUpdated),
    ProcedureDeactivated(ProcedureDeactivated),
    RoleGranted(RoleChanged),
    RoleRevoked(RoleChanged),
    Paused(PauseChanged),
    Unpaused(PauseChanged),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerInitialized(_) => "medledger.ledger.initialized",
            LedgerEvent::PatientRegistered(_) => "medledger.patient.registered",
            LedgerEvent::ProcedureRecorded(_) => "medledger.procedure.recorded",
            LedgerEvent::ConsentUpdated(_) => "medledger.procedure.consent_updated",
            LedgerEvent::ProcedureDeactivated(_) => "medledger.procedure.deactivated",
            LedgerEvent::RoleGranted(_) => "medledger.role.granted",
            LedgerEvent::RoleRevoked(_) => "medledger.role.revoked",
            LedgerEvent::Paused(_) => "medledger.ledger.paused",
            LedgerEvent::Unpaused(_) => "medledger.ledger.unpaused",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::LedgerInitialized(e) => e.occurred_at,
            LedgerEvent::PatientRegistered(e) => e.occurred_at,
            LedgerEvent::ProcedureRecorded(e) => e.occurred_at,
            LedgerEvent::ConsentUpdated(e) => e.occurred_at,
            LedgerEvent::ProcedureDeactivated(e) => e.occurred_at,
            LedgerEvent::RoleGranted(e) | LedgerEvent::RoleRevoked(e) => e.occurred_at,
            LedgerEvent::Paused(e) | LedgerEvent::Unpaused(e) => e.occurred_at,
        }
    }
}
