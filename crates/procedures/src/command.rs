use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medledger_auth::Role;
use medledger_core::{AccountId, ConsentHash, LedgerId, PatientRef, ProcedureId};

use crate::model::LedgerPolicy;

/// Command: Initialize (bootstrap the ledger with its first administrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initialize {
    pub ledger_id: LedgerId,
    pub deployer: AccountId,
    pub policy: LedgerPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordProcedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordProcedure {
    pub caller: AccountId,
    pub patient_ref: PatientRef,
    pub procedure_type: String,
    pub duration_minutes: u32,
    pub consent_hash: ConsentHash,
    pub metadata: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateConsent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConsent {
    pub caller: AccountId,
    pub procedure_id: ProcedureId,
    pub consent_hash: ConsentHash,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteProcedure (logical delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProcedure {
    pub caller: AccountId,
    pub procedure_id: ProcedureId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: GrantRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRole {
    pub caller: AccountId,
    pub account: AccountId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevokeRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRole {
    pub caller: AccountId,
    pub account: AccountId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Pause or Unpause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPaused {
    pub caller: AccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Initialize(Initialize),
    RecordProcedure(RecordProcedure),
    UpdateConsent(UpdateConsent),
    DeleteProcedure(DeleteProcedure),
    GrantRole(GrantRole),
    RevokeRole(RevokeRole),
    Pause(SetPaused),
    Unpause(SetPaused),
}

impl LedgerCommand {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::Initialize(_) => "initialize",
            LedgerCommand::RecordProcedure(_) => "record_procedure",
            LedgerCommand::UpdateConsent(_) => "update_consent",
            LedgerCommand::DeleteProcedure(_) => "delete_procedure",
            LedgerCommand::GrantRole(_) => "grant_role",
            LedgerCommand::RevokeRole(_) => "revoke_role",
            LedgerCommand::Pause(_) => "pause",
            LedgerCommand::Unpause(_) => "unpause",
        }
    }
}
