//! Procedure statistics read model.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value as JsonValue;

use medledger_core::{AccountId, PatientRef};
use medledger_events::{EventEnvelope, Projection};
use medledger_procedures::LedgerEvent;

/// Summary figures over every recorded procedure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcedureStats {
    pub total_procedures: u64,
    /// Procedures not soft-deleted.
    pub active_procedures: u64,
    pub by_type: BTreeMap<String, u64>,
    pub unique_patients: u64,
    pub by_practitioner: BTreeMap<AccountId, u64>,
}

/// Builds [`ProcedureStats`] from ledger events. Drive it with a
/// `ProjectionRunner` so redelivered or out-of-order envelopes are caught.
#[derive(Debug, Default)]
pub struct ProcedureStatsProjection {
    stats: ProcedureStats,
    patients: HashSet<PatientRef>,
}

impl ProcedureStatsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ProcedureStats {
        &self.stats
    }
}

impl Projection for ProcedureStatsProjection {
    type Ev = LedgerEvent;

    fn apply(&mut self, envelope: &EventEnvelope<LedgerEvent>) {
        match envelope.payload() {
            LedgerEvent::ProcedureRecorded(e) => {
                self.stats.total_procedures += 1;
                self.stats.active_procedures += 1;
                *self.stats.by_type.entry(e.procedure_type.clone()).or_default() += 1;
                *self.stats.by_practitioner.entry(e.practitioner).or_default() += 1;
                if self.patients.insert(e.patient_ref) {
                    self.stats.unique_patients += 1;
                }
            }
            LedgerEvent::ProcedureDeactivated(_) => {
                self.stats.active_procedures = self.stats.active_procedures.saturating_sub(1);
            }
            _ => {}
        }
    }
}

/// Decode a published JSON envelope into a typed one, keeping its metadata.
pub fn decode_envelope(
    envelope: &EventEnvelope<JsonValue>,
) -> Result<EventEnvelope<LedgerEvent>, serde_json::Error> {
    let event: LedgerEvent = serde_json::from_value(envelope.payload().clone())?;
    Ok(envelope.clone().map(|_| event))
}
