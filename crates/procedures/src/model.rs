use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medledger_core::{AccountId, ConsentHash, DomainError, PatientRef, ProcedureId};

/// Upper bound on a procedure's duration unless configured otherwise (24h).
pub const DEFAULT_MAX_DURATION_MINUTES: u32 = 1440;

/// A recorded medical procedure.
///
/// Immutable once written except for `consent_hash` (creator only) and `active`
/// (administrator only, true → false).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: ProcedureId,
    pub patient_ref: PatientRef,
    /// Account that recorded the procedure.
    pub practitioner: AccountId,
    pub procedure_type: String,
    pub duration_minutes: u32,
    pub recorded_at: DateTime<Utc>,
    pub consent_hash: ConsentHash,
    pub active: bool,
    /// Opaque blob, usually a serialized clinical-claim payload.
    pub metadata: String,
}

/// Per-patient summary, created lazily by the first procedure that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_ref: PatientRef,
    pub first_procedure: ProcedureId,
    pub last_procedure: ProcedureId,
    /// Includes soft-deleted procedures.
    pub total_procedures: u64,
}

/// Rules fixed when the ledger is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub max_duration_minutes: u32,
    /// Accepted procedure labels; `None` accepts any non-empty label.
    pub procedure_types: Option<BTreeSet<String>>,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_duration_minutes: DEFAULT_MAX_DURATION_MINUTES,
            procedure_types: None,
        }
    }
}

impl LedgerPolicy {
    pub fn with_max_duration(mut self, minutes: u32) -> Self {
        self.max_duration_minutes = minutes;
        self
    }

    pub fn with_procedure_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.procedure_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Interventional radiology procedures supported by the clinical front end.
    pub fn interventional_radiology() -> Self {
        Self::default().with_procedure_types([
            "embolisation",
            "ponction",
            "stent",
            "angioplastie",
            "biopsie",
            "drainage",
            "ablation",
            "radiofréquence",
            "cryothérapie",
            "chimioembolisation",
        ])
    }

    pub(crate) fn validate(&self) -> Result<(), DomainError> {
        if self.max_duration_minutes == 0 {
            return Err(DomainError::validation("max duration must be positive"));
        }
        if let Some(types) = &self.procedure_types {
            if types.iter().any(|t| t.trim().is_empty()) {
                return Err(DomainError::validation("procedure catalog contains an empty label"));
            }
        }
        Ok(())
    }

    pub(crate) fn check_procedure_type(&self, procedure_type: &str) -> Result<(), DomainError> {
        if procedure_type.trim().is_empty() {
            return Err(DomainError::validation("procedure type cannot be empty"));
        }
        match &self.procedure_types {
            Some(types) if !types.contains(procedure_type) => Err(DomainError::validation(format!(
                "unsupported procedure type '{procedure_type}'"
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_duration(&self, minutes: u32) -> Result<(), DomainError> {
        if minutes == 0 {
            return Err(DomainError::validation("duration must be positive"));
        }
        if minutes > self.max_duration_minutes {
            return Err(DomainError::validation(format!(
                "duration {minutes} exceeds the {} minute limit",
                self.max_duration_minutes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds_are_inclusive() {
        let policy = LedgerPolicy::default().with_max_duration(90);
        assert!(policy.check_duration(1).is_ok());
        assert!(policy.check_duration(90).is_ok());
        assert!(policy.check_duration(0).is_err());
        assert!(policy.check_duration(91).is_err());
    }

    #[test]
    fn catalog_restricts_labels() {
        let open = LedgerPolicy::default();
        assert!(open.check_procedure_type("anything").is_ok());
        assert!(open.check_procedure_type("   ").is_err());

        let catalog = LedgerPolicy::interventional_radiology();
        assert!(catalog.check_procedure_type("stent").is_ok());
        assert!(matches!(
            catalog.check_procedure_type("appendectomy"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn zero_limit_policy_is_invalid() {
        assert!(LedgerPolicy::default().with_max_duration(0).validate().is_err());
        assert!(
            LedgerPolicy::default()
                .with_procedure_types(["stent", ""])
                .validate()
                .is_err()
        );
    }
}
