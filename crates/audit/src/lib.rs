//! Offline journal audit.
//!
//! Replays a JSON-lines journal into a fresh ledger, re-checks every derived
//! index against the procedure table and rebuilds the statistics read model.

use std::path::Path;

use anyhow::{Context, ensure};
use serde::Serialize;

use medledger_auth::Role;
use medledger_core::{AccountId, AggregateRoot, LedgerId};
use medledger_events::ProjectionRunner;
use medledger_infra::journal::{EventJournal, FileJournal};
use medledger_infra::projections::{ProcedureStats, ProcedureStatsProjection, decode_envelope};
use medledger_infra::service::replay;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub ledger_id: LedgerId,
    pub version: u64,
    pub total_procedures: u64,
    pub paused: bool,
    pub administrators: Vec<AccountId>,
    pub practitioners: Vec<AccountId>,
    pub stats: ProcedureStats,
}

pub fn audit_journal(path: &Path) -> anyhow::Result<AuditReport> {
    ensure!(path.is_file(), "journal {} does not exist", path.display());

    let journal = FileJournal::open(path)
        .with_context(|| format!("failed to open journal {}", path.display()))?;
    let history = journal.load()?;
    tracing::debug!(events = history.len(), "journal loaded");

    let ledger = replay(&history).context("journal replay failed")?;
    ledger
        .check_consistency()
        .context("replayed ledger is inconsistent")?;

    let envelopes = history
        .iter()
        .map(|stored| {
            decode_envelope(&stored.to_envelope())
                .with_context(|| format!("event {} is undecodable", stored.sequence_number))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut runner =
        ProjectionRunner::new_for_ledger(ledger.id_typed(), ProcedureStatsProjection::new());
    runner.run(&envelopes).context("statistics rebuild failed")?;

    let stats = runner.into_projection().stats().clone();
    ensure!(
        stats.total_procedures == ledger.total_procedures(),
        "statistics count {} disagrees with ledger count {}",
        stats.total_procedures,
        ledger.total_procedures()
    );

    Ok(AuditReport {
        ledger_id: ledger.id_typed(),
        version: ledger.version(),
        total_procedures: ledger.total_procedures(),
        paused: ledger.is_paused(),
        administrators: ledger.roles().members(Role::Administrator).copied().collect(),
        practitioners: ledger.roles().members(Role::Practitioner).copied().collect(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use medledger_core::{ConsentHash, DIGEST_LEN, PatientRef, ProcedureId};
    use medledger_events::{EventEnvelope, InMemoryEventBus};
    use medledger_infra::{LedgerService, NewProcedure, SystemClock};
    use medledger_procedures::LedgerPolicy;

    fn write_ledger(path: &Path) -> AccountId {
        let admin = AccountId::new();
        let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
            Arc::new(InMemoryEventBus::new());
        let (svc, _) = LedgerService::bootstrap(
            FileJournal::open(path).unwrap(),
            bus,
            Arc::new(SystemClock),
            admin,
            LedgerPolicy::interventional_radiology(),
        )
        .unwrap();

        for (tag, kind) in [(1u8, "stent"), (2, "stent"), (1, "drainage")] {
            svc.record_procedure(
                admin,
                NewProcedure {
                    patient_ref: PatientRef::from_bytes([tag; DIGEST_LEN]),
                    procedure_type: kind.to_string(),
                    duration_minutes: 40,
                    consent_hash: ConsentHash::from_bytes([9; DIGEST_LEN]),
                    metadata: String::new(),
                },
            )
            .unwrap();
        }
        svc.delete_procedure(admin, ProcedureId::new(2)).unwrap();
        admin
    }

    #[test]
    fn reports_replayed_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let admin = write_ledger(&path);

        let report = audit_journal(&path).unwrap();
        assert_eq!(report.total_procedures, 3);
        assert_eq!(report.administrators, vec![admin]);
        assert_eq!(report.practitioners, vec![admin]);
        assert!(!report.paused);
        assert_eq!(report.stats.active_procedures, 2);
        assert_eq!(report.stats.unique_patients, 2);
        assert_eq!(report.stats.by_practitioner.get(&admin), Some(&3));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["by_type"]["stent"], 2);
    }

    #[test]
    fn corrupt_journal_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        write_ledger(&path);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"sequence_number\": 1}}").unwrap();

        assert!(audit_journal(&path).is_err());
    }

    #[test]
    fn missing_journal_fails_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.jsonl");
        assert!(audit_journal(&path).is_err());
        assert!(!path.exists());
    }
}
