//! Integration tests for the full pipeline.
//!
//! Tests: Service → Journal → EventBus → Projection
//!
//! Verifies:
//! - ledger scenarios behave end to end through the service
//! - a file journal restores an identical ledger
//! - journal failures leave state untouched; publish failures do not fail commits
//! - concurrent writers never share an id

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{TimeZone, Utc};
    use serde_json::Value as JsonValue;

    use medledger_core::{
        AccountId, ConsentHash, DIGEST_LEN, DomainError, ExpectedVersion, PatientRef, ProcedureId,
    };
    use medledger_events::{
        EventBus, EventEnvelope, InMemoryEventBus, ProjectionRunner, Subscription,
    };
    use medledger_procedures::{LedgerEvent, LedgerPolicy};

    use crate::clock::{Clock, FixedClock};
    use crate::journal::{
        EventJournal, FileJournal, InMemoryJournal, JournalError, StoredEvent, UncommittedEvent,
    };
    use crate::projections::{ProcedureStatsProjection, decode_envelope};
    use crate::service::{ErrorKind, LedgerError, LedgerService, NewProcedure};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
    }

    fn patient(tag: u8) -> PatientRef {
        PatientRef::from_bytes([tag; DIGEST_LEN])
    }

    fn consent(tag: u8) -> ConsentHash {
        ConsentHash::from_bytes([tag; DIGEST_LEN])
    }

    fn procedure(patient_tag: u8, minutes: u32) -> NewProcedure {
        NewProcedure {
            patient_ref: patient(patient_tag),
            procedure_type: "angioplastie".to_string(),
            duration_minutes: minutes,
            consent_hash: consent(1),
            metadata: "{\"resourceType\":\"Claim\"}".to_string(),
        }
    }

    /// Admin A bootstraps; A grants practitioner to B. The subscription is opened
    /// before bootstrap so it sees every event.
    fn setup<J: EventJournal>(
        journal: J,
    ) -> (LedgerService<J, Bus>, Subscription<EventEnvelope<JsonValue>>, AccountId, AccountId) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let admin = AccountId::new();
        let practitioner = AccountId::new();

        let (svc, _) =
            LedgerService::bootstrap(journal, bus, clock(), admin, LedgerPolicy::default())
                .unwrap();
        svc.add_practitioner(admin, practitioner).unwrap();
        (svc, sub, admin, practitioner)
    }

    #[test]
    fn patient_scenario_end_to_end() {
        let (svc, sub, _, b) = setup(InMemoryJournal::new());

        let first = svc.record_procedure(b, procedure(1, 45)).unwrap();
        assert!(matches!(
            first.events[0].payload(),
            LedgerEvent::PatientRegistered(_)
        ));
        let p = svc.get_patient(&patient(1)).unwrap().unwrap();
        assert_eq!(p.total_procedures, 1);
        assert_eq!(p.first_procedure, first.output);
        assert_eq!(p.last_procedure, first.output);

        let second = svc.record_procedure(b, procedure(1, 30)).unwrap();
        let p = svc.get_patient(&patient(1)).unwrap().unwrap();
        assert_eq!(p.total_procedures, 2);
        assert_eq!(p.first_procedure, first.output);
        assert_eq!(p.last_procedure, second.output);

        assert_eq!(
            svc.get_patient_procedures(&patient(1)).unwrap(),
            vec![first.output, second.output]
        );
        assert_eq!(svc.get_practitioner_history(&b).unwrap().len(), 2);

        // Bus saw the same sequence the journal holds.
        let published: Vec<u64> = sub.drain().iter().map(|e| e.sequence_number()).collect();
        let journaled: Vec<u64> = svc
            .journal()
            .load()
            .unwrap()
            .iter()
            .map(|e| e.sequence_number)
            .collect();
        assert_eq!(published, journaled);
    }

    #[test]
    fn pause_blocks_writes_until_unpaused() {
        let (svc, _sub, a, b) = setup(InMemoryJournal::new());

        let first = svc.record_procedure(b, procedure(1, 20)).unwrap().output;
        svc.pause(a).unwrap();
        assert!(svc.is_paused().unwrap());

        let version = svc.version().unwrap();
        let err = svc.record_procedure(b, procedure(2, 20)).unwrap_err();
        assert!(matches!(err, LedgerError::Domain(DomainError::State(_))));
        assert_eq!(svc.version().unwrap(), version);
        assert_eq!(svc.total_procedures().unwrap(), 1);

        // Consent updates and deletes are gated too.
        assert_eq!(
            svc.update_consent(b, first, consent(2)).unwrap_err().kind(),
            ErrorKind::State
        );
        assert_eq!(svc.delete_procedure(a, first).unwrap_err().kind(), ErrorKind::State);

        svc.unpause(a).unwrap();
        let next = svc.record_procedure(b, procedure(2, 20)).unwrap().output;
        assert_eq!(next, ProcedureId::new(2));
    }

    #[test]
    fn soft_delete_scenario_and_stats() {
        let (svc, sub, a, b) = setup(InMemoryJournal::new());
        for i in 0..7u8 {
            svc.record_procedure(b, procedure(i % 3 + 1, 10)).unwrap();
        }

        let deleted = svc.delete_procedure(a, ProcedureId::new(7)).unwrap();
        assert!(matches!(
            deleted.events[0].payload(),
            LedgerEvent::ProcedureDeactivated(e) if e.procedure_id == ProcedureId::new(7)
        ));
        assert!(!svc.get_procedure(ProcedureId::new(7)).unwrap().active);
        assert!(svc.delete_procedure(a, ProcedureId::new(7)).unwrap().is_noop());
        assert_eq!(
            svc.delete_procedure(a, ProcedureId::new(999)).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let mut runner = ProjectionRunner::new(ProcedureStatsProjection::new());
        for env in sub.drain() {
            runner.apply_idempotent(&decode_envelope(&env).unwrap()).unwrap();
        }
        let stats = runner.projection().stats();
        assert_eq!(stats.total_procedures, 7);
        assert_eq!(stats.active_procedures, 6);
        assert_eq!(stats.unique_patients, 3);
        assert_eq!(stats.by_practitioner.get(&b), Some(&7));
        assert_eq!(stats.by_type.get("angioplastie"), Some(&7));
    }

    #[test]
    fn file_journal_restores_identical_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let (snapshot, b) = {
            let (svc, _sub, a, b) = setup(FileJournal::open(&path).unwrap());
            let id = svc.record_procedure(b, procedure(1, 60)).unwrap().output;
            svc.record_procedure(b, procedure(2, 15)).unwrap();
            svc.update_consent(b, id, consent(7)).unwrap();
            svc.delete_procedure(a, id).unwrap();
            svc.pause(a).unwrap();
            (svc.read(|l| l.clone()).unwrap(), b)
        };

        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let restored =
            LedgerService::restore(FileJournal::open(&path).unwrap(), bus, clock()).unwrap();

        assert_eq!(restored.read(|l| l.clone()).unwrap(), snapshot);
        restored.check_consistency().unwrap();
        assert!(restored.is_paused().unwrap());
        assert_eq!(
            restored.get_procedure(ProcedureId::FIRST).unwrap().consent_hash,
            consent(7)
        );
        assert!(restored.is_practitioner(&b).unwrap());
    }

    /// Journal whose appends can be switched off.
    #[derive(Default)]
    struct FlakyJournal {
        inner: InMemoryJournal,
        failing: AtomicBool,
    }

    impl EventJournal for FlakyJournal {
        fn append(
            &self,
            events: Vec<UncommittedEvent>,
            expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, JournalError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(JournalError::Io(std::io::Error::other("disk full")));
            }
            self.inner.append(events, expected_version)
        }

        fn load(&self) -> Result<Vec<StoredEvent>, JournalError> {
            self.inner.load()
        }
    }

    #[test]
    fn failed_journal_append_changes_nothing() {
        let journal = Arc::new(FlakyJournal::default());
        let (svc, sub, _, b) = setup(journal.clone());
        sub.drain();
        let before = svc.read(|l| l.clone()).unwrap();

        journal.failing.store(true, Ordering::SeqCst);
        let err = svc.record_procedure(b, procedure(1, 10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(svc.read(|l| l.clone()).unwrap(), before);
        assert!(sub.drain().is_empty());

        journal.failing.store(false, Ordering::SeqCst);
        assert_eq!(
            svc.record_procedure(b, procedure(1, 10)).unwrap().output,
            ProcedureId::FIRST
        );
    }

    /// Bus that refuses every message.
    struct DeadBus;

    impl EventBus<EventEnvelope<JsonValue>> for DeadBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err("no route")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            let (_tx, rx) = std::sync::mpsc::channel();
            Subscription::new(rx)
        }
    }

    #[test]
    fn publish_failure_does_not_fail_the_commit() {
        let admin = AccountId::new();
        let (svc, receipt) = LedgerService::bootstrap(
            InMemoryJournal::new(),
            DeadBus,
            clock(),
            admin,
            LedgerPolicy::default(),
        )
        .unwrap();
        assert_eq!(receipt.events.len(), 3);

        let recorded = svc.record_procedure(admin, procedure(1, 10)).unwrap();
        assert_eq!(recorded.output, ProcedureId::FIRST);
        assert_eq!(svc.journal().load().unwrap().len(), 5);
    }

    #[test]
    fn concurrent_writers_get_distinct_sequential_ids() {
        let (svc, _sub, a, b) = setup(InMemoryJournal::new());
        let svc = Arc::new(svc);

        let writers: Vec<_> = [a, b]
            .into_iter()
            .flat_map(|who| (0..4u8).map(move |t| (who, t)))
            .map(|(who, tag)| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| svc.record_procedure(who, procedure(tag + 1, 5)).unwrap().output)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<ProcedureId> = writers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort();

        let expected: Vec<ProcedureId> = (1..=80).map(ProcedureId::new).collect();
        assert_eq!(ids, expected);
        assert_eq!(svc.total_procedures().unwrap(), 80);
        svc.check_consistency().unwrap();
    }
}
