//! Single-writer ledger service.
//!
//! `LedgerService` owns the `MedicalLedger` behind one `RwLock` and runs every
//! mutation through the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Take the write lock
//!   ↓
//! 2. Decide (aggregate.handle, pure; rejections leave everything untouched)
//!   ↓
//! 3. Append to the journal with ExpectedVersion::Exact(current version)
//!   ↓
//! 4. Apply the committed events to the in-memory ledger
//!   ↓
//! 5. Publish envelopes on the bus (failures are logged, never returned)
//! ```
//!
//! Reads take the read lock and therefore only ever see fully committed state.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use medledger_auth::Role;
use medledger_core::{
    AccountId, Aggregate, AggregateRoot, ConsentHash, DomainError, ExpectedVersion, LedgerId,
    PatientRef, ProcedureId,
};
use medledger_events::{Event, EventBus, EventEnvelope};
use medledger_procedures::{
    DeleteProcedure, GrantRole, Initialize, LedgerCommand, LedgerEvent, LedgerPolicy,
    MedicalLedger, Patient, Procedure, RecordProcedure, RevokeRole, SetPaused, UpdateConsent,
};

use crate::clock::Clock;
use crate::journal::{EventJournal, JournalError, StoredEvent, UncommittedEvent};

/// Coarse error category for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    State,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("failed to replay event {sequence_number}: {reason}")]
    Replay { sequence_number: u64, reason: String },

    #[error("ledger state lock poisoned")]
    Poisoned,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(DomainError::Validation(_) | DomainError::InvalidId(_)) => {
                ErrorKind::Validation
            }
            LedgerError::Domain(DomainError::Unauthorized(_)) => ErrorKind::Authorization,
            LedgerError::Domain(DomainError::NotFound(_)) => ErrorKind::NotFound,
            LedgerError::Domain(DomainError::State(_) | DomainError::Conflict(_)) => {
                ErrorKind::State
            }
            LedgerError::Journal(_) | LedgerError::Replay { .. } | LedgerError::Poisoned => {
                ErrorKind::Infrastructure
            }
        }
    }
}

/// Result of a committed call: the operation output plus the notifications it
/// produced, each carrying its journal sequence number.
///
/// A no-op call (e.g. granting a role already held) has no events.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt<T> {
    pub output: T,
    pub events: Vec<EventEnvelope<LedgerEvent>>,
}

impl<T> Receipt<T> {
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Input of `record_procedure`. The practitioner is the caller; the time comes
/// from the service clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcedure {
    pub patient_ref: PatientRef,
    pub procedure_type: String,
    pub duration_minutes: u32,
    pub consent_hash: ConsentHash,
    pub metadata: String,
}

pub struct LedgerService<J, B> {
    ledger: RwLock<MedicalLedger>,
    journal: J,
    bus: B,
    clock: Arc<dyn Clock>,
}

impl<J, B> std::fmt::Debug for LedgerService<J, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService").finish_non_exhaustive()
    }
}

impl<J, B> LedgerService<J, B>
where
    J: EventJournal,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create a brand-new ledger on an empty journal, with `deployer` as its
    /// first administrator and practitioner.
    pub fn bootstrap(
        journal: J,
        bus: B,
        clock: Arc<dyn Clock>,
        deployer: AccountId,
        policy: LedgerPolicy,
    ) -> Result<(Self, Receipt<LedgerId>), LedgerError> {
        if !journal.load()?.is_empty() {
            return Err(DomainError::state("journal already holds a ledger").into());
        }

        let ledger_id = LedgerId::new();
        let service = Self {
            ledger: RwLock::new(MedicalLedger::empty(ledger_id)),
            journal,
            bus,
            clock,
        };
        let events = service.dispatch(|at| {
            LedgerCommand::Initialize(Initialize {
                ledger_id,
                deployer,
                policy,
                occurred_at: at,
            })
        })?;

        tracing::info!(%ledger_id, %deployer, "ledger bootstrapped");
        Ok((
            service,
            Receipt {
                output: ledger_id,
                events,
            },
        ))
    }

    /// Rebuild the ledger by replaying every journaled event in sequence order.
    pub fn restore(journal: J, bus: B, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        let history = journal.load()?;
        let ledger = replay(&history)?;
        ledger.check_consistency()?;

        tracing::info!(
            ledger_id = %ledger.id_typed(),
            version = ledger.version(),
            procedures = ledger.total_procedures(),
            "ledger restored from journal"
        );

        Ok(Self {
            ledger: RwLock::new(ledger),
            journal,
            bus,
            clock,
        })
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a procedure for the calling practitioner and return its new id.
    pub fn record_procedure(
        &self,
        caller: AccountId,
        procedure: NewProcedure,
    ) -> Result<Receipt<ProcedureId>, LedgerError> {
        let events = self.dispatch(|at| {
            LedgerCommand::RecordProcedure(RecordProcedure {
                caller,
                patient_ref: procedure.patient_ref,
                procedure_type: procedure.procedure_type,
                duration_minutes: procedure.duration_minutes,
                consent_hash: procedure.consent_hash,
                metadata: procedure.metadata,
                occurred_at: at,
            })
        })?;

        let id = events
            .iter()
            .find_map(|env| match env.payload() {
                LedgerEvent::ProcedureRecorded(e) => Some(e.procedure_id),
                _ => None,
            })
            .ok_or_else(|| DomainError::state("record committed without a procedure"))?;

        Ok(Receipt { output: id, events })
    }

    pub fn update_consent(
        &self,
        caller: AccountId,
        procedure_id: ProcedureId,
        consent_hash: ConsentHash,
    ) -> Result<Receipt<()>, LedgerError> {
        self.dispatch_unit(|at| {
            LedgerCommand::UpdateConsent(UpdateConsent {
                caller,
                procedure_id,
                consent_hash,
                occurred_at: at,
            })
        })
    }

    /// Soft delete. Deleting an already inactive procedure is a no-op.
    pub fn delete_procedure(
        &self,
        caller: AccountId,
        procedure_id: ProcedureId,
    ) -> Result<Receipt<()>, LedgerError> {
        self.dispatch_unit(|at| {
            LedgerCommand::DeleteProcedure(DeleteProcedure {
                caller,
                procedure_id,
                occurred_at: at,
            })
        })
    }

    pub fn add_practitioner(
        &self,
        caller: AccountId,
        account: AccountId,
    ) -> Result<Receipt<()>, LedgerError> {
        self.grant(caller, account, Role::Practitioner)
    }

    pub fn remove_practitioner(
        &self,
        caller: AccountId,
        account: AccountId,
    ) -> Result<Receipt<()>, LedgerError> {
        self.revoke(caller, account, Role::Practitioner)
    }

    pub fn add_administrator(
        &self,
        caller: AccountId,
        account: AccountId,
    ) -> Result<Receipt<()>, LedgerError> {
        self.grant(caller, account, Role::Administrator)
    }

    /// Fails with a state error when `account` is the last administrator.
    pub fn remove_administrator(
        &self,
        caller: AccountId,
        account: AccountId,
    ) -> Result<Receipt<()>, LedgerError> {
        self.revoke(caller, account, Role::Administrator)
    }

    pub fn pause(&self, caller: AccountId) -> Result<Receipt<()>, LedgerError> {
        self.dispatch_unit(|at| {
            LedgerCommand::Pause(SetPaused {
                caller,
                occurred_at: at,
            })
        })
    }

    pub fn unpause(&self, caller: AccountId) -> Result<Receipt<()>, LedgerError> {
        self.dispatch_unit(|at| {
            LedgerCommand::Unpause(SetPaused {
                caller,
                occurred_at: at,
            })
        })
    }

    fn grant(
        &self,
        caller: AccountId,
        account: AccountId,
        role: Role,
    ) -> Result<Receipt<()>, LedgerError> {
        self.dispatch_unit(|at| {
            LedgerCommand::GrantRole(GrantRole {
                caller,
                account,
                role,
                occurred_at: at,
            })
        })
    }

    fn revoke(
        &self,
        caller: AccountId,
        account: AccountId,
        role: Role,
    ) -> Result<Receipt<()>, LedgerError> {
        self.dispatch_unit(|at| {
            LedgerCommand::RevokeRole(RevokeRole {
                caller,
                account,
                role,
                occurred_at: at,
            })
        })
    }

    fn dispatch_unit(
        &self,
        make_command: impl FnOnce(DateTime<Utc>) -> LedgerCommand,
    ) -> Result<Receipt<()>, LedgerError> {
        let events = self.dispatch(make_command)?;
        Ok(Receipt { output: (), events })
    }

    /// Decide, journal, apply, publish. The write lock is held throughout so
    /// commands are totally ordered and publication follows journal order.
    fn dispatch(
        &self,
        make_command: impl FnOnce(DateTime<Utc>) -> LedgerCommand,
    ) -> Result<Vec<EventEnvelope<LedgerEvent>>, LedgerError> {
        let mut ledger = self.write()?;
        let command = make_command(self.clock.now());

        let decided = match ledger.handle(&command) {
            Ok(events) => events,
            Err(err) => {
                tracing::debug!(command = command.name(), error = %err, "command rejected");
                return Err(err.into());
            }
        };
        if decided.is_empty() {
            tracing::debug!(command = command.name(), "command was a no-op");
            return Ok(vec![]);
        }

        let ledger_id = ledger.id_typed();
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(ledger_id, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self
            .journal
            .append(uncommitted, ExpectedVersion::Exact(ledger.version()))?;

        for ev in &decided {
            ledger.apply(ev);
        }

        tracing::info!(
            command = command.name(),
            %ledger_id,
            first_sequence = committed.first().map(|e| e.sequence_number),
            last_sequence = committed.last().map(|e| e.sequence_number),
            "command committed"
        );

        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    sequence_number = stored.sequence_number,
                    event_type = %stored.event_type,
                    error = ?err,
                    "event publication failed after commit"
                );
            }
        }

        Ok(committed
            .iter()
            .zip(decided)
            .map(|(stored, ev)| stored.to_envelope().map(|_| ev))
            .collect())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MedicalLedger>, LedgerError> {
        self.ledger.write().map_err(|_| LedgerError::Poisoned)
    }
}

impl<J, B> LedgerService<J, B> {
    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `f` against a consistent snapshot of the ledger.
    pub fn read<T>(&self, f: impl FnOnce(&MedicalLedger) -> T) -> Result<T, LedgerError> {
        let ledger = self.read_guard()?;
        Ok(f(&ledger))
    }

    pub fn ledger_id(&self) -> Result<LedgerId, LedgerError> {
        self.read(MedicalLedger::id_typed)
    }

    pub fn version(&self) -> Result<u64, LedgerError> {
        self.read(|l| l.version())
    }

    pub fn get_procedure(&self, id: ProcedureId) -> Result<Procedure, LedgerError> {
        let ledger = self.read_guard()?;
        Ok(ledger.procedure(id)?.clone())
    }

    pub fn get_patient(&self, patient_ref: &PatientRef) -> Result<Option<Patient>, LedgerError> {
        self.read(|l| l.patient(patient_ref).copied())
    }

    pub fn get_practitioner_procedures(
        &self,
        account: &AccountId,
    ) -> Result<Vec<ProcedureId>, LedgerError> {
        self.read(|l| l.practitioner_procedures(account).to_vec())
    }

    pub fn get_patient_procedures(
        &self,
        patient_ref: &PatientRef,
    ) -> Result<Vec<ProcedureId>, LedgerError> {
        self.read(|l| l.patient_procedures(patient_ref).to_vec())
    }

    pub fn get_patient_history(
        &self,
        patient_ref: &PatientRef,
    ) -> Result<Vec<Procedure>, LedgerError> {
        self.read(|l| l.patient_history(patient_ref).into_iter().cloned().collect())
    }

    pub fn get_practitioner_history(
        &self,
        account: &AccountId,
    ) -> Result<Vec<Procedure>, LedgerError> {
        self.read(|l| l.practitioner_history(account).into_iter().cloned().collect())
    }

    pub fn total_procedures(&self) -> Result<u64, LedgerError> {
        self.read(MedicalLedger::total_procedures)
    }

    pub fn is_practitioner(&self, account: &AccountId) -> Result<bool, LedgerError> {
        self.read(|l| l.is_practitioner(account))
    }

    pub fn is_administrator(&self, account: &AccountId) -> Result<bool, LedgerError> {
        self.read(|l| l.is_administrator(account))
    }

    pub fn is_paused(&self) -> Result<bool, LedgerError> {
        self.read(MedicalLedger::is_paused)
    }

    pub fn check_consistency(&self) -> Result<(), LedgerError> {
        let ledger = self.read_guard()?;
        ledger.check_consistency()?;
        Ok(())
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, MedicalLedger>, LedgerError> {
        self.ledger.read().map_err(|_| LedgerError::Poisoned)
    }
}

/// Decode one journaled event back into its typed form.
pub fn decode_event(stored: &StoredEvent) -> Result<LedgerEvent, LedgerError> {
    let event: LedgerEvent =
        serde_json::from_value(stored.payload.clone()).map_err(|e| LedgerError::Replay {
            sequence_number: stored.sequence_number,
            reason: e.to_string(),
        })?;
    if event.event_type() != stored.event_type {
        return Err(LedgerError::Replay {
            sequence_number: stored.sequence_number,
            reason: format!(
                "payload is '{}' but the journal recorded '{}'",
                event.event_type(),
                stored.event_type
            ),
        });
    }
    Ok(event)
}

/// Rebuild a ledger from a journaled history.
///
/// The history must start with `LedgerInitialized` and contain it exactly once;
/// the ledger id is taken from the journal.
pub fn replay(history: &[StoredEvent]) -> Result<MedicalLedger, LedgerError> {
    let first = history
        .first()
        .ok_or_else(|| DomainError::not_found("journal is empty"))?;
    let mut ledger = MedicalLedger::empty(first.ledger_id);

    for stored in history {
        let event = decode_event(stored)?;
        let initializes = matches!(event, LedgerEvent::LedgerInitialized(_));
        if initializes == ledger.is_initialized() {
            let reason = if initializes {
                "ledger initialized a second time"
            } else {
                "journal does not start with ledger initialization"
            };
            return Err(LedgerError::Replay {
                sequence_number: stored.sequence_number,
                reason: reason.to_string(),
            });
        }
        ledger.apply(&event);
        if ledger.version() != stored.sequence_number {
            return Err(LedgerError::Replay {
                sequence_number: stored.sequence_number,
                reason: format!("ledger version {} out of step", ledger.version()),
            });
        }
    }
    Ok(ledger)
}
