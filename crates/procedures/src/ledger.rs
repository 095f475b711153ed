use std::collections::{BTreeMap, HashMap};

use medledger_auth::{Role, RoleGrants, authorize, ensure_assignable};
use medledger_core::{
    AccountId, Aggregate, AggregateRoot, DomainError, DomainResult, LedgerId, PatientRef,
    ProcedureId,
};

use crate::command::{
    DeleteProcedure, GrantRole, Initialize, LedgerCommand, RecordProcedure, RevokeRole, SetPaused,
    UpdateConsent,
};
use crate::event::{
    ConsentUpdated, LedgerEvent, LedgerInitialized, PatientRegistered, PauseChanged,
    ProcedureDeactivated, ProcedureRecorded, RoleChanged,
};
use crate::model::{LedgerPolicy, Patient, Procedure};

/// Aggregate root: MedicalLedger.
///
/// Holds every piece of ledger state: procedures, patient summaries, the two
/// append-only indices, role grants and the pause flag. All of it changes only
/// through `apply`, and `apply` only ever sees events that `handle` accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicalLedger {
    id: LedgerId,
    version: u64,
    created: bool,
    policy: LedgerPolicy,
    roles: RoleGrants,
    paused: bool,
    procedures: BTreeMap<ProcedureId, Procedure>,
    patients: HashMap<PatientRef, Patient>,
    practitioner_index: HashMap<AccountId, Vec<ProcedureId>>,
    patient_index: HashMap<PatientRef, Vec<ProcedureId>>,
}

impl MedicalLedger {
    /// Empty, not-yet-initialized aggregate for bootstrap or rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            version: 0,
            created: false,
            policy: LedgerPolicy::default(),
            roles: RoleGrants::new(),
            paused: false,
            procedures: BTreeMap::new(),
            patients: HashMap::new(),
            practitioner_index: HashMap::new(),
            patient_index: HashMap::new(),
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.created
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    pub fn roles(&self) -> &RoleGrants {
        &self.roles
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_administrator(&self, account: &AccountId) -> bool {
        self.roles.has_role(account, Role::Administrator)
    }

    pub fn is_practitioner(&self, account: &AccountId) -> bool {
        self.roles.has_role(account, Role::Practitioner)
    }

    /// Look up a procedure; `NotFound` when the id was never allocated.
    pub fn procedure(&self, id: ProcedureId) -> DomainResult<&Procedure> {
        self.procedures
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("procedure {id}")))
    }

    pub fn patient(&self, patient_ref: &PatientRef) -> Option<&Patient> {
        self.patients.get(patient_ref)
    }

    /// Ids recorded by `account`, in recording order (empty when unknown).
    pub fn practitioner_procedures(&self, account: &AccountId) -> &[ProcedureId] {
        self.practitioner_index
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids referencing `patient_ref`, in recording order (empty when unknown).
    pub fn patient_procedures(&self, patient_ref: &PatientRef) -> &[ProcedureId] {
        self.patient_index
            .get(patient_ref)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn patient_history(&self, patient_ref: &PatientRef) -> Vec<&Procedure> {
        self.resolve(self.patient_procedures(patient_ref))
    }

    pub fn practitioner_history(&self, account: &AccountId) -> Vec<&Procedure> {
        self.resolve(self.practitioner_procedures(account))
    }

    fn resolve(&self, ids: &[ProcedureId]) -> Vec<&Procedure> {
        ids.iter().filter_map(|id| self.procedures.get(id)).collect()
    }

    /// All procedures in id order.
    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.values()
    }

    /// Number of ids allocated so far (soft-deleted procedures included).
    pub fn total_procedures(&self) -> u64 {
        self.last_procedure_id().map(ProcedureId::get).unwrap_or(0)
    }

    pub fn last_procedure_id(&self) -> Option<ProcedureId> {
        self.procedures.keys().next_back().copied()
    }

    /// Recompute patients and both indices from the procedure table and compare
    /// them with the maintained copies. Also checks that ids are gapless from 1.
    pub fn check_consistency(&self) -> DomainResult<()> {
        let mut by_practitioner: HashMap<AccountId, Vec<ProcedureId>> = HashMap::new();
        let mut by_patient: HashMap<PatientRef, Vec<ProcedureId>> = HashMap::new();
        let mut patients: HashMap<PatientRef, Patient> = HashMap::new();

        for (expected, (id, p)) in (1u64..).zip(&self.procedures) {
            if id.get() != expected || p.id != *id {
                return Err(DomainError::state(format!(
                    "procedure table has a gap or mislabeled entry at id {id} (expected {expected})"
                )));
            }
            by_practitioner.entry(p.practitioner).or_default().push(*id);
            by_patient.entry(p.patient_ref).or_default().push(*id);
            let patient = patients.entry(p.patient_ref).or_insert(Patient {
                patient_ref: p.patient_ref,
                first_procedure: *id,
                last_procedure: *id,
                total_procedures: 0,
            });
            patient.last_procedure = *id;
            patient.total_procedures += 1;
        }

        if by_practitioner != self.practitioner_index {
            return Err(DomainError::state("practitioner index drifted from the procedure table"));
        }
        if by_patient != self.patient_index {
            return Err(DomainError::state("patient index drifted from the procedure table"));
        }
        if patients != self.patients {
            return Err(DomainError::state("patient summaries drifted from the procedure table"));
        }
        if self.created && self.roles.count(Role::Administrator) == 0 {
            return Err(DomainError::state("ledger has no administrator"));
        }
        Ok(())
    }
}

impl AggregateRoot for MedicalLedger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for MedicalLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::LedgerInitialized(e) => {
                self.id = e.ledger_id;
                self.policy = e.policy.clone();
                self.created = true;
            }
            LedgerEvent::RoleGranted(e) => {
                self.roles.grant(e.account, e.role);
            }
            LedgerEvent::RoleRevoked(e) => {
                self.roles.revoke(&e.account, e.role);
            }
            LedgerEvent::PatientRegistered(e) => {
                self.patients.entry(e.patient_ref).or_insert(Patient {
                    patient_ref: e.patient_ref,
                    first_procedure: e.first_procedure,
                    last_procedure: e.first_procedure,
                    total_procedures: 0,
                });
            }
            LedgerEvent::ProcedureRecorded(e) => {
                let patient = self.patients.entry(e.patient_ref).or_insert(Patient {
                    patient_ref: e.patient_ref,
                    first_procedure: e.procedure_id,
                    last_procedure: e.procedure_id,
                    total_procedures: 0,
                });
                patient.last_procedure = e.procedure_id;
                patient.total_procedures += 1;

                self.practitioner_index
                    .entry(e.practitioner)
                    .or_default()
                    .push(e.procedure_id);
                self.patient_index
                    .entry(e.patient_ref)
                    .or_default()
                    .push(e.procedure_id);

                self.procedures.insert(
                    e.procedure_id,
                    Procedure {
                        id: e.procedure_id,
                        patient_ref: e.patient_ref,
                        practitioner: e.practitioner,
                        procedure_type: e.procedure_type.clone(),
                        duration_minutes: e.duration_minutes,
                        recorded_at: e.occurred_at,
                        consent_hash: e.consent_hash,
                        active: true,
                        metadata: e.metadata.clone(),
                    },
                );
            }
            LedgerEvent::ConsentUpdated(e) => {
                if let Some(p) = self.procedures.get_mut(&e.procedure_id) {
                    p.consent_hash = e.consent_hash;
                }
            }
            LedgerEvent::ProcedureDeactivated(e) => {
                if let Some(p) = self.procedures.get_mut(&e.procedure_id) {
                    p.active = false;
                }
            }
            LedgerEvent::Paused(_) => self.paused = true,
            LedgerEvent::Unpaused(_) => self.paused = false,
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Initialize(cmd) => self.handle_initialize(cmd),
            LedgerCommand::RecordProcedure(cmd) => self.handle_record(cmd),
            LedgerCommand::UpdateConsent(cmd) => self.handle_update_consent(cmd),
            LedgerCommand::DeleteProcedure(cmd) => self.handle_delete(cmd),
            LedgerCommand::GrantRole(cmd) => self.handle_grant(cmd),
            LedgerCommand::RevokeRole(cmd) => self.handle_revoke(cmd),
            LedgerCommand::Pause(cmd) => self.handle_pause(cmd, true),
            LedgerCommand::Unpause(cmd) => self.handle_pause(cmd, false),
        }
    }
}

impl MedicalLedger {
    fn ensure_initialized(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::state("ledger is not initialized"));
        }
        Ok(())
    }

    fn ensure_not_paused(&self) -> Result<(), DomainError> {
        if self.paused {
            return Err(DomainError::state("ledger is paused"));
        }
        Ok(())
    }

    fn next_procedure_id(&self) -> Result<ProcedureId, DomainError> {
        match self.last_procedure_id() {
            None => Ok(ProcedureId::FIRST),
            Some(last) => last
                .next()
                .ok_or_else(|| DomainError::state("procedure id space exhausted")),
        }
    }

    fn handle_initialize(&self, cmd: &Initialize) -> Result<Vec<LedgerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::state("ledger already initialized"));
        }
        if cmd.ledger_id != self.id {
            return Err(DomainError::state("ledger id mismatch"));
        }
        ensure_assignable(&cmd.deployer)?;
        cmd.policy.validate()?;

        let grant = |role| {
            LedgerEvent::RoleGranted(RoleChanged {
                role,
                account: cmd.deployer,
                sender: cmd.deployer,
                occurred_at: cmd.occurred_at,
            })
        };

        Ok(vec![
            LedgerEvent::LedgerInitialized(LedgerInitialized {
                ledger_id: cmd.ledger_id,
                deployer: cmd.deployer,
                policy: cmd.policy.clone(),
                occurred_at: cmd.occurred_at,
            }),
            grant(Role::Administrator),
            grant(Role::Practitioner),
        ])
    }

    fn handle_record(&self, cmd: &RecordProcedure) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_initialized()?;
        authorize(&self.roles, &cmd.caller, Role::Practitioner)?;
        self.ensure_not_paused()?;

        if cmd.patient_ref.is_zero() {
            return Err(DomainError::validation("patient reference cannot be zero"));
        }
        self.policy.check_procedure_type(&cmd.procedure_type)?;
        self.policy.check_duration(cmd.duration_minutes)?;
        if cmd.consent_hash.is_zero() {
            return Err(DomainError::validation("consent hash cannot be zero"));
        }

        let procedure_id = self.next_procedure_id()?;

        let mut events = Vec::with_capacity(2);
        if !self.patients.contains_key(&cmd.patient_ref) {
            events.push(LedgerEvent::PatientRegistered(PatientRegistered {
                patient_ref: cmd.patient_ref,
                first_procedure: procedure_id,
                occurred_at: cmd.occurred_at,
            }));
        }
        events.push(LedgerEvent::ProcedureRecorded(ProcedureRecorded {
            procedure_id,
            patient_ref: cmd.patient_ref,
            practitioner: cmd.caller,
            procedure_type: cmd.procedure_type.clone(),
            duration_minutes: cmd.duration_minutes,
            consent_hash: cmd.consent_hash,
            metadata: cmd.metadata.clone(),
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_update_consent(&self, cmd: &UpdateConsent) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_initialized()?;
        authorize(&self.roles, &cmd.caller, Role::Practitioner)?;
        self.ensure_not_paused()?;

        let procedure = self.procedure(cmd.procedure_id)?;
        if procedure.practitioner != cmd.caller {
            return Err(DomainError::unauthorized(format!(
                "only the recording practitioner may update consent on procedure {}",
                cmd.procedure_id
            )));
        }
        if cmd.consent_hash.is_zero() {
            return Err(DomainError::validation("consent hash cannot be zero"));
        }

        Ok(vec![LedgerEvent::ConsentUpdated(ConsentUpdated {
            procedure_id: cmd.procedure_id,
            consent_hash: cmd.consent_hash,
            updated_by: cmd.caller,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProcedure) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_initialized()?;
        authorize(&self.roles, &cmd.caller, Role::Administrator)?;
        self.ensure_not_paused()?;

        if !self.procedure(cmd.procedure_id)?.active {
            return Ok(vec![]);
        }

        Ok(vec![LedgerEvent::ProcedureDeactivated(ProcedureDeactivated {
            procedure_id: cmd.procedure_id,
            deactivated_by: cmd.caller,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant(&self, cmd: &GrantRole) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_initialized()?;
        authorize(&self.roles, &cmd.caller, Role::Administrator)?;
        ensure_assignable(&cmd.account)?;

        if self.roles.has_role(&cmd.account, cmd.role) {
            return Ok(vec![]);
        }

        Ok(vec![LedgerEvent::RoleGranted(RoleChanged {
            role: cmd.role,
            account: cmd.account,
            sender: cmd.caller,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke(&self, cmd: &RevokeRole) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_initialized()?;
        authorize(&self.roles, &cmd.caller, Role::Administrator)?;
        ensure_assignable(&cmd.account)?;

        if !self.roles.has_role(&cmd.account, cmd.role) {
            return Ok(vec![]);
        }
        if cmd.role == Role::Administrator && self.roles.count(Role::Administrator) <= 1 {
            return Err(DomainError::state("cannot remove the last administrator"));
        }

        Ok(vec![LedgerEvent::RoleRevoked(RoleChanged {
            role: cmd.role,
            account: cmd.account,
            sender: cmd.caller,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pause(&self, cmd: &SetPaused, pause: bool) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_initialized()?;
        authorize(&self.roles, &cmd.caller, Role::Administrator)?;

        if self.paused == pause {
            return Ok(vec![]);
        }

        let change = PauseChanged {
            account: cmd.caller,
            occurred_at: cmd.occurred_at,
        };
        Ok(vec![if pause {
            LedgerEvent::Paused(change)
        } else {
            LedgerEvent::Unpaused(change)
        }])
    }
}
