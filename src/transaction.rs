//! Transaction records, drafts and the audit trail
use super::code::{CodeInputs, Segment, UniqueCode};
use super::error::{EngineError, ValidationError};
use super::status::Status;
use super::types::{Actor, TimeStamp};

// Used for constructing drafts across the entry wizard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionDraft {
    amount: u64, // minor currency units
    inputs: CodeInputs,
}

// The immutable attributes of a submitted transaction
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetails {
    #[n(0)]
    pub amount: u64,
    #[n(1)]
    pub beneficiary_name: String,
    #[n(2)]
    pub budget_code: String,
    #[n(3)]
    pub zone_id: String,
    #[n(4)]
    pub department_id: String,
    #[n(5)]
    pub section_id: String,
    #[n(6)]
    pub cost_center_code: String,
    #[n(7)]
    pub continuous_action_code: String,
    #[n(8)]
    pub special_activity_code: String,
    #[n(9)]
    pub financial_event_code: String,
    #[n(10)]
    pub fiscal_year: u16,
}

impl TransactionDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }
    /// Replaces the code inputs wholesale, e.g. from a wizard step's state.
    pub fn set_inputs(mut self, inputs: CodeInputs) -> Self {
        self.inputs = inputs;
        self
    }
    pub fn set_zone(self, zone: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_zone(zone);
        self.set_inputs(inputs)
    }
    pub fn set_department(self, department: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_department(department);
        self.set_inputs(inputs)
    }
    pub fn set_section(self, section: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_section(section);
        self.set_inputs(inputs)
    }
    pub fn set_budget_code(self, code: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_budget_code(code);
        self.set_inputs(inputs)
    }
    pub fn set_cost_center(self, code: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_cost_center(code);
        self.set_inputs(inputs)
    }
    pub fn set_continuous_action(self, code: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_continuous_action(code);
        self.set_inputs(inputs)
    }
    pub fn set_special_activity(self, code: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_special_activity(code);
        self.set_inputs(inputs)
    }
    pub fn set_beneficiary_name(self, name: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_beneficiary_name(name);
        self.set_inputs(inputs)
    }
    pub fn set_financial_event(self, code: impl Into<String>) -> Self {
        let inputs = self.inputs.clone().set_financial_event(code);
        self.set_inputs(inputs)
    }
    pub fn set_fiscal_year(self, year: u16) -> Self {
        let inputs = self.inputs.clone().set_fiscal_year(year);
        self.set_inputs(inputs)
    }

    pub fn inputs(&self) -> &CodeInputs {
        &self.inputs
    }

    /// Checks every field, including that each code segment resolves, and
    /// returns the attributes to persist.
    pub fn validate_and_finalise(&self) -> Result<TransactionDetails, EngineError> {
        if self.amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        for segment in &Segment::ALL[..Segment::ALL.len() - 1] {
            self.inputs.resolve(*segment)?;
        }

        let text = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        let inputs = &self.inputs;
        Ok(TransactionDetails {
            amount: self.amount,
            beneficiary_name: text(&inputs.beneficiary_name),
            budget_code: text(&inputs.budget_code),
            zone_id: text(&inputs.zone),
            department_id: text(&inputs.department),
            section_id: text(&inputs.section),
            cost_center_code: text(&inputs.cost_center),
            continuous_action_code: text(&inputs.continuous_action),
            special_activity_code: text(&inputs.special_activity),
            financial_event_code: text(&inputs.financial_event),
            fiscal_year: inputs.fiscal_year.unwrap_or_default(),
        })
    }
}

impl TransactionDetails {
    pub fn code_inputs(&self) -> CodeInputs {
        CodeInputs::new()
            .set_zone(self.zone_id.as_str())
            .set_department(self.department_id.as_str())
            .set_section(self.section_id.as_str())
            .set_budget_code(self.budget_code.as_str())
            .set_cost_center(self.cost_center_code.as_str())
            .set_continuous_action(self.continuous_action_code.as_str())
            .set_special_activity(self.special_activity_code.as_str())
            .set_beneficiary_name(self.beneficiary_name.as_str())
            .set_financial_event(self.financial_event_code.as_str())
            .set_fiscal_year(self.fiscal_year)
    }
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum Action {
    #[n(0)]
    Created,
    #[n(1)]
    CodeFinalized {
        #[n(0)]
        code: UniqueCode,
    },
    #[n(2)]
    Submitted,
    #[n(3)]
    Approved {
        #[n(0)]
        level: u8,
    },
    #[n(4)]
    Rejected {
        #[n(0)]
        level: u8,
        #[n(1)]
        reason: String,
    },
    #[n(5)]
    Booked,
}

/// One committed write, recorded for the history view.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct AuditEntry {
    #[n(0)]
    pub actor_id: String,
    #[n(1)]
    pub actor_level: u8,
    #[n(2)]
    pub at: TimeStamp,
    #[n(3)]
    pub action: Action,
    #[n(4)]
    pub resulting_status: Status,
}

impl std::fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match &self.action {
            Action::Created => "created".to_string(),
            Action::CodeFinalized { code } => format!("assigned code {code}"),
            Action::Submitted => "submitted for approval".to_string(),
            Action::Approved { level } => format!("approved at level {level}"),
            Action::Rejected { level, reason } => format!("rejected at level {level}: {reason}"),
            Action::Booked => "booked".to_string(),
        };
        write!(
            f,
            "{} {} (level {}) {} -> {}",
            self.at, self.actor_id, self.actor_level, action, self.resulting_status
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Transaction {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub unique_code: Option<UniqueCode>,
    #[n(2)]
    pub status: Status,
    #[n(3)]
    pub version: u64,
    #[n(4)]
    pub details: TransactionDetails,
    #[n(5)]
    pub rejection_reason: Option<String>,
    #[n(6)]
    pub created_at: TimeStamp,
    #[n(7)]
    pub history: Vec<AuditEntry>,
}

/// What callers of a transition get back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub status: Status,
    pub approval_level: u8,
    pub version: u64,
}

impl std::fmt::Display for TransitionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (approval level {}, version {})",
            self.status, self.approval_level, self.version
        )
    }
}

impl Transaction {
    /// A freshly persisted draft: no code yet, version 1.
    pub fn new(id: String, details: TransactionDetails, actor: &Actor) -> Self {
        let mut transaction = Self {
            id,
            unique_code: None,
            status: Status::Draft,
            version: 0,
            details,
            rejection_reason: None,
            created_at: TimeStamp::new(),
            history: vec![],
        };
        transaction.record(actor, Action::Created);
        transaction
    }

    pub fn approval_level(&self) -> u8 {
        self.status.approval_level()
    }

    pub fn outcome(&self) -> TransitionOutcome {
        TransitionOutcome {
            status: self.status,
            approval_level: self.approval_level(),
            version: self.version,
        }
    }

    pub fn describe_history(&self) -> Vec<String> {
        self.history.iter().map(ToString::to_string).collect()
    }

    fn record(&mut self, actor: &Actor, action: Action) {
        self.version += 1;
        self.history.push(AuditEntry {
            actor_id: actor.id().to_string(),
            actor_level: actor.level(),
            at: TimeStamp::new(),
            action,
            resulting_status: self.status,
        });
    }

    fn check_version(&self, expected_version: u64) -> Result<(), EngineError> {
        if self.version != expected_version {
            return Err(EngineError::StaleState {
                expected: expected_version,
                actual: self.version,
            });
        }
        Ok(())
    }

    // Decided transactions report TerminalState ahead of any version mismatch,
    // so a caller holding an old version still learns the outcome.
    fn guard(&self, expected_version: u64, terminal: fn(Status) -> bool) -> Result<(), EngineError> {
        if terminal(self.status) {
            return Err(EngineError::TerminalState(self.status));
        }
        self.check_version(expected_version)
    }

    /// Checked before a sequence number is drawn for this transaction.
    pub fn ensure_code_assignable(&self, expected_version: u64) -> Result<(), EngineError> {
        self.guard(expected_version, Status::is_decided)?;
        if let Some(existing) = &self.unique_code {
            return Err(ValidationError::CodeAlreadyFinalized(existing.to_string()).into());
        }
        if self.status != Status::Draft {
            return Err(ValidationError::AlreadySubmitted(self.status).into());
        }
        Ok(())
    }

    /// Attaches the finalized code. Only legal once, and only on a draft.
    pub fn with_code(
        &self,
        code: UniqueCode,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<Transaction, EngineError> {
        self.ensure_code_assignable(expected_version)?;
        let mut next = self.clone();
        next.unique_code = Some(code.clone());
        next.record(actor, Action::CodeFinalized { code });
        Ok(next)
    }

    pub fn submit(&self, actor: &Actor, expected_version: u64) -> Result<Transaction, EngineError> {
        self.guard(expected_version, Status::is_decided)?;
        let status = self.status.submit()?;
        if self.unique_code.is_none() {
            return Err(ValidationError::MissingCode.into());
        }
        let mut next = self.clone();
        next.status = status;
        next.record(actor, Action::Submitted);
        Ok(next)
    }

    pub fn approve(&self, actor: &Actor, expected_version: u64) -> Result<Transaction, EngineError> {
        self.guard(expected_version, Status::is_decided)?;
        let level = actor.level();
        let status = self.status.approve(level)?;
        let mut next = self.clone();
        next.status = status;
        next.record(actor, Action::Approved { level });
        Ok(next)
    }

    pub fn reject(
        &self,
        actor: &Actor,
        reason: &str,
        expected_version: u64,
    ) -> Result<Transaction, EngineError> {
        self.guard(expected_version, Status::is_decided)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::EmptyReason.into());
        }
        let level = actor.level();
        let status = self.status.reject(level)?;
        let mut next = self.clone();
        next.status = status;
        next.rejection_reason = Some(reason.to_string());
        next.record(
            actor,
            Action::Rejected {
                level,
                reason: reason.to_string(),
            },
        );
        Ok(next)
    }

    pub fn book(&self, actor: &Actor, expected_version: u64) -> Result<Transaction, EngineError> {
        self.guard(expected_version, Status::is_final)?;
        let status = self.status.book()?;
        let mut next = self.clone();
        next.status = status;
        next.record(actor, Action::Booked);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TransactionDraft {
        TransactionDraft::new()
            .set_amount(250_000)
            .set_zone("03")
            .set_department("12")
            .set_section("007")
            .set_budget_code("11020401")
            .set_cost_center("101")
            .set_continuous_action("05")
            .set_special_activity("210")
            .set_beneficiary_name("Acme Paving Ltd")
            .set_financial_event("300")
            .set_fiscal_year(1403)
    }

    fn pending_at(level: u8) -> Transaction {
        let clerk = Actor::new("clerk", 0).unwrap();
        let details = draft().validate_and_finalise().unwrap();
        let code = UniqueCode::parse("03-12-007-11020401-101-05-210-a1b2c3-300-1403-001").unwrap();
        let mut txn = Transaction::new("txn_test".into(), details, &clerk)
            .with_code(code, &clerk, 1)
            .unwrap()
            .submit(&clerk, 2)
            .unwrap();
        for l in 1..level {
            let approver = Actor::new(format!("approver_{l}"), l).unwrap();
            txn = txn.approve(&approver, txn.version).unwrap();
        }
        txn
    }

    #[test]
    fn draft_validation() {
        assert!(matches!(
            draft().set_amount(0).validate_and_finalise(),
            Err(EngineError::Validation(ValidationError::ZeroAmount))
        ));
        let mut incomplete = draft();
        incomplete.inputs.section = None;
        assert!(matches!(
            incomplete.validate_and_finalise(),
            Err(EngineError::Validation(ValidationError::MissingSegment(
                Segment::Section
            )))
        ));
    }

    #[test]
    fn details_round_trip_to_inputs() {
        let details = draft().validate_and_finalise().unwrap();
        assert_eq!(details.code_inputs(), *draft().inputs());
    }

    #[test]
    fn approve_advances_and_bumps_version() {
        let txn = pending_at(2);
        let office = Actor::new("office", 2).unwrap();
        let next = txn.approve(&office, txn.version).unwrap();

        assert_eq!(next.status, Status::PendingL3);
        assert_eq!(next.approval_level(), 3);
        assert_eq!(next.version, txn.version + 1);

        // same actor, old version
        assert!(matches!(
            next.approve(&office, txn.version),
            Err(EngineError::StaleState { .. })
        ));
    }

    #[test]
    fn blank_reason_leaves_transaction_untouched() {
        let txn = pending_at(1);
        let section = Actor::new("section", 1).unwrap();
        for reason in ["", "   \t"] {
            assert!(matches!(
                txn.reject(&section, reason, txn.version),
                Err(EngineError::Validation(ValidationError::EmptyReason))
            ));
        }
    }

    #[test]
    fn rejection_is_final() {
        let txn = pending_at(3);
        let zone = Actor::new("zone", 3).unwrap();
        let rejected = txn.reject(&zone, " over budget ", txn.version).unwrap();

        assert_eq!(rejected.status, Status::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("over budget"));
        assert!(matches!(
            rejected.approve(&zone, rejected.version),
            Err(EngineError::TerminalState(Status::Rejected))
        ));
        assert!(matches!(
            rejected.book(&zone, rejected.version),
            Err(EngineError::TerminalState(Status::Rejected))
        ));
        assert!(matches!(
            rejected.reject(&zone, "again", txn.version),
            Err(EngineError::TerminalState(Status::Rejected))
        ));
    }

    #[test]
    fn blank_reason_on_decided_transaction_is_terminal() {
        let section = Actor::new("section", 1).unwrap();
        let pending = pending_at(1);
        let rejected = pending
            .reject(&section, "over budget", pending.version)
            .unwrap();
        let mut approved = pending_at(1);
        for level in 1..=4 {
            let approver = Actor::new("approver", level).unwrap();
            approved = approved.approve(&approver, approved.version).unwrap();
        }
        let booked = approved.book(&section, approved.version).unwrap();

        for (txn, status) in [
            (&rejected, Status::Rejected),
            (&approved, Status::Approved),
            (&booked, Status::Booked),
        ] {
            for reason in ["", "   "] {
                assert!(matches!(
                    txn.reject(&section, reason, txn.version),
                    Err(EngineError::TerminalState(s)) if s == status
                ));
            }
        }
    }

    #[test]
    fn code_is_assigned_once() {
        let txn = pending_at(1);
        let clerk = Actor::new("clerk", 0).unwrap();
        let code = txn.unique_code.clone().unwrap();
        assert!(matches!(
            txn.with_code(code, &clerk, txn.version),
            Err(EngineError::Validation(ValidationError::CodeAlreadyFinalized(_)))
        ));
    }

    #[test]
    fn record_encoding() {
        let txn = pending_at(2);
        let encoded = minicbor::to_vec(&txn).unwrap();
        let decoded: Transaction = minicbor::decode(&encoded).unwrap();
        assert_eq!(txn, decoded);
        assert_eq!(decoded.history.len(), 4);
    }
}
