use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DomainResult;
use crate::auth::Role;
use crate::error::DomainError;
use crate::gating::{self, RejectionRoute};
use crate::identity::ActorIdentity;
use crate::transitions::{Action, ActionPayload, Guard, find_rule, rules_from, validate_payload};

/// Fixed certification fees, phase 1 covers the document review, phase 2 the
/// audit. Policy constants, not configuration.
pub const PHASE_ONE_FEE_THB: u64 = 5_000;
pub const PHASE_TWO_FEE_THB: u64 = 25_000;

/// A third rejection ends the application instead of another revision cycle.
pub const MAX_DOCUMENT_REJECTIONS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationState {
    Draft,
    Submitted,
    #[serde(rename = "payment_pending_1")]
    PaymentPending1,
    #[serde(rename = "payment_processing_1")]
    PaymentProcessing1,
    DocumentReview,
    DocumentRevision,
    DocumentApproved,
    #[serde(rename = "payment_pending_2")]
    PaymentPending2,
    #[serde(rename = "payment_processing_2")]
    PaymentProcessing2,
    InspectionScheduled,
    InspectionRemote,
    InspectionOnSite,
    InspectionCompleted,
    PendingApproval,
    Approved,
    CertificateGenerating,
    CertificateIssued,
    Rejected,
}

impl ApplicationState {
    pub const ALL: [ApplicationState; 18] = [
        ApplicationState::Draft,
        ApplicationState::Submitted,
        ApplicationState::PaymentPending1,
        ApplicationState::PaymentProcessing1,
        ApplicationState::DocumentReview,
        ApplicationState::DocumentRevision,
        ApplicationState::DocumentApproved,
        ApplicationState::PaymentPending2,
        ApplicationState::PaymentProcessing2,
        ApplicationState::InspectionScheduled,
        ApplicationState::InspectionRemote,
        ApplicationState::InspectionOnSite,
        ApplicationState::InspectionCompleted,
        ApplicationState::PendingApproval,
        ApplicationState::Approved,
        ApplicationState::CertificateGenerating,
        ApplicationState::CertificateIssued,
        ApplicationState::Rejected,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationState::Draft => "draft",
            ApplicationState::Submitted => "submitted",
            ApplicationState::PaymentPending1 => "payment_pending_1",
            ApplicationState::PaymentProcessing1 => "payment_processing_1",
            ApplicationState::DocumentReview => "document_review",
            ApplicationState::DocumentRevision => "document_revision",
            ApplicationState::DocumentApproved => "document_approved",
            ApplicationState::PaymentPending2 => "payment_pending_2",
            ApplicationState::PaymentProcessing2 => "payment_processing_2",
            ApplicationState::InspectionScheduled => "inspection_scheduled",
            ApplicationState::InspectionRemote => "inspection_remote",
            ApplicationState::InspectionOnSite => "inspection_on_site",
            ApplicationState::InspectionCompleted => "inspection_completed",
            ApplicationState::PendingApproval => "pending_approval",
            ApplicationState::Approved => "approved",
            ApplicationState::CertificateGenerating => "certificate_generating",
            ApplicationState::CertificateIssued => "certificate_issued",
            ApplicationState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationState::CertificateIssued | ApplicationState::Rejected
        )
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPhase {
    One,
    Two,
}

impl PaymentPhase {
    pub fn fee_thb(&self) -> u64 {
        match self {
            PaymentPhase::One => PHASE_ONE_FEE_THB,
            PaymentPhase::Two => PHASE_TWO_FEE_THB,
        }
    }
}

impl fmt::Display for PaymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentPhase::One => f.write_str("1"),
            PaymentPhase::Two => f.write_str("2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub phase: PaymentPhase,
    pub amount_thb: u64,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub paid_at_ms: Option<i64>,
}

impl PaymentRecord {
    fn pending(phase: PaymentPhase) -> Self {
        Self {
            phase,
            amount_thb: phase.fee_thb(),
            status: PaymentStatus::Pending,
            reference: None,
            paid_at_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub reviewer_id: String,
    pub decision: ReviewDecision,
    pub comments: Option<String>,
    pub decided_at_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReviewRecord {
    pub rejection_count: u32,
    pub reviews: Vec<ReviewRecord>,
}

impl DocumentReviewRecord {
    pub fn approved(&self) -> bool {
        self.reviews
            .last()
            .is_some_and(|review| review.decision == ReviewDecision::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionMode {
    Remote,
    OnSite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub mode: InspectionMode,
    pub inspector_id: String,
    pub scheduled_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub score: Option<u32>,
    pub passed: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_number: String,
    pub issued_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from_state: ApplicationState,
    pub to_state: ApplicationState,
    pub action: Action,
    pub actor_id: String,
    pub actor_role: Role,
    pub occurred_at_ms: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationIntake {
    pub farm_name: String,
    pub crop: String,
    pub province: String,
}

/// Collaborator facts gathered by the engine before apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardFacts {
    pub payment_reference_settled: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct TransitionCommand {
    pub action: Action,
    pub actor: ActorIdentity,
    pub actor_role: Role,
    pub payload: ActionPayload,
    pub occurred_at_ms: i64,
    pub facts: GuardFacts,
}

/// The certification application aggregate. Fields stay private: every
/// mutation funnels through [`Application::apply_transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    application_number: String,
    farmer_id: String,
    intake: ApplicationIntake,
    state: ApplicationState,
    version: u64,
    history: Vec<HistoryEntry>,
    payments: Vec<PaymentRecord>,
    document_review: DocumentReviewRecord,
    inspections: Vec<InspectionRecord>,
    certificate: Option<Certificate>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl Application {
    pub fn new(
        application_number: impl Into<String>,
        farmer_id: impl Into<String>,
        intake: ApplicationIntake,
        now_ms: i64,
    ) -> Self {
        Self {
            application_number: application_number.into(),
            farmer_id: farmer_id.into(),
            intake,
            state: ApplicationState::Draft,
            version: 1,
            history: Vec::new(),
            payments: Vec::new(),
            document_review: DocumentReviewRecord::default(),
            inspections: Vec::new(),
            certificate: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn application_number(&self) -> &str {
        &self.application_number
    }

    pub fn farmer_id(&self) -> &str {
        &self.farmer_id
    }

    pub fn intake(&self) -> &ApplicationIntake {
        &self.intake
    }

    pub fn state(&self) -> ApplicationState {
        self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    pub fn document_review(&self) -> &DocumentReviewRecord {
        &self.document_review
    }

    pub fn inspections(&self) -> &[InspectionRecord] {
        &self.inspections
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn updated_at_ms(&self) -> i64 {
        self.updated_at_ms
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Read-only check for portals. Guards are not evaluated here; an
    /// offered action can still come back `GUARD_FAILED` when executed.
    pub fn can_transition(&self, action: Action, role: Role) -> bool {
        find_rule(self.state, action).is_some_and(|rule| rule.allowed_roles.contains(&role))
    }

    pub fn available_actions(&self, role: Role) -> Vec<Action> {
        rules_from(self.state)
            .filter(|rule| rule.allowed_roles.contains(&role))
            .map(|rule| rule.action)
            .collect()
    }

    /// Validates the command against the table and the gating policies and
    /// returns the next snapshot. `self` is never mutated.
    pub fn apply_transition(&self, cmd: &TransitionCommand) -> DomainResult<Application> {
        let rule = find_rule(self.state, cmd.action).ok_or(DomainError::InvalidTransition {
            state: self.state,
            action: cmd.action,
        })?;
        if !rule.allowed_roles.contains(&cmd.actor_role) {
            return Err(DomainError::Forbidden {
                action: cmd.action,
                role: cmd.actor_role,
            });
        }
        validate_payload(cmd.action, &cmd.payload)?;
        self.check_payment_phase(cmd)?;
        for guard in rule.guards {
            self.evaluate_guard(*guard, cmd)?;
        }

        let target = self.resolve_target(rule.to, cmd.action);
        let mut next = self.clone();
        next.apply_effects(cmd)?;
        next.history.push(HistoryEntry {
            from_state: self.state,
            to_state: target,
            action: cmd.action,
            actor_id: cmd.actor.user_id.clone(),
            actor_role: cmd.actor_role,
            occurred_at_ms: cmd.occurred_at_ms,
            notes: cmd.payload.history_note(),
        });
        next.state = target;
        next.version += 1;
        next.updated_at_ms = cmd.occurred_at_ms;
        Ok(next)
    }

    fn expected_payment_phase(&self) -> Option<PaymentPhase> {
        match self.state {
            ApplicationState::Submitted
            | ApplicationState::PaymentPending1
            | ApplicationState::PaymentProcessing1 => Some(PaymentPhase::One),
            ApplicationState::DocumentApproved
            | ApplicationState::PaymentPending2
            | ApplicationState::PaymentProcessing2 => Some(PaymentPhase::Two),
            _ => None,
        }
    }

    fn check_payment_phase(&self, cmd: &TransitionCommand) -> DomainResult<()> {
        let Some(payment) = cmd.payload.as_payment() else {
            return Ok(());
        };
        match self.expected_payment_phase() {
            Some(expected) if payment.phase == expected => Ok(()),
            _ => Err(DomainError::Validation(format!(
                "payment phase {} does not match application stage '{}'",
                payment.phase, self.state
            ))),
        }
    }

    fn evaluate_guard(&self, guard: Guard, cmd: &TransitionCommand) -> DomainResult<()> {
        let outcome = match guard {
            Guard::PaymentSettled => {
                let payment = cmd
                    .payload
                    .as_payment()
                    .ok_or_else(|| DomainError::Validation("payment payload required".to_string()))?;
                gating::payment_settled(
                    payment.phase,
                    payment.amount_thb.unwrap_or(0),
                    cmd.facts.payment_reference_settled.unwrap_or(false),
                )
            }
            Guard::PaymentOrdering => {
                gating::payment_ordering(&self.payments, &self.document_review)
            }
            Guard::InspectionOrdering => {
                let requested = match cmd.action {
                    Action::RequireOnSite => InspectionMode::OnSite,
                    _ => InspectionMode::Remote,
                };
                gating::inspection_ordering(&self.inspections, requested)
            }
            Guard::InspectionPassed => gating::inspection_passed(&self.inspections),
        };
        outcome.map_err(DomainError::GuardFailed)
    }

    fn resolve_target(&self, nominal: ApplicationState, action: Action) -> ApplicationState {
        if action == Action::DocumentReviewReject {
            let next_count = self.document_review.rejection_count + 1;
            if gating::rejection_route(next_count) == RejectionRoute::Terminal {
                return ApplicationState::Rejected;
            }
        }
        nominal
    }

    fn apply_effects(&mut self, cmd: &TransitionCommand) -> DomainResult<()> {
        match cmd.action {
            Action::RequestPayment => {
                if let Some(payment) = cmd.payload.as_payment() {
                    self.upsert_payment(payment.phase);
                }
            }
            Action::PaymentStarted => {
                if let Some(payment) = cmd.payload.as_payment() {
                    let record = self.upsert_payment(payment.phase);
                    record.status = PaymentStatus::Processing;
                    record.reference = payment.reference.clone();
                }
            }
            Action::PaymentConfirmed => {
                if let Some(payment) = cmd.payload.as_payment() {
                    let occurred_at_ms = cmd.occurred_at_ms;
                    let amount = payment.amount_thb.unwrap_or(payment.phase.fee_thb());
                    let reference = payment.reference.clone();
                    let record = self.upsert_payment(payment.phase);
                    record.status = PaymentStatus::Completed;
                    record.amount_thb = amount;
                    record.reference = reference;
                    record.paid_at_ms = Some(occurred_at_ms);
                }
            }
            Action::PaymentFailed => {
                if let Some(payment) = cmd.payload.as_payment() {
                    let reference = payment.reference.clone();
                    let record = self.upsert_payment(payment.phase);
                    record.status = PaymentStatus::Failed;
                    if reference.is_some() {
                        record.reference = reference;
                    }
                }
            }
            Action::DocumentReviewApprove => {
                self.push_review(cmd, ReviewDecision::Approved);
            }
            Action::DocumentReviewReject => {
                self.document_review.rejection_count += 1;
                self.push_review(cmd, ReviewDecision::Rejected);
            }
            Action::ScheduleInspection => {
                if let Some(schedule) = cmd.payload.as_schedule() {
                    self.inspections.push(InspectionRecord {
                        mode: InspectionMode::Remote,
                        inspector_id: schedule.inspector_id.clone(),
                        scheduled_at_ms: schedule.scheduled_at_ms,
                        completed_at_ms: None,
                        score: None,
                        passed: None,
                        notes: None,
                    });
                }
            }
            Action::RequireOnSite => {
                if let Some(escalation) = cmd.payload.as_escalation() {
                    let occurred_at_ms = cmd.occurred_at_ms;
                    let record = self.open_inspection(InspectionMode::Remote)?;
                    record.completed_at_ms = Some(occurred_at_ms);
                    record.score = Some(escalation.remote_score);
                    record.passed = Some(escalation.remote_passed);
                    record.notes = escalation.remote_notes.clone();
                    self.inspections.push(InspectionRecord {
                        mode: InspectionMode::OnSite,
                        inspector_id: escalation.inspector_id.clone(),
                        scheduled_at_ms: escalation.scheduled_at_ms,
                        completed_at_ms: None,
                        score: None,
                        passed: None,
                        notes: None,
                    });
                }
            }
            Action::CompleteInspection => {
                if let Some(result) = cmd.payload.as_inspection_result() {
                    let mode = match self.state {
                        ApplicationState::InspectionOnSite => InspectionMode::OnSite,
                        _ => InspectionMode::Remote,
                    };
                    let occurred_at_ms = cmd.occurred_at_ms;
                    let score = result.score;
                    let passed = result.passed;
                    let notes = result.notes.clone();
                    let record = self.open_inspection(mode)?;
                    record.completed_at_ms = Some(occurred_at_ms);
                    record.score = Some(score);
                    record.passed = Some(passed);
                    record.notes = notes;
                }
            }
            Action::GenerateCertificate => {
                if let Some(certificate) = cmd.payload.as_certificate() {
                    self.certificate = Some(Certificate {
                        certificate_number: certificate.certificate_number.clone(),
                        issued_at_ms: None,
                    });
                }
            }
            Action::IssueCertificate => {
                let certificate = self.certificate.as_mut().ok_or_else(|| {
                    DomainError::Validation("certificate has not been generated".to_string())
                })?;
                certificate.issued_at_ms = Some(cmd.occurred_at_ms);
            }
            Action::Submit
            | Action::DocumentResubmit
            | Action::BeginInspection
            | Action::SubmitForApproval
            | Action::Approve
            | Action::FinalReject => {}
        }
        Ok(())
    }

    fn push_review(&mut self, cmd: &TransitionCommand, decision: ReviewDecision) {
        let comments = cmd.payload.as_review().and_then(|review| review.comments.clone());
        self.document_review.reviews.push(ReviewRecord {
            reviewer_id: cmd.actor.user_id.clone(),
            decision,
            comments,
            decided_at_ms: cmd.occurred_at_ms,
        });
    }

    fn upsert_payment(&mut self, phase: PaymentPhase) -> &mut PaymentRecord {
        let index = match self.payments.iter().position(|record| record.phase == phase) {
            Some(index) => index,
            None => {
                self.payments.push(PaymentRecord::pending(phase));
                self.payments.len() - 1
            }
        };
        &mut self.payments[index]
    }

    fn open_inspection(&mut self, mode: InspectionMode) -> DomainResult<&mut InspectionRecord> {
        self.inspections
            .iter_mut()
            .rev()
            .find(|record| record.mode == mode && record.completed_at_ms.is_none())
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "no open {} inspection record",
                    match mode {
                        InspectionMode::Remote => "remote",
                        InspectionMode::OnSite => "on-site",
                    }
                ))
            })
    }

    #[cfg(test)]
    pub(crate) fn with_state(mut self, state: ApplicationState) -> Self {
        self.state = state;
        self
    }
}
