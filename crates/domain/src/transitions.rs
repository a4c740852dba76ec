use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DomainResult;
use crate::application::{ApplicationState, PaymentPhase};
use crate::auth::Role;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Submit,
    RequestPayment,
    PaymentStarted,
    PaymentConfirmed,
    PaymentFailed,
    DocumentReviewApprove,
    DocumentReviewReject,
    DocumentResubmit,
    ScheduleInspection,
    BeginInspection,
    RequireOnSite,
    CompleteInspection,
    SubmitForApproval,
    Approve,
    FinalReject,
    GenerateCertificate,
    IssueCertificate,
}

impl Action {
    pub const ALL: [Action; 17] = [
        Action::Submit,
        Action::RequestPayment,
        Action::PaymentStarted,
        Action::PaymentConfirmed,
        Action::PaymentFailed,
        Action::DocumentReviewApprove,
        Action::DocumentReviewReject,
        Action::DocumentResubmit,
        Action::ScheduleInspection,
        Action::BeginInspection,
        Action::RequireOnSite,
        Action::CompleteInspection,
        Action::SubmitForApproval,
        Action::Approve,
        Action::FinalReject,
        Action::GenerateCertificate,
        Action::IssueCertificate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Submit => "submit",
            Action::RequestPayment => "request_payment",
            Action::PaymentStarted => "payment_started",
            Action::PaymentConfirmed => "payment_confirmed",
            Action::PaymentFailed => "payment_failed",
            Action::DocumentReviewApprove => "document_review_approve",
            Action::DocumentReviewReject => "document_review_reject",
            Action::DocumentResubmit => "document_resubmit",
            Action::ScheduleInspection => "schedule_inspection",
            Action::BeginInspection => "begin_inspection",
            Action::RequireOnSite => "require_on_site",
            Action::CompleteInspection => "complete_inspection",
            Action::SubmitForApproval => "submit_for_approval",
            Action::Approve => "approve",
            Action::FinalReject => "final_reject",
            Action::GenerateCertificate => "generate_certificate",
            Action::IssueCertificate => "issue_certificate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gating policies a rule consults before the transition is allowed. The
/// rejection-limit override is not listed here: it re-routes the target
/// instead of denying, and is consulted by the aggregate for every
/// `document_review_reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    PaymentSettled,
    PaymentOrdering,
    InspectionOrdering,
    InspectionPassed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub phase: PaymentPhase,
    pub amount_thb: Option<u64>,
    pub reference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecisionPayload {
    pub comments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInspectionPayload {
    pub inspector_id: String,
    pub scheduled_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionResultPayload {
    pub score: u32,
    pub passed: bool,
    pub notes: Option<String>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

/// Closes the remote session and books the field visit in one move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnSiteEscalationPayload {
    pub remote_score: u32,
    pub remote_passed: bool,
    pub remote_notes: Option<String>,
    pub inspector_id: String,
    pub scheduled_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalNotePayload {
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePayload {
    pub certificate_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    None,
    Payment(PaymentPayload),
    Review(ReviewDecisionPayload),
    ScheduleInspection(ScheduleInspectionPayload),
    InspectionResult(InspectionResultPayload),
    OnSiteEscalation(OnSiteEscalationPayload),
    Approval(ApprovalNotePayload),
    Certificate(CertificatePayload),
}

impl ActionPayload {
    pub fn as_payment(&self) -> Option<&PaymentPayload> {
        match self {
            ActionPayload::Payment(payment) => Some(payment),
            _ => None,
        }
    }

    pub fn as_review(&self) -> Option<&ReviewDecisionPayload> {
        match self {
            ActionPayload::Review(review) => Some(review),
            _ => None,
        }
    }

    pub fn as_schedule(&self) -> Option<&ScheduleInspectionPayload> {
        match self {
            ActionPayload::ScheduleInspection(schedule) => Some(schedule),
            _ => None,
        }
    }

    pub fn as_inspection_result(&self) -> Option<&InspectionResultPayload> {
        match self {
            ActionPayload::InspectionResult(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_escalation(&self) -> Option<&OnSiteEscalationPayload> {
        match self {
            ActionPayload::OnSiteEscalation(escalation) => Some(escalation),
            _ => None,
        }
    }

    pub fn as_approval(&self) -> Option<&ApprovalNotePayload> {
        match self {
            ActionPayload::Approval(approval) => Some(approval),
            _ => None,
        }
    }

    pub fn as_certificate(&self) -> Option<&CertificatePayload> {
        match self {
            ActionPayload::Certificate(certificate) => Some(certificate),
            _ => None,
        }
    }

    pub fn history_note(&self) -> Option<String> {
        match self {
            ActionPayload::Review(review) => review.comments.clone(),
            ActionPayload::Approval(approval) => approval.notes.clone(),
            ActionPayload::InspectionResult(result) => result.notes.clone(),
            ActionPayload::OnSiteEscalation(escalation) => escalation.remote_notes.clone(),
            _ => None,
        }
    }
}

/// Shape check for the payload an action carries, run before any guard.
pub fn validate_payload(action: Action, payload: &ActionPayload) -> DomainResult<()> {
    match action {
        Action::Submit
        | Action::DocumentResubmit
        | Action::BeginInspection
        | Action::SubmitForApproval
        | Action::IssueCertificate => expect_none(action, payload),
        Action::RequestPayment => {
            expect_payment(action, payload)?;
            Ok(())
        }
        Action::PaymentStarted => {
            let payment = expect_payment(action, payload)?;
            require_reference(action, payment)
        }
        Action::PaymentConfirmed => {
            let payment = expect_payment(action, payload)?;
            require_reference(action, payment)?;
            match payment.amount_thb {
                Some(amount) if amount > 0 => Ok(()),
                _ => Err(DomainError::Validation(format!(
                    "action '{action}' requires a positive amount_thb"
                ))),
            }
        }
        Action::PaymentFailed => {
            expect_payment(action, payload)?;
            Ok(())
        }
        Action::DocumentReviewApprove => {
            expect_review(action, payload)?;
            Ok(())
        }
        Action::DocumentReviewReject => {
            let review = expect_review(action, payload)?;
            match review.comments.as_deref() {
                Some(comments) if !comments.trim().is_empty() => Ok(()),
                _ => Err(DomainError::Validation(
                    "a rejection requires reviewer comments".to_string(),
                )),
            }
        }
        Action::ScheduleInspection => {
            let schedule = payload.as_schedule().ok_or_else(|| payload_error(action, "schedule"))?;
            validate_booking(&schedule.inspector_id, schedule.scheduled_at_ms)
        }
        Action::RequireOnSite => {
            let escalation = payload
                .as_escalation()
                .ok_or_else(|| payload_error(action, "on_site_escalation"))?;
            validate_score(escalation.remote_score)?;
            validate_booking(&escalation.inspector_id, escalation.scheduled_at_ms)
        }
        Action::CompleteInspection => {
            let result = payload
                .as_inspection_result()
                .ok_or_else(|| payload_error(action, "inspection_result"))?;
            validate_score(result.score)
        }
        Action::Approve => {
            payload.as_approval().ok_or_else(|| payload_error(action, "approval"))?;
            Ok(())
        }
        Action::FinalReject => {
            let approval = payload.as_approval().ok_or_else(|| payload_error(action, "approval"))?;
            match approval.notes.as_deref() {
                Some(notes) if !notes.trim().is_empty() => Ok(()),
                _ => Err(DomainError::Validation(
                    "a final rejection requires a stated reason".to_string(),
                )),
            }
        }
        Action::GenerateCertificate => {
            let certificate = payload
                .as_certificate()
                .ok_or_else(|| payload_error(action, "certificate"))?;
            if certificate.certificate_number.trim().is_empty() {
                return Err(DomainError::Validation(
                    "certificate_number cannot be empty".to_string(),
                ));
            }
            Ok(())
        }
    }
}

fn payload_error(action: Action, expected: &str) -> DomainError {
    DomainError::Validation(format!("action '{action}' requires a '{expected}' payload"))
}

fn expect_none(action: Action, payload: &ActionPayload) -> DomainResult<()> {
    match payload {
        ActionPayload::None => Ok(()),
        _ => Err(DomainError::Validation(format!(
            "action '{action}' does not take a payload"
        ))),
    }
}

fn expect_payment<'a>(action: Action, payload: &'a ActionPayload) -> DomainResult<&'a PaymentPayload> {
    payload.as_payment().ok_or_else(|| payload_error(action, "payment"))
}

fn expect_review<'a>(
    action: Action,
    payload: &'a ActionPayload,
) -> DomainResult<&'a ReviewDecisionPayload> {
    payload.as_review().ok_or_else(|| payload_error(action, "review"))
}

fn require_reference(action: Action, payment: &PaymentPayload) -> DomainResult<()> {
    match payment.reference.as_deref() {
        Some(reference) if !reference.trim().is_empty() => Ok(()),
        _ => Err(DomainError::Validation(format!(
            "action '{action}' requires a gateway reference"
        ))),
    }
}

fn validate_booking(inspector_id: &str, scheduled_at_ms: i64) -> DomainResult<()> {
    if inspector_id.trim().is_empty() {
        return Err(DomainError::Validation("inspector_id is required".to_string()));
    }
    if scheduled_at_ms <= 0 {
        return Err(DomainError::Validation(
            "scheduled_at_ms must be a positive epoch timestamp".to_string(),
        ));
    }
    Ok(())
}

fn validate_score(score: u32) -> DomainResult<()> {
    if score > 100 {
        return Err(DomainError::Validation(
            "inspection score must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: ApplicationState,
    pub action: Action,
    pub to: ApplicationState,
    pub allowed_roles: &'static [Role],
    pub guards: &'static [Guard],
}

const fn rule(
    from: ApplicationState,
    action: Action,
    to: ApplicationState,
    allowed_roles: &'static [Role],
    guards: &'static [Guard],
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        to,
        allowed_roles,
        guards,
    }
}

/// The single source of truth for "is action A valid from state S for role R".
const RULES: &[TransitionRule] = &[
    rule(
        ApplicationState::Draft,
        Action::Submit,
        ApplicationState::Submitted,
        &[Role::Farmer],
        &[],
    ),
    rule(
        ApplicationState::Submitted,
        Action::RequestPayment,
        ApplicationState::PaymentPending1,
        &[Role::Admin, Role::System],
        &[],
    ),
    rule(
        ApplicationState::PaymentPending1,
        Action::PaymentStarted,
        ApplicationState::PaymentProcessing1,
        &[Role::System],
        &[],
    ),
    rule(
        ApplicationState::PaymentPending1,
        Action::PaymentConfirmed,
        ApplicationState::DocumentReview,
        &[Role::System],
        &[Guard::PaymentSettled],
    ),
    rule(
        ApplicationState::PaymentProcessing1,
        Action::PaymentConfirmed,
        ApplicationState::DocumentReview,
        &[Role::System],
        &[Guard::PaymentSettled],
    ),
    rule(
        ApplicationState::PaymentProcessing1,
        Action::PaymentFailed,
        ApplicationState::PaymentPending1,
        &[Role::System],
        &[],
    ),
    rule(
        ApplicationState::DocumentReview,
        Action::DocumentReviewApprove,
        ApplicationState::DocumentApproved,
        &[Role::Reviewer, Role::Admin],
        &[],
    ),
    rule(
        ApplicationState::DocumentReview,
        Action::DocumentReviewReject,
        ApplicationState::DocumentRevision,
        &[Role::Reviewer, Role::Admin],
        &[],
    ),
    rule(
        ApplicationState::DocumentRevision,
        Action::DocumentResubmit,
        ApplicationState::DocumentReview,
        &[Role::Farmer],
        &[],
    ),
    rule(
        ApplicationState::DocumentRevision,
        Action::DocumentReviewReject,
        ApplicationState::DocumentRevision,
        &[Role::Reviewer, Role::Admin],
        &[],
    ),
    rule(
        ApplicationState::DocumentApproved,
        Action::RequestPayment,
        ApplicationState::PaymentPending2,
        &[Role::Admin, Role::System],
        &[],
    ),
    rule(
        ApplicationState::PaymentPending2,
        Action::PaymentConfirmed,
        ApplicationState::PaymentProcessing2,
        &[Role::System],
        &[Guard::PaymentOrdering, Guard::PaymentSettled],
    ),
    rule(
        ApplicationState::PaymentProcessing2,
        Action::PaymentFailed,
        ApplicationState::PaymentPending2,
        &[Role::System],
        &[],
    ),
    rule(
        ApplicationState::PaymentProcessing2,
        Action::ScheduleInspection,
        ApplicationState::InspectionScheduled,
        &[Role::Admin],
        &[],
    ),
    rule(
        ApplicationState::InspectionScheduled,
        Action::BeginInspection,
        ApplicationState::InspectionRemote,
        &[Role::Inspector],
        &[],
    ),
    rule(
        ApplicationState::InspectionRemote,
        Action::CompleteInspection,
        ApplicationState::InspectionCompleted,
        &[Role::Inspector],
        &[],
    ),
    rule(
        ApplicationState::InspectionRemote,
        Action::RequireOnSite,
        ApplicationState::InspectionOnSite,
        &[Role::Inspector],
        &[Guard::InspectionOrdering],
    ),
    rule(
        ApplicationState::InspectionOnSite,
        Action::CompleteInspection,
        ApplicationState::InspectionCompleted,
        &[Role::Inspector],
        &[],
    ),
    rule(
        ApplicationState::InspectionCompleted,
        Action::SubmitForApproval,
        ApplicationState::PendingApproval,
        &[Role::Inspector, Role::Admin],
        &[Guard::InspectionPassed],
    ),
    rule(
        ApplicationState::PendingApproval,
        Action::Approve,
        ApplicationState::Approved,
        &[Role::Approver],
        &[],
    ),
    rule(
        ApplicationState::PendingApproval,
        Action::FinalReject,
        ApplicationState::Rejected,
        &[Role::Approver],
        &[],
    ),
    rule(
        ApplicationState::Approved,
        Action::GenerateCertificate,
        ApplicationState::CertificateGenerating,
        &[Role::System, Role::Admin],
        &[],
    ),
    rule(
        ApplicationState::CertificateGenerating,
        Action::IssueCertificate,
        ApplicationState::CertificateIssued,
        &[Role::System, Role::Admin],
        &[],
    ),
];

pub fn transition_rules() -> &'static [TransitionRule] {
    RULES
}

pub fn find_rule(from: ApplicationState, action: Action) -> Option<&'static TransitionRule> {
    RULES
        .iter()
        .find(|rule| rule.from == from && rule.action == action)
}

pub fn rules_from(from: ApplicationState) -> impl Iterator<Item = &'static TransitionRule> {
    RULES.iter().filter(move |rule| rule.from == from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_rejection_is_the_only_in_place_rule() {
        let mut loops = Vec::new();
        for rule in transition_rules() {
            if rule.from == rule.to {
                loops.push((rule.from, rule.action));
            }
        }
        // a reviewer may reject a revision again without a resubmission
        assert_eq!(
            loops,
            vec![(ApplicationState::DocumentRevision, Action::DocumentReviewReject)]
        );
    }

    #[test]
    fn terminal_states_have_no_outgoing_rules() {
        for state in [ApplicationState::CertificateIssued, ApplicationState::Rejected] {
            assert_eq!(rules_from(state).count(), 0, "state '{state}' must be terminal");
        }
    }

    #[test]
    fn rule_lookup_is_unambiguous() {
        for rule in transition_rules() {
            let found = find_rule(rule.from, rule.action).expect("rule must be found");
            assert_eq!(found.to, rule.to);
            let duplicates = transition_rules()
                .iter()
                .filter(|candidate| candidate.from == rule.from && candidate.action == rule.action)
                .count();
            assert_eq!(duplicates, 1, "({}, {}) defined twice", rule.from, rule.action);
        }
    }

    #[test]
    fn every_non_terminal_state_is_reachable_and_has_an_exit() {
        for state in ApplicationState::ALL {
            if state.is_terminal() {
                continue;
            }
            assert!(
                rules_from(state).count() > 0,
                "state '{state}' has no outgoing rule"
            );
            if state != ApplicationState::Draft {
                assert!(
                    transition_rules().iter().any(|rule| rule.to == state),
                    "state '{state}' is unreachable"
                );
            }
        }
    }

    #[test]
    fn every_rule_names_at_least_one_role() {
        for rule in transition_rules() {
            assert!(
                !rule.allowed_roles.is_empty(),
                "rule ({}, {}) has no authorized role",
                rule.from,
                rule.action
            );
        }
    }

    #[test]
    fn confirmed_payment_payload_requires_amount_and_reference() {
        let missing_amount = ActionPayload::Payment(PaymentPayload {
            phase: PaymentPhase::One,
            amount_thb: None,
            reference: Some("ref-1".to_string()),
        });
        assert!(validate_payload(Action::PaymentConfirmed, &missing_amount).is_err());

        let missing_reference = ActionPayload::Payment(PaymentPayload {
            phase: PaymentPhase::One,
            amount_thb: Some(5_000),
            reference: None,
        });
        assert!(validate_payload(Action::PaymentConfirmed, &missing_reference).is_err());

        let complete = ActionPayload::Payment(PaymentPayload {
            phase: PaymentPhase::One,
            amount_thb: Some(5_000),
            reference: Some("ref-1".to_string()),
        });
        assert!(validate_payload(Action::PaymentConfirmed, &complete).is_ok());
    }

    #[test]
    fn rejection_requires_comments() {
        let silent = ActionPayload::Review(ReviewDecisionPayload { comments: None });
        assert!(validate_payload(Action::DocumentReviewReject, &silent).is_err());

        let commented = ActionPayload::Review(ReviewDecisionPayload {
            comments: Some("missing land title deed".to_string()),
        });
        assert!(validate_payload(Action::DocumentReviewReject, &commented).is_ok());
    }

    #[test]
    fn mismatched_payload_kind_is_rejected() {
        let payload = ActionPayload::Payment(PaymentPayload {
            phase: PaymentPhase::One,
            amount_thb: Some(5_000),
            reference: Some("ref-1".to_string()),
        });
        assert!(validate_payload(Action::Submit, &payload).is_err());
        assert!(validate_payload(Action::CompleteInspection, &payload).is_err());
    }
}
