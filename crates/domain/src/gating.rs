//! Pure gating policies: record snapshots in, allow/deny with a reason code
//! out. No I/O here; async facts are gathered by the engine beforehand.

use crate::application::{
    DocumentReviewRecord, InspectionMode, InspectionRecord, MAX_DOCUMENT_REJECTIONS, PaymentPhase,
    PaymentRecord, PaymentStatus,
};
use crate::error::GuardViolation;

pub const GUARD_PAYMENT_NOT_SETTLED: &str = "payment_not_settled";
pub const GUARD_PAYMENT_AMOUNT_MISMATCH: &str = "payment_amount_mismatch";
pub const GUARD_PAYMENT_ORDER: &str = "payment_order";
pub const GUARD_DOCUMENT_REVIEW_NOT_APPROVED: &str = "document_review_not_approved";
pub const GUARD_REMOTE_INSPECTION_REQUIRED: &str = "remote_inspection_required";
pub const GUARD_ON_SITE_ALREADY_SCHEDULED: &str = "on_site_already_scheduled";
pub const GUARD_INSPECTION_INCOMPLETE: &str = "inspection_incomplete";
pub const GUARD_INSPECTION_NOT_PASSED: &str = "inspection_not_passed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionRoute {
    Revision,
    Terminal,
}

/// Where a `document_review_reject` lands, given the count the rejection
/// would bring the application to. Exceeding the limit ends the application
/// instead of opening another revision cycle.
pub fn rejection_route(next_rejection_count: u32) -> RejectionRoute {
    if next_rejection_count > MAX_DOCUMENT_REJECTIONS {
        RejectionRoute::Terminal
    } else {
        RejectionRoute::Revision
    }
}

pub fn payment_settled(
    phase: PaymentPhase,
    amount_thb: u64,
    reference_settled: bool,
) -> Result<(), GuardViolation> {
    let expected = phase.fee_thb();
    if amount_thb != expected {
        return Err(GuardViolation::new(
            GUARD_PAYMENT_AMOUNT_MISMATCH,
            format!(
                "unexpected amount {amount_thb} THB for phase {phase} payment: the fee is {expected} THB"
            ),
        ));
    }
    if !reference_settled {
        return Err(GuardViolation::new(
            GUARD_PAYMENT_NOT_SETTLED,
            "the payment gateway has not settled this reference",
        ));
    }
    Ok(())
}

pub fn payment_ordering(
    payments: &[PaymentRecord],
    review: &DocumentReviewRecord,
) -> Result<(), GuardViolation> {
    let phase_one_completed = payments
        .iter()
        .any(|payment| payment.phase == PaymentPhase::One && payment.status == PaymentStatus::Completed);
    if !phase_one_completed {
        return Err(GuardViolation::new(
            GUARD_PAYMENT_ORDER,
            "cannot process second payment: first payment not completed",
        ));
    }
    if !review.approved() {
        return Err(GuardViolation::new(
            GUARD_DOCUMENT_REVIEW_NOT_APPROVED,
            "cannot process second payment: document review not approved",
        ));
    }
    Ok(())
}

/// A remote inspection must be on file before an on-site visit may be
/// booked, and at most one on-site visit exists per application.
pub fn inspection_ordering(
    inspections: &[InspectionRecord],
    requested: InspectionMode,
) -> Result<(), GuardViolation> {
    if requested == InspectionMode::Remote {
        return Ok(());
    }
    if !inspections
        .iter()
        .any(|record| record.mode == InspectionMode::Remote)
    {
        return Err(GuardViolation::new(
            GUARD_REMOTE_INSPECTION_REQUIRED,
            "an on-site inspection requires a remote inspection on file",
        ));
    }
    if inspections
        .iter()
        .any(|record| record.mode == InspectionMode::OnSite)
    {
        return Err(GuardViolation::new(
            GUARD_ON_SITE_ALREADY_SCHEDULED,
            "an on-site inspection has already been scheduled",
        ));
    }
    Ok(())
}

/// Approval needs a completed remote inspection and a passing result on the
/// most recent visit. An on-site record is conditional, never required.
pub fn inspection_passed(inspections: &[InspectionRecord]) -> Result<(), GuardViolation> {
    let remote_completed = inspections
        .iter()
        .any(|record| record.mode == InspectionMode::Remote && record.completed_at_ms.is_some());
    if !remote_completed {
        return Err(GuardViolation::new(
            GUARD_REMOTE_INSPECTION_REQUIRED,
            "cannot request approval: no completed remote inspection",
        ));
    }
    if inspections
        .iter()
        .any(|record| record.completed_at_ms.is_none())
    {
        return Err(GuardViolation::new(
            GUARD_INSPECTION_INCOMPLETE,
            "cannot request approval: an inspection is still open",
        ));
    }
    let last_passed = inspections
        .last()
        .and_then(|record| record.passed)
        .unwrap_or(false);
    if !last_passed {
        return Err(GuardViolation::new(
            GUARD_INSPECTION_NOT_PASSED,
            "cannot request approval: the latest inspection did not pass",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(phase: PaymentPhase, status: PaymentStatus) -> PaymentRecord {
        PaymentRecord {
            phase,
            amount_thb: phase.fee_thb(),
            status,
            reference: Some("ref".to_string()),
            paid_at_ms: Some(1_000),
        }
    }

    fn inspection(mode: InspectionMode, completed: bool, passed: bool) -> InspectionRecord {
        InspectionRecord {
            mode,
            inspector_id: "insp-1".to_string(),
            scheduled_at_ms: 1_000,
            completed_at_ms: completed.then_some(2_000),
            score: completed.then_some(80),
            passed: completed.then_some(passed),
            notes: None,
        }
    }

    fn approved_review() -> DocumentReviewRecord {
        let mut review = DocumentReviewRecord::default();
        review.reviews.push(crate::application::ReviewRecord {
            reviewer_id: "rev-1".to_string(),
            decision: crate::application::ReviewDecision::Approved,
            comments: None,
            decided_at_ms: 1_000,
        });
        review
    }

    #[test]
    fn rejection_routes_to_terminal_exactly_past_the_limit() {
        assert_eq!(rejection_route(1), RejectionRoute::Revision);
        assert_eq!(rejection_route(MAX_DOCUMENT_REJECTIONS), RejectionRoute::Revision);
        assert_eq!(
            rejection_route(MAX_DOCUMENT_REJECTIONS + 1),
            RejectionRoute::Terminal
        );
    }

    #[test]
    fn settlement_requires_the_fixed_fee() {
        assert!(payment_settled(PaymentPhase::One, 5_000, true).is_ok());
        let err = payment_settled(PaymentPhase::One, 4_999, true).unwrap_err();
        assert_eq!(err.code, GUARD_PAYMENT_AMOUNT_MISMATCH);
        let err = payment_settled(PaymentPhase::Two, 25_000, false).unwrap_err();
        assert_eq!(err.code, GUARD_PAYMENT_NOT_SETTLED);
    }

    #[test]
    fn second_payment_needs_first_completed_regardless_of_other_fields() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Failed,
        ] {
            let payments = vec![payment(PaymentPhase::One, status)];
            let err = payment_ordering(&payments, &approved_review()).unwrap_err();
            assert_eq!(err.code, GUARD_PAYMENT_ORDER);
        }
    }

    #[test]
    fn second_payment_needs_an_approved_review() {
        let payments = vec![payment(PaymentPhase::One, PaymentStatus::Completed)];
        let err = payment_ordering(&payments, &DocumentReviewRecord::default()).unwrap_err();
        assert_eq!(err.code, GUARD_DOCUMENT_REVIEW_NOT_APPROVED);
        assert!(payment_ordering(&payments, &approved_review()).is_ok());
    }

    #[test]
    fn on_site_requires_a_remote_record() {
        let err = inspection_ordering(&[], InspectionMode::OnSite).unwrap_err();
        assert_eq!(err.code, GUARD_REMOTE_INSPECTION_REQUIRED);

        let records = vec![inspection(InspectionMode::Remote, false, false)];
        assert!(inspection_ordering(&records, InspectionMode::OnSite).is_ok());
    }

    #[test]
    fn a_second_on_site_booking_is_refused() {
        let records = vec![
            inspection(InspectionMode::Remote, true, false),
            inspection(InspectionMode::OnSite, false, false),
        ];
        let err = inspection_ordering(&records, InspectionMode::OnSite).unwrap_err();
        assert_eq!(err.code, GUARD_ON_SITE_ALREADY_SCHEDULED);
    }

    #[test]
    fn approval_accepts_a_passed_remote_only_record() {
        let records = vec![inspection(InspectionMode::Remote, true, true)];
        assert!(inspection_passed(&records).is_ok());
    }

    #[test]
    fn approval_judges_the_latest_visit() {
        let records = vec![
            inspection(InspectionMode::Remote, true, false),
            inspection(InspectionMode::OnSite, true, true),
        ];
        assert!(inspection_passed(&records).is_ok());

        let records = vec![
            inspection(InspectionMode::Remote, true, true),
            inspection(InspectionMode::OnSite, true, false),
        ];
        let err = inspection_passed(&records).unwrap_err();
        assert_eq!(err.code, GUARD_INSPECTION_NOT_PASSED);
    }

    #[test]
    fn approval_refuses_open_inspections() {
        let records = vec![
            inspection(InspectionMode::Remote, true, true),
            inspection(InspectionMode::OnSite, false, false),
        ];
        let err = inspection_passed(&records).unwrap_err();
        assert_eq!(err.code, GUARD_INSPECTION_INCOMPLETE);
    }
}
