use std::sync::Arc;

use tracing::warn;

use crate::DomainResult;
use crate::application::{
    Application, ApplicationIntake, GuardFacts, HistoryEntry, TransitionCommand,
};
use crate::auth::Role;
use crate::error::DomainError;
use crate::events::{ApplicationTransitioned, EVENT_APPLICATION_TRANSITIONED};
use crate::identity::ActorIdentity;
use crate::ports::certificates::CertificateGenerator;
use crate::ports::events::EventPublisher;
use crate::ports::evidence::InspectionEvidenceStore;
use crate::ports::payments::PaymentStatusSource;
use crate::ports::store::ApplicationStore;
use crate::transitions::{Action, ActionPayload, CertificatePayload};
use crate::util::{application_number, audit_hash, now_ms, uuid_v7_without_dashes};

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub application_number: String,
    pub action: Action,
    pub actor: ActorIdentity,
    pub actor_role: Role,
    pub payload: ActionPayload,
    /// Version the caller loaded, if it runs its own optimistic loop.
    pub expected_version: Option<u64>,
    pub occurred_at_ms: Option<i64>,
}

/// Runs one transition end-to-end: load, gather guard facts, apply, persist
/// with a version check, notify. Never retries a version conflict.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn ApplicationStore>,
    events: Arc<dyn EventPublisher>,
    payments: Arc<dyn PaymentStatusSource>,
    certificates: Arc<dyn CertificateGenerator>,
    evidence: Arc<dyn InspectionEvidenceStore>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        events: Arc<dyn EventPublisher>,
        payments: Arc<dyn PaymentStatusSource>,
        certificates: Arc<dyn CertificateGenerator>,
        evidence: Arc<dyn InspectionEvidenceStore>,
    ) -> Self {
        Self {
            store,
            events,
            payments,
            certificates,
            evidence,
        }
    }

    pub async fn create_application(
        &self,
        actor: &ActorIdentity,
        intake: ApplicationIntake,
    ) -> DomainResult<Application> {
        let now = now_ms();
        let number = application_number(now);
        let application = Application::new(number, actor.user_id.clone(), intake, now);
        self.store.create(&application).await
    }

    pub async fn execute(&self, request: TransitionRequest) -> DomainResult<Application> {
        let application = self
            .store
            .load(&request.application_number)
            .await?
            .ok_or(DomainError::NotFound)?;
        let loaded_version = application.version();
        if let Some(expected) = request.expected_version {
            if expected != loaded_version {
                return Err(DomainError::VersionConflict);
            }
        }

        let occurred_at_ms = request.occurred_at_ms.unwrap_or_else(now_ms);
        let facts = self.gather_facts(&request).await?;
        let payload = self.resolve_payload(&application, &request).await?;
        let cmd = TransitionCommand {
            action: request.action,
            actor: request.actor.clone(),
            actor_role: request.actor_role,
            payload,
            occurred_at_ms,
            facts,
        };

        let next = application.apply_transition(&cmd)?;
        let saved = self
            .store
            .save_with_version_check(&next, loaded_version)
            .await?;
        self.attach_evidence(&saved, &cmd).await;
        self.publish_transition(&saved).await;
        Ok(saved)
    }

    pub async fn get(&self, application_number: &str) -> DomainResult<Application> {
        self.store
            .load(application_number)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn history(&self, application_number: &str) -> DomainResult<Vec<HistoryEntry>> {
        let application = self.get(application_number).await?;
        Ok(application.history().to_vec())
    }

    pub async fn available_actions(
        &self,
        application_number: &str,
        role: Role,
    ) -> DomainResult<Vec<Action>> {
        let application = self.get(application_number).await?;
        Ok(application.available_actions(role))
    }

    /// Async facts the pure gating policies need, fetched before apply.
    async fn gather_facts(&self, request: &TransitionRequest) -> DomainResult<GuardFacts> {
        let mut facts = GuardFacts::default();
        if request.action == Action::PaymentConfirmed {
            if let Some(reference) = request
                .payload
                .as_payment()
                .and_then(|payment| payment.reference.as_deref())
            {
                let settled = self
                    .payments
                    .is_settled(reference)
                    .await
                    .map_err(|err| DomainError::Persistence(err.to_string()))?;
                facts.payment_reference_settled = Some(settled);
            }
        }
        Ok(facts)
    }

    /// `generate_certificate` is the one action whose payload the engine
    /// supplies itself: the number comes from the generator collaborator.
    async fn resolve_payload(
        &self,
        application: &Application,
        request: &TransitionRequest,
    ) -> DomainResult<ActionPayload> {
        if request.action != Action::GenerateCertificate {
            return Ok(request.payload.clone());
        }
        let certificate_number = self
            .certificates
            .generate(application.application_number())
            .await
            .map_err(|err| DomainError::Persistence(err.to_string()))?;
        Ok(ActionPayload::Certificate(CertificatePayload {
            certificate_number,
        }))
    }

    async fn attach_evidence(&self, application: &Application, cmd: &TransitionCommand) {
        if cmd.action != Action::CompleteInspection {
            return;
        }
        let Some(result) = cmd.payload.as_inspection_result() else {
            return;
        };
        if result.evidence_refs.is_empty() {
            return;
        }
        if let Err(err) = self
            .evidence
            .attach(application.application_number(), &result.evidence_refs)
            .await
        {
            warn!(
                error = %err,
                application_number = %application.application_number(),
                "failed to attach inspection evidence"
            );
        }
    }

    async fn publish_transition(&self, application: &Application) {
        let Some(entry) = application.history().last() else {
            return;
        };
        let audit_hash = match audit_hash(entry) {
            Ok(hash) => hash,
            Err(err) => {
                warn!(error = %err, "failed to hash history entry");
                String::new()
            }
        };
        let event = ApplicationTransitioned {
            event_id: uuid_v7_without_dashes(),
            event_type: EVENT_APPLICATION_TRANSITIONED.to_string(),
            application_number: application.application_number().to_string(),
            from_state: entry.from_state,
            to_state: entry.to_state,
            action: entry.action,
            actor_id: entry.actor_id.clone(),
            actor_role: entry.actor_role,
            occurred_at_ms: entry.occurred_at_ms,
            audit_hash,
        };
        if let Err(err) = self.events.publish(&event).await {
            warn!(
                error = %err,
                application_number = %application.application_number(),
                "failed to publish transition event"
            );
        }
    }
}
