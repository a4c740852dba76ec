use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gacp_domain::ports::BoxFuture;
use gacp_domain::ports::evidence::{EvidenceStoreError, InspectionEvidenceStore};

/// Records which uploaded evidence objects belong to which application. The
/// objects themselves live in the external object store.
#[derive(Default, Clone)]
pub struct InMemoryEvidenceStore {
    attachments: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached_to(&self, application_number: &str) -> Vec<String> {
        self.attachments
            .read()
            .expect("evidence store lock")
            .get(application_number)
            .cloned()
            .unwrap_or_default()
    }
}

impl InspectionEvidenceStore for InMemoryEvidenceStore {
    fn attach(
        &self,
        application_number: &str,
        evidence_refs: &[String],
    ) -> BoxFuture<'_, Result<(), EvidenceStoreError>> {
        let application_number = application_number.to_string();
        let evidence_refs = evidence_refs.to_vec();
        let attachments = self.attachments.clone();
        Box::pin(async move {
            attachments
                .write()
                .expect("evidence store lock")
                .entry(application_number)
                .or_default()
                .extend(evidence_refs);
            Ok(())
        })
    }
}
