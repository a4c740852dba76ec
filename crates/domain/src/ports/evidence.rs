use thiserror::Error;

use crate::ports::BoxFuture;

#[derive(Debug, Error)]
pub enum EvidenceStoreError {
    #[error("evidence store unavailable: {0}")]
    Unavailable(String),
    #[error("evidence store operation failed: {0}")]
    Operation(String),
}

/// Links uploaded inspection evidence (photos, video captures) to an
/// application once an inspection completes. Storage itself is external.
pub trait InspectionEvidenceStore: Send + Sync {
    fn attach(
        &self,
        application_number: &str,
        evidence_refs: &[String],
    ) -> BoxFuture<'_, Result<(), EvidenceStoreError>>;
}
