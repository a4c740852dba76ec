use thiserror::Error;

use crate::ports::BoxFuture;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate generation failed: {0}")]
    Generation(String),
}

/// Mints the certificate number when an application enters the issuance
/// path. Rendering the printable certificate is someone else's job.
pub trait CertificateGenerator: Send + Sync {
    fn generate(&self, application_number: &str) -> BoxFuture<'_, Result<String, CertificateError>>;
}
