use gacp_domain::ports::BoxFuture;
use gacp_domain::ports::certificates::{CertificateError, CertificateGenerator};
use gacp_domain::util::{now_ms, uuid_v7_without_dashes};
use time::OffsetDateTime;

/// Mints certificate numbers locally; the printable document is rendered by
/// the (external) certificate service from this number.
#[derive(Default, Clone)]
pub struct LocalCertificateGenerator;

impl LocalCertificateGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CertificateGenerator for LocalCertificateGenerator {
    fn generate(&self, application_number: &str) -> BoxFuture<'_, Result<String, CertificateError>> {
        let application_number = application_number.to_string();
        Box::pin(async move {
            let year = OffsetDateTime::from_unix_timestamp(now_ms() / 1_000)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH)
                .year();
            let suffix: String = uuid_v7_without_dashes()
                .chars()
                .rev()
                .take(8)
                .collect::<String>()
                .to_ascii_uppercase();
            let certificate_number = format!("GACP-CERT-{year}-{suffix}");
            tracing::info!(
                application_number,
                certificate_number,
                "minted certificate number"
            );
            Ok(certificate_number)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn minted_numbers_are_unique_and_prefixed() {
        let generator = LocalCertificateGenerator::new();
        let first = generator.generate("GACP-2026-AAAA0001").await.expect("mint");
        let second = generator.generate("GACP-2026-AAAA0001").await.expect("mint");
        assert!(first.starts_with("GACP-CERT-"));
        assert_ne!(first, second);
    }
}
