use thiserror::Error;

use crate::ports::BoxFuture;

#[derive(Debug, Error)]
pub enum PaymentSourceError {
    #[error("payment status source unavailable: {0}")]
    Unavailable(String),
}

/// Read-only confirmation that a gateway reference has settled. The engine
/// consults this while gathering guard facts; it never initiates payments.
pub trait PaymentStatusSource: Send + Sync {
    fn is_settled(&self, reference: &str) -> BoxFuture<'_, Result<bool, PaymentSourceError>>;
}
