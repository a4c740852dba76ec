use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use gacp_domain::ports::BoxFuture;
use gacp_domain::ports::payments::{PaymentSourceError, PaymentStatusSource};

/// Settlement ledger fed by the gateway callback route; the engine only
/// ever reads it.
#[derive(Default, Clone)]
pub struct InMemorySettlementLedger {
    settled: Arc<RwLock<HashSet<String>>>,
}

impl InMemorySettlementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_settled(&self, reference: impl Into<String>) {
        self.settled
            .write()
            .expect("settlement ledger lock")
            .insert(reference.into());
    }
}

impl PaymentStatusSource for InMemorySettlementLedger {
    fn is_settled(&self, reference: &str) -> BoxFuture<'_, Result<bool, PaymentSourceError>> {
        let reference = reference.to_string();
        let settled = self.settled.clone();
        Box::pin(async move {
            Ok(settled
                .read()
                .expect("settlement ledger lock")
                .contains(&reference))
        })
    }
}
