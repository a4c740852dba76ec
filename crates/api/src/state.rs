use std::sync::Arc;

use gacp_domain::engine::WorkflowEngine;
use gacp_domain::idempotency::{IdempotencyConfig, IdempotencyService};
use gacp_domain::ports::events::EventPublisher;
use gacp_domain::ports::idempotency::IdempotencyStore;
use gacp_domain::ports::store::ApplicationStore;
use gacp_infra::certificates::LocalCertificateGenerator;
use gacp_infra::config::AppConfig;
use gacp_infra::db::{DbConfig, SurrealAdapter};
use gacp_infra::events::{InMemoryEventQueue, RedisEventQueue};
use gacp_infra::evidence::InMemoryEvidenceStore;
use gacp_infra::idempotency::RedisIdempotencyStore;
use gacp_infra::payments::InMemorySettlementLedger;
use gacp_infra::repositories::{InMemoryApplicationStore, SurrealApplicationStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub idempotency: IdempotencyService,
    pub applications: Arc<dyn ApplicationStore>,
    pub events: Arc<dyn EventPublisher>,
    pub settlements: InMemorySettlementLedger,
    pub evidence: Arc<InMemoryEvidenceStore>,
    pub db: Option<Arc<SurrealAdapter>>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let idempotency_store = RedisIdempotencyStore::connect(&config.redis_url).await?;
        let events: Arc<dyn EventPublisher> = Arc::new(
            RedisEventQueue::connect_with_prefix(
                &config.redis_url,
                config.event_queue_prefix.clone(),
            )
            .await?,
        );

        let (applications, db): (Arc<dyn ApplicationStore>, Option<Arc<SurrealAdapter>>) =
            if config.data_backend.eq_ignore_ascii_case("surreal") {
                let db_config = DbConfig::from_app_config(&config);
                let store = SurrealApplicationStore::new(&db_config).await?;
                (
                    Arc::new(store),
                    Some(Arc::new(SurrealAdapter::new(db_config))),
                )
            } else {
                (Arc::new(InMemoryApplicationStore::new()), None)
            };

        Ok(Self {
            config,
            idempotency: IdempotencyService::new(
                Arc::new(idempotency_store),
                IdempotencyConfig::default(),
            ),
            applications,
            events,
            settlements: InMemorySettlementLedger::new(),
            evidence: Arc::new(InMemoryEvidenceStore::new()),
            db,
        })
    }

    /// In-memory wiring for tests and the `memory` backend without Redis.
    pub fn with_idempotency_store(config: AppConfig, store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            config,
            idempotency: IdempotencyService::new(store, IdempotencyConfig::default()),
            applications: Arc::new(InMemoryApplicationStore::new()),
            events: Arc::new(InMemoryEventQueue::new()),
            settlements: InMemorySettlementLedger::new(),
            evidence: Arc::new(InMemoryEvidenceStore::new()),
            db: None,
        }
    }

    pub fn engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(
            self.applications.clone(),
            self.events.clone(),
            Arc::new(self.settlements.clone()),
            Arc::new(LocalCertificateGenerator::new()),
            self.evidence.clone(),
        )
    }
}
