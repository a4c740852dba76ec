use std::collections::HashMap;
use std::sync::Arc;

use gacp_domain::DomainResult;
use gacp_domain::application::{Application, ApplicationState};
use gacp_domain::error::DomainError;
use gacp_domain::ports::BoxFuture;
use gacp_domain::ports::store::ApplicationStore;
use tokio::sync::RwLock;

/// Backing store for the `memory` data backend and for tests. The version
/// check and the insert run under one write lock.
#[derive(Default, Clone)]
pub struct InMemoryApplicationStore {
    items: Arc<RwLock<HashMap<String, Application>>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn create(&self, application: &Application) -> BoxFuture<'_, DomainResult<Application>> {
        let application = application.clone();
        let items = self.items.clone();
        Box::pin(async move {
            let mut items = items.write().await;
            if items.contains_key(application.application_number()) {
                return Err(DomainError::Persistence(format!(
                    "application '{}' already exists",
                    application.application_number()
                )));
            }
            items.insert(
                application.application_number().to_string(),
                application.clone(),
            );
            Ok(application)
        })
    }

    fn load(&self, application_number: &str) -> BoxFuture<'_, DomainResult<Option<Application>>> {
        let application_number = application_number.to_string();
        let items = self.items.clone();
        Box::pin(async move { Ok(items.read().await.get(&application_number).cloned()) })
    }

    fn save_with_version_check(
        &self,
        application: &Application,
        expected_version: u64,
    ) -> BoxFuture<'_, DomainResult<Application>> {
        let application = application.clone();
        let items = self.items.clone();
        Box::pin(async move {
            let mut items = items.write().await;
            let stored = items
                .get(application.application_number())
                .ok_or(DomainError::NotFound)?;
            if stored.version() != expected_version {
                return Err(DomainError::VersionConflict);
            }
            items.insert(
                application.application_number().to_string(),
                application.clone(),
            );
            Ok(application)
        })
    }

    fn list_by_state(
        &self,
        state: ApplicationState,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<Application>>> {
        let items = self.items.clone();
        Box::pin(async move {
            let items = items.read().await;
            let mut rows: Vec<_> = items
                .values()
                .filter(|application| application.state() == state)
                .cloned()
                .collect();
            rows.sort_by(|left, right| {
                left.updated_at_ms()
                    .cmp(&right.updated_at_ms())
                    .then_with(|| left.application_number().cmp(right.application_number()))
            });
            rows.truncate(limit);
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gacp_domain::application::ApplicationIntake;
    use gacp_domain::auth::Role;
    use gacp_domain::identity::ActorIdentity;
    use gacp_domain::transitions::{Action, ActionPayload};

    fn sample(number: &str) -> Application {
        Application::new(
            number,
            "farmer-1",
            ApplicationIntake {
                farm_name: "San Sai Plot".to_string(),
                crop: "ginger".to_string(),
                province: "Chiang Mai".to_string(),
            },
            1_000,
        )
    }

    fn submitted(application: &Application) -> Application {
        application
            .apply_transition(&gacp_domain::application::TransitionCommand {
                action: Action::Submit,
                actor: ActorIdentity::with_user_id("farmer-1"),
                actor_role: Role::Farmer,
                payload: ActionPayload::None,
                occurred_at_ms: 2_000,
                facts: Default::default(),
            })
            .expect("submit")
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let store = InMemoryApplicationStore::new();
        let application = sample("GACP-2026-AAAA0001");
        store.create(&application).await.expect("create");
        let loaded = store
            .load("GACP-2026-AAAA0001")
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded, application);
    }

    #[tokio::test]
    async fn duplicate_create_is_refused() {
        let store = InMemoryApplicationStore::new();
        let application = sample("GACP-2026-AAAA0002");
        store.create(&application).await.expect("create");
        let err = store.create(&application).await.expect_err("duplicate");
        assert!(matches!(err, DomainError::Persistence(_)));
    }

    #[tokio::test]
    async fn version_check_refuses_stale_writers() {
        let store = InMemoryApplicationStore::new();
        let application = sample("GACP-2026-AAAA0003");
        store.create(&application).await.expect("create");

        let next = submitted(&application);
        store
            .save_with_version_check(&next, application.version())
            .await
            .expect("first writer");

        // a second writer raced on the same loaded version
        let err = store
            .save_with_version_check(&next, application.version())
            .await
            .expect_err("stale version");
        assert!(matches!(err, DomainError::VersionConflict));
    }

    #[tokio::test]
    async fn list_by_state_filters_and_bounds() {
        let store = InMemoryApplicationStore::new();
        for index in 0..3 {
            store
                .create(&sample(&format!("GACP-2026-BBBB000{index}")))
                .await
                .expect("create");
        }
        let drafts = store
            .list_by_state(ApplicationState::Draft, 2)
            .await
            .expect("list");
        assert_eq!(drafts.len(), 2);
        let submitted = store
            .list_by_state(ApplicationState::Submitted, 10)
            .await
            .expect("list");
        assert!(submitted.is_empty());
    }
}
