use std::sync::Arc;

use gacp_domain::DomainResult;
use gacp_domain::application::{Application, ApplicationState};
use gacp_domain::error::DomainError;
use gacp_domain::ports::BoxFuture;
use gacp_domain::ports::store::ApplicationStore;
use gacp_domain::util::format_ms_rfc3339;
use serde_json::Value;
use surrealdb::{
    Surreal,
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
};

use crate::db::DbConfig;

/// SurrealDB-backed application store. A snapshot is persisted as one
/// `application` row: the aggregate document plus the denormalized
/// `application_number`, `state` and `version` columns the conditional
/// write and the work-queue listing filter on.
pub struct SurrealApplicationStore {
    client: Arc<Surreal<Client>>,
}

impl SurrealApplicationStore {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        let db = Surreal::<Client>::init();
        db.connect::<Ws>(&db_config.endpoint).await?;
        db.signin(Root {
            username: &db_config.username,
            password: &db_config.password,
        })
        .await?;
        db.use_ns(&db_config.namespace)
            .use_db(&db_config.database)
            .await?;
        Ok(Self {
            client: Arc::new(db),
        })
    }

    fn map_surreal_error(err: surrealdb::Error) -> DomainError {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("already exists")
            || lowered.contains("duplicate")
            || lowered.contains("unique")
        {
            return DomainError::Persistence("application number already exists".to_string());
        }
        DomainError::Persistence(format!("surreal query failed: {message}"))
    }

    fn encode(application: &Application) -> DomainResult<Value> {
        serde_json::to_value(application).map_err(|err| {
            DomainError::Persistence(format!("failed to encode application: {err}"))
        })
    }

    fn decode_rows(rows: Vec<Value>) -> DomainResult<Vec<Application>> {
        rows.into_iter()
            .map(|row| {
                let doc = row
                    .get("doc")
                    .cloned()
                    .ok_or_else(|| DomainError::Persistence("row missing doc".to_string()))?;
                serde_json::from_value::<Application>(doc).map_err(|err| {
                    DomainError::Persistence(format!("invalid application row: {err}"))
                })
            })
            .collect()
    }
}

impl ApplicationStore for SurrealApplicationStore {
    fn create(&self, application: &Application) -> BoxFuture<'_, DomainResult<Application>> {
        let doc = match Self::encode(application) {
            Ok(doc) => doc,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let application = application.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "IF (SELECT VALUE application_number FROM application \
                        WHERE application_number = $application_number LIMIT 1)[0] != NONE {
                        THROW 'application number already exists'
                     };
                     CREATE application SET \
                        application_number = $application_number, \
                        state = $state, \
                        version = $version, \
                        doc = $doc, \
                        created_at = <datetime>$created_at, \
                        updated_at = <datetime>$updated_at;
                     SELECT doc FROM application \
                        WHERE application_number = $application_number LIMIT 1;",
                )
                .bind((
                    "application_number",
                    application.application_number().to_string(),
                ))
                .bind(("state", application.state().as_str().to_string()))
                .bind(("version", application.version() as i64))
                .bind(("doc", doc))
                .bind(("created_at", format_ms_rfc3339(application.created_at_ms())))
                .bind(("updated_at", format_ms_rfc3339(application.updated_at_ms())))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(2)
                .map_err(|err| DomainError::Persistence(format!("invalid query result: {err}")))?;
            Self::decode_rows(rows)?
                .pop()
                .ok_or_else(|| DomainError::Persistence("create returned no row".to_string()))
        })
    }

    fn load(&self, application_number: &str) -> BoxFuture<'_, DomainResult<Option<Application>>> {
        let application_number = application_number.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT doc FROM application \
                        WHERE application_number = $application_number LIMIT 1",
                )
                .bind(("application_number", application_number))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Persistence(format!("invalid query result: {err}")))?;
            Ok(Self::decode_rows(rows)?.pop())
        })
    }

    fn save_with_version_check(
        &self,
        application: &Application,
        expected_version: u64,
    ) -> BoxFuture<'_, DomainResult<Application>> {
        let doc = match Self::encode(application) {
            Ok(doc) => doc,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let application = application.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE application SET \
                        state = $state, \
                        version = $version, \
                        doc = $doc, \
                        updated_at = <datetime>$updated_at \
                     WHERE application_number = $application_number \
                        AND version = $expected_version \
                     RETURN AFTER;",
                )
                .bind((
                    "application_number",
                    application.application_number().to_string(),
                ))
                .bind(("state", application.state().as_str().to_string()))
                .bind(("version", application.version() as i64))
                .bind(("expected_version", expected_version as i64))
                .bind(("doc", doc))
                .bind(("updated_at", format_ms_rfc3339(application.updated_at_ms())))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Persistence(format!("invalid query result: {err}")))?;
            if !rows.is_empty() {
                return Ok(application);
            }

            // the conditional write matched nothing: missing row or a racer
            let mut response = client
                .query(
                    "SELECT version FROM application \
                        WHERE application_number = $application_number LIMIT 1",
                )
                .bind((
                    "application_number",
                    application.application_number().to_string(),
                ))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Persistence(format!("invalid query result: {err}")))?;
            if rows.is_empty() {
                Err(DomainError::NotFound)
            } else {
                Err(DomainError::VersionConflict)
            }
        })
    }

    fn list_by_state(
        &self,
        state: ApplicationState,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<Application>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT doc FROM application WHERE state = $state \
                        ORDER BY updated_at ASC LIMIT $limit",
                )
                .bind(("state", state.as_str().to_string()))
                .bind(("limit", limit as i64))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Persistence(format!("invalid query result: {err}")))?;
            Self::decode_rows(rows)
        })
    }
}
