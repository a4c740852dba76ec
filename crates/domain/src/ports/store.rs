use crate::DomainResult;
use crate::application::{Application, ApplicationState};
use crate::ports::BoxFuture;

/// Persistence port for the application aggregate. A snapshot is written as
/// one document; `save_with_version_check` must compare the stored version
/// against `expected_version` atomically and refuse the write on mismatch
/// with `DomainError::VersionConflict`.
pub trait ApplicationStore: Send + Sync {
    fn create(&self, application: &Application) -> BoxFuture<'_, DomainResult<Application>>;

    fn load(&self, application_number: &str) -> BoxFuture<'_, DomainResult<Option<Application>>>;

    fn save_with_version_check(
        &self,
        application: &Application,
        expected_version: u64,
    ) -> BoxFuture<'_, DomainResult<Application>>;

    fn list_by_state(
        &self,
        state: ApplicationState,
        limit: usize,
    ) -> BoxFuture<'_, DomainResult<Vec<Application>>>;
}
