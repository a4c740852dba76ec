use std::time::Duration;
use thiserror::Error;

use crate::events::ApplicationTransitioned;
use crate::ports::BoxFuture;

#[derive(Debug, Error)]
pub enum EventQueueError {
    #[error("event queue unavailable: {0}")]
    Unavailable(String),
    #[error("event queue operation failed: {0}")]
    Operation(String),
    #[error("event serialization failed: {0}")]
    Serialization(String),
}

/// Fire-and-forget side of the notification pipeline; the engine publishes,
/// the worker consumes.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &ApplicationTransitioned)
    -> BoxFuture<'_, Result<(), EventQueueError>>;
}

pub trait EventQueue: Send + Sync {
    fn dequeue(
        &self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<ApplicationTransitioned>, EventQueueError>>;

    fn ack(&self, event_id: &str) -> BoxFuture<'_, Result<(), EventQueueError>>;
}
