use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gacp_domain::events::ApplicationTransitioned;
use gacp_domain::ports::BoxFuture;
use gacp_domain::ports::events::{EventPublisher, EventQueue, EventQueueError};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const DEFAULT_PREFIX: &str = "gacp:events";

/// Redis-backed notification feed. The API publishes, the worker consumes
/// with BRPOPLPUSH so an event survives a worker crash until it is acked.
#[derive(Clone)]
pub struct RedisEventQueue {
    manager: ConnectionManager,
    ready_key: String,
    processing_key: String,
    payload_key: String,
}

impl RedisEventQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, EventQueueError> {
        Self::connect_with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self, EventQueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| EventQueueError::Unavailable(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| EventQueueError::Unavailable(err.to_string()))?;
        let prefix = prefix.into();
        Ok(Self {
            manager,
            ready_key: format!("{prefix}:ready"),
            processing_key: format!("{prefix}:processing"),
            payload_key: format!("{prefix}:payloads"),
        })
    }

    fn serialize(event: &ApplicationTransitioned) -> Result<String, EventQueueError> {
        serde_json::to_string(event).map_err(|err| EventQueueError::Serialization(err.to_string()))
    }

    fn deserialize(payload: &str) -> Result<ApplicationTransitioned, EventQueueError> {
        serde_json::from_str(payload)
            .map_err(|err| EventQueueError::Serialization(err.to_string()))
    }

    pub async fn depth(&self) -> Result<(u64, u64), EventQueueError> {
        let mut conn = self.manager.clone();
        let ready: u64 = conn
            .llen(&self.ready_key)
            .await
            .map_err(|err| EventQueueError::Operation(err.to_string()))?;
        let processing: u64 = conn
            .llen(&self.processing_key)
            .await
            .map_err(|err| EventQueueError::Operation(err.to_string()))?;
        Ok((ready, processing))
    }
}

impl EventPublisher for RedisEventQueue {
    fn publish(
        &self,
        event: &ApplicationTransitioned,
    ) -> BoxFuture<'_, Result<(), EventQueueError>> {
        let payload = match Self::serialize(event) {
            Ok(payload) => payload,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let event_id = event.event_id.clone();
        let ready_key = self.ready_key.clone();
        let payload_key = self.payload_key.clone();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = redis::cmd("HSET")
                .arg(&payload_key)
                .arg(&event_id)
                .arg(payload)
                .query_async(&mut conn)
                .await
                .map_err(|err| EventQueueError::Operation(err.to_string()))?;
            let _: i64 = conn
                .rpush(ready_key, event_id)
                .await
                .map_err(|err| EventQueueError::Operation(err.to_string()))?;
            Ok(())
        })
    }
}

impl EventQueue for RedisEventQueue {
    fn dequeue(
        &self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<ApplicationTransitioned>, EventQueueError>> {
        let ready_key = self.ready_key.clone();
        let processing_key = self.processing_key.clone();
        let payload_key = self.payload_key.clone();
        let timeout_secs = timeout.as_secs() as usize;
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let result: Option<String> = redis::cmd("BRPOPLPUSH")
                .arg(&ready_key)
                .arg(&processing_key)
                .arg(timeout_secs)
                .query_async(&mut conn)
                .await
                .map_err(|err| EventQueueError::Operation(err.to_string()))?;
            match result {
                Some(event_id) => {
                    let payload: Option<String> = redis::cmd("HGET")
                        .arg(&payload_key)
                        .arg(&event_id)
                        .query_async(&mut conn)
                        .await
                        .map_err(|err| EventQueueError::Operation(err.to_string()))?;
                    let Some(payload) = payload else {
                        let _: i64 = redis::cmd("LREM")
                            .arg(&processing_key)
                            .arg(1)
                            .arg(&event_id)
                            .query_async(&mut conn)
                            .await
                            .map_err(|err| EventQueueError::Operation(err.to_string()))?;
                        return Err(EventQueueError::Operation(format!(
                            "missing payload for event_id {event_id}"
                        )));
                    };
                    Ok(Some(Self::deserialize(&payload)?))
                }
                None => Ok(None),
            }
        })
    }

    fn ack(&self, event_id: &str) -> BoxFuture<'_, Result<(), EventQueueError>> {
        let processing_key = self.processing_key.clone();
        let payload_key = self.payload_key.clone();
        let event_id = event_id.to_string();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = redis::cmd("LREM")
                .arg(&processing_key)
                .arg(1)
                .arg(&event_id)
                .query_async(&mut conn)
                .await
                .map_err(|err| EventQueueError::Operation(err.to_string()))?;
            let _: i64 = redis::cmd("HDEL")
                .arg(&payload_key)
                .arg(&event_id)
                .query_async(&mut conn)
                .await
                .map_err(|err| EventQueueError::Operation(err.to_string()))?;
            Ok(())
        })
    }
}

/// Process-local queue for the `memory` backend and the API tests.
#[derive(Default, Clone)]
pub struct InMemoryEventQueue {
    events: Arc<Mutex<VecDeque<ApplicationTransitioned>>>,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<ApplicationTransitioned> {
        self.events.lock().expect("event queue lock").iter().cloned().collect()
    }
}

impl EventPublisher for InMemoryEventQueue {
    fn publish(
        &self,
        event: &ApplicationTransitioned,
    ) -> BoxFuture<'_, Result<(), EventQueueError>> {
        let event = event.clone();
        let events = self.events.clone();
        Box::pin(async move {
            events.lock().expect("event queue lock").push_back(event);
            Ok(())
        })
    }
}

impl EventQueue for InMemoryEventQueue {
    fn dequeue(
        &self,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<ApplicationTransitioned>, EventQueueError>> {
        let events = self.events.clone();
        Box::pin(async move { Ok(events.lock().expect("event queue lock").pop_front()) })
    }

    fn ack(&self, _event_id: &str) -> BoxFuture<'_, Result<(), EventQueueError>> {
        Box::pin(async move { Ok(()) })
    }
}
