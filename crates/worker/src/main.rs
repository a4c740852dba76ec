mod observability;

use std::time::Duration;

use gacp_domain::events::ApplicationTransitioned;
use gacp_domain::ports::events::EventQueue;
use gacp_domain::util::backoff_ms;
use gacp_infra::events::RedisEventQueue;
use gacp_infra::{config::AppConfig, logging::init_tracing};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    observability::init_metrics()?;

    let queue =
        RedisEventQueue::connect_with_prefix(&config.redis_url, config.event_queue_prefix.clone())
            .await?;
    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms.max(100));

    info!(prefix = %config.event_queue_prefix, "notification worker starting");

    let mut error_streak: u32 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            dequeued = queue.dequeue(poll_interval) => {
                match dequeued {
                    Ok(Some(event)) => {
                        error_streak = 0;
                        dispatch(&event);
                        if let Err(err) = queue.ack(&event.event_id).await {
                            warn!(error = %err, event_id = %event.event_id, "failed to ack event");
                        }
                        if let Ok((ready, processing)) = queue.depth().await {
                            observability::set_queue_depth_gauge(ready, processing);
                        }
                    }
                    Ok(None) => {
                        error_streak = 0;
                    }
                    Err(err) => {
                        error_streak = error_streak.saturating_add(1);
                        observability::register_queue_error();
                        let delay = backoff_ms(
                            config.worker_backoff_base_ms,
                            error_streak,
                            config.worker_backoff_max_ms,
                        );
                        warn!(error = %err, delay_ms = delay, "event dequeue failed, backing off");
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
    }

    info!("worker shutdown");
    Ok(())
}

/// Hands the event to the notification channel; delivery itself (email,
/// SMS, LINE) belongs to the notification service.
fn dispatch(event: &ApplicationTransitioned) {
    info!(
        event_id = %event.event_id,
        application_number = %event.application_number,
        action = %event.action,
        from_state = %event.from_state,
        to_state = %event.to_state,
        actor_role = %event.actor_role,
        "dispatching transition notification"
    );
    observability::register_event_dispatched(event.action.as_str(), event.to_state.as_str());
}
