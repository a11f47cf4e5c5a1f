//! Per-correlation-id publish/subscribe for job lifecycle events.
//!
//! [`EventBus`] is an explicit broker instance injected into each
//! `WorkerHost`, so isolated hosts (and tests) never observe one another's
//! events. The result of a job still travels through `run_job`; the bus
//! only carries lifecycle notifications.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Lifecycle notification for a single job, keyed by its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobEvent {
    /// Synthetic first element of every subscription. A subscriber that has
    /// seen `Ready` knows its subscription was active before any event the
    /// publisher sends afterwards.
    Ready,
    /// The job was handed to a worker.
    Started { job: String },
    /// Job-defined progress payload.
    Progress { data: Value },
    /// Terminal success notification, published by gateways relaying a
    /// result to remote subscribers.
    Finished { result: Value },
    /// Terminal failure notification, the gateway-side counterpart of
    /// `Finished`.
    Failed { error: String },
}

/// Buffer size per correlation id; slow subscribers lag past this.
const CHANNEL_CAPACITY: usize = 64;

/// Broker fanning events out to the subscribers of one correlation id.
pub struct EventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<JobEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Publish an event to all current subscribers of `correlation_id`.
    ///
    /// Without subscribers the event is dropped; there is no history
    /// replay for late subscriptions.
    pub fn publish(&self, correlation_id: &str, event: JobEvent) {
        let mut channels = self.channels.lock().expect("event bus lock poisoned");
        let Some(sender) = channels.get(correlation_id) else {
            return;
        };
        if sender.send(event).is_err() {
            // The last subscriber is gone; drop the channel.
            channels.remove(correlation_id);
        }
    }

    /// Subscribe to events for `correlation_id`.
    ///
    /// The stream always yields [`JobEvent::Ready`] first and then forwards
    /// events until `cancel` fires. Each call is an independent
    /// subscription.
    pub fn subscribe(
        &self,
        correlation_id: &str,
        cancel: CancellationToken,
    ) -> BoxStream<'static, JobEvent> {
        let receiver = {
            let mut channels = self.channels.lock().expect("event bus lock poisoned");
            channels
                .entry(correlation_id.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };
        let feed = BroadcastStream::new(receiver)
            .filter_map(|event| std::future::ready(event.ok()));
        stream::once(std::future::ready(JobEvent::Ready))
            .chain(feed)
            .take_until(cancel.cancelled_owned())
            .boxed()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn ready_is_always_first() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe("job-1", CancellationToken::new());

        assert_eq!(stream.next().await, Some(JobEvent::Ready));

        bus.publish("job-1", JobEvent::Started { job: "echo".to_string() });
        let event = timeout(RECV_TIMEOUT, stream.next()).await.unwrap();
        assert_eq!(event, Some(JobEvent::Started { job: "echo".to_string() }));
    }

    #[tokio::test]
    async fn events_before_subscription_are_not_replayed() {
        let bus = EventBus::new();
        bus.publish("job-1", JobEvent::Started { job: "echo".to_string() });

        let cancel = CancellationToken::new();
        let mut stream = bus.subscribe("job-1", cancel.clone());
        assert_eq!(stream.next().await, Some(JobEvent::Ready));

        // Nothing but the sentinel: cancel and drain.
        cancel.cancel();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut first = bus.subscribe("job-1", CancellationToken::new());
        let mut second = bus.subscribe("job-1", CancellationToken::new());
        assert_eq!(first.next().await, Some(JobEvent::Ready));
        assert_eq!(second.next().await, Some(JobEvent::Ready));

        bus.publish("job-1", JobEvent::Progress { data: json!({"pct": 50}) });

        for stream in [&mut first, &mut second] {
            let event = timeout(RECV_TIMEOUT, stream.next()).await.unwrap();
            assert_eq!(event, Some(JobEvent::Progress { data: json!({"pct": 50}) }));
        }
    }

    #[tokio::test]
    async fn correlation_ids_are_isolated() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let mut other = bus.subscribe("job-2", cancel.clone());
        assert_eq!(other.next().await, Some(JobEvent::Ready));

        bus.publish("job-1", JobEvent::Started { job: "echo".to_string() });

        cancel.cancel();
        assert_eq!(other.next().await, None);
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let mut stream = bus.subscribe("job-1", cancel.clone());
        assert_eq!(stream.next().await, Some(JobEvent::Ready));

        cancel.cancel();
        assert_eq!(timeout(RECV_TIMEOUT, stream.next()).await.unwrap(), None);
    }

    #[test]
    fn event_wire_shape() {
        let json = serde_json::to_value(JobEvent::Started { job: "echo".to_string() }).unwrap();
        assert_eq!(json, json!({"status": "started", "job": "echo"}));

        let parsed: JobEvent = serde_json::from_value(json!({"status": "ready"})).unwrap();
        assert_eq!(parsed, JobEvent::Ready);
    }
}
