//! In-process publish/subscribe of click events.
//!
//! Built on `tokio::sync::broadcast`: publishing is always non-blocking for
//! the publisher (a slow subscriber simply lags and misses old messages,
//! it never backs up the sender). Subscribers register an optional
//! `{owner_id, link_id}` filter; delivery to a callback subscriber is
//! serialized through its own task so one subscriber's slowness or panic
//! never affects another.

use linkforty_core::events::{ClickEventPublisher, ClickEventRecord, EventFilter};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 4096;

pub struct EventBus {
    sender: broadcast::Sender<ClickEventRecord>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Raw filtered receiver stream, used by the WebSocket route to forward
    /// frames directly without an intervening callback task.
    pub fn subscribe_stream(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            inner: self.sender.subscribe(),
            filter,
        }
    }

    /// Callback-style subscription: spawns one task that serially invokes
    /// `callback` for each matching event. Returns a handle whose `Drop`
    /// cancels the subscription.
    pub fn subscribe<F>(&self, filter: EventFilter, mut callback: F) -> SubscriptionHandle
    where
        F: FnMut(ClickEventRecord) + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(record) => {
                        if filter.matches(&record) {
                            callback(record);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event bus subscriber lagged, dropping events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SubscriptionHandle { task }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ClickEventPublisher for EventBus {
    fn publish(&self, record: ClickEventRecord) {
        // `send` only errors when there are no receivers; that is the
        // normal case when nobody is watching `/api/debug/live`.
        if self.sender.send(record).is_err() {
            debug!("click event published with no active subscribers");
        }
        metrics::counter!("event_bus.published").increment(1);
    }
}

/// A `broadcast::Receiver` paired with the filter it was subscribed with.
pub struct FilteredReceiver {
    inner: broadcast::Receiver<ClickEventRecord>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Await the next event matching this subscriber's filter, skipping
    /// non-matching events and tolerating lag.
    pub async fn next(&mut self) -> Option<ClickEventRecord> {
        loop {
            match self.inner.recv().await {
                Ok(record) => {
                    if self.filter.matches(&record) {
                        return Some(record);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged, dropping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn sample_record(link_id: uuid::Uuid, owner_id: Option<uuid::Uuid>) -> ClickEventRecord {
        ClickEventRecord {
            event_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            link_id,
            short_code: "abc12345".into(),
            owner_id,
            ip: "8.8.8.8".into(),
            ua: "test-agent".into(),
            country: Some("US".into()),
            city: None,
            device_class: linkforty_core::types::DeviceClass::Ios,
            platform: Some("iOS".into()),
            redirect_url: "https://example.com".into(),
            reason: linkforty_core::types::ReasonCode::OriginalUrl,
            targeting_matched: true,
            utm: None,
            referer: None,
            language: None,
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(sample_record(Uuid::new_v4(), None));
    }

    #[tokio::test]
    async fn callback_subscriber_receives_matching_events_only() {
        let bus = EventBus::new();
        let link_id = Uuid::new_v4();
        let other_link = Uuid::new_v4();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let _handle = bus.subscribe(
            EventFilter {
                owner_id: None,
                link_id: Some(link_id),
            },
            move |_record| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.publish(sample_record(link_id, None));
        bus.publish(sample_record(other_link, None));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_handle_cancels_subscription() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let handle = bus.subscribe(EventFilter::default(), move |_record| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        bus.publish(sample_record(Uuid::new_v4(), None));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stream_subscriber_filters_by_owner_and_link() {
        let bus = EventBus::new();
        let owner = Uuid::new_v4();
        let link_id = Uuid::new_v4();
        let mut rx = bus.subscribe_stream(EventFilter {
            owner_id: Some(owner),
            link_id: Some(link_id),
        });

        bus.publish(sample_record(link_id, Some(Uuid::new_v4())));
        bus.publish(sample_record(link_id, Some(owner)));

        let received = rx.next().await.expect("expected one matching event");
        assert_eq!(received.owner_id, Some(owner));
        assert_eq!(received.link_id, link_id);
    }
}
