//! Broadcast bus for the live audit feed.
//!
//! Every intercepted call produces one [`AuditEvent`], which is copied into
//! the bounded queue of every open Logging subscription.
//!
//! # Delivery policy
//!
//! `publish` never waits on a subscriber. Each subscription owns a bounded
//! queue (default capacity [`DEFAULT_EVENT_BUFFER`]); when a queue is full
//! the new event is dropped for that subscriber only and counted in
//! `bastion_events_dropped_total`. Delivery is therefore best effort per
//! subscriber but strictly ordered: a subscriber sees the events it does
//! receive in publish order.
//!
//! # Lifecycle
//!
//! A consumer holds at most one subscription. [`EventBus::subscribe`]
//! rejects a second one with [`BastionError::AlreadySubscribed`] so the
//! first stream is never silently orphaned. Dropping the [`Subscription`]
//! removes it from the registry, which covers every way a stream can end.

use crate::errors::BastionError;
use crate::observability::metrics;
use common::types::ConsumerId;
use parking_lot::Mutex;
use proto_gen::bastion::Event;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;
use tracing::{debug, info};

/// Default per-subscriber queue capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 20;

/// One intercepted call, as seen by the audit feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Unix timestamp (seconds) at which the call was intercepted.
    pub timestamp: i64,
    /// Peer address of the caller.
    pub host: String,
    pub consumer: ConsumerId,
    pub method: String,
}

impl AuditEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn now(host: impl Into<String>, consumer: ConsumerId, method: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            host: host.into(),
            consumer,
            method: method.into(),
        }
    }
}

impl From<AuditEvent> for Event {
    fn from(event: AuditEvent) -> Self {
        Event {
            timestamp: event.timestamp,
            consumer: event.consumer.into(),
            method: event.method,
            host: event.host,
        }
    }
}

/// Result of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

struct Sink {
    id: u64,
    tx: mpsc::Sender<AuditEvent>,
}

struct BusInner {
    capacity: usize,
    next_id: AtomicU64,
    sinks: Mutex<HashMap<ConsumerId, Sink>>,
}

impl BusInner {
    /// Remove the sink registered as (`consumer`, `id`). A newer subscription
    /// of the same consumer is left alone.
    fn remove(&self, consumer: &ConsumerId, id: u64) -> bool {
        let mut sinks = self.sinks.lock();
        let owned = sinks.get(consumer).is_some_and(|sink| sink.id == id);
        if owned {
            sinks.remove(consumer);
            metrics::set_event_subscribers_active(sinks.len());
        }
        owned
    }
}

/// Registry of Logging subscribers.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                sinks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Per-subscriber queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Register a subscription for `consumer`.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::AlreadySubscribed`] if `consumer` already has
    /// an open subscription.
    pub fn subscribe(&self, consumer: ConsumerId) -> Result<Subscription, BastionError> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut sinks = self.inner.sinks.lock();
            if sinks.contains_key(&consumer) {
                debug!(
                    target: "bastion.events",
                    consumer = %consumer,
                    "Rejected duplicate subscription"
                );
                return Err(BastionError::AlreadySubscribed(consumer.to_string()));
            }
            sinks.insert(consumer.clone(), Sink { id, tx });
            metrics::set_event_subscribers_active(sinks.len());
        }

        info!(target: "bastion.events", consumer = %consumer, "Subscribed to audit events");

        Ok(Subscription {
            consumer,
            id,
            rx,
            bus: Arc::clone(&self.inner),
            closed: false,
        })
    }

    /// Remove `subscription` from the registry and close its queue.
    ///
    /// Idempotent: returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: &mut Subscription) -> bool {
        subscription.close()
    }

    /// Deliver a copy of `event` to every registered subscriber.
    ///
    /// Never blocks. Subscribers added concurrently may or may not see this
    /// event but will see every later one.
    pub fn publish(&self, event: &AuditEvent) -> PublishReport {
        let mut report = PublishReport::default();
        let mut sinks = self.inner.sinks.lock();

        sinks.retain(|consumer, sink| match sink.tx.try_send(event.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                metrics::record_event_dropped();
                debug!(
                    target: "bastion.events",
                    consumer = %consumer,
                    "Subscriber queue full, event dropped"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                // Receiver is gone but its drop has not removed the sink yet
                debug!(target: "bastion.events", consumer = %consumer, "Pruned closed subscriber");
                false
            }
        });

        metrics::set_event_subscribers_active(sinks.len());
        report
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sinks.lock().len()
    }

    /// Does `consumer` currently hold a subscription?
    #[must_use]
    pub fn is_subscribed(&self, consumer: &str) -> bool {
        self.inner.sinks.lock().contains_key(consumer)
    }
}

/// A consumer's handle on the audit feed.
///
/// Yields events in publish order. Dropping the handle unsubscribes.
pub struct Subscription {
    consumer: ConsumerId,
    id: u64,
    rx: mpsc::Receiver<AuditEvent>,
    bus: Arc<BusInner>,
    closed: bool,
}

impl Subscription {
    #[must_use]
    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }

    /// Wait for the next event. Returns `None` once the subscription is
    /// closed and its queue drained.
    pub async fn recv(&mut self) -> Option<AuditEvent> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<AuditEvent> {
        self.rx.try_recv().ok()
    }

    /// Unsubscribe and close the queue. Idempotent.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.rx.close();
        let removed = self.bus.remove(&self.consumer, self.id);
        if removed {
            info!(
                target: "bastion.events",
                consumer = %self.consumer,
                "Unsubscribed from audit events"
            );
        }
        removed
    }
}

impl Stream for Subscription {
    type Item = AuditEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("consumer", &self.consumer)
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(name: &str) -> ConsumerId {
        ConsumerId::new(name).unwrap()
    }

    fn event(n: usize) -> AuditEvent {
        AuditEvent {
            timestamp: 0,
            host: "127.0.0.1:5000".to_string(),
            consumer: id("alice"),
            method: format!("/bastion.Biz/M{n}"),
        }
    }

    fn drain(subscription: &mut Subscription) -> Vec<AuditEvent> {
        std::iter::from_fn(|| subscription.try_recv()).collect()
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::default();
        let mut bob = bus.subscribe(id("bob")).unwrap();
        let mut carol = bus.subscribe(id("carol")).unwrap();

        let report = bus.publish(&event(1));
        assert_eq!(report, PublishReport { delivered: 2, dropped: 0 });

        assert_eq!(drain(&mut bob), vec![event(1)]);
        assert_eq!(drain(&mut carol), vec![event(1)]);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(&event(1)), PublishReport::default());
    }

    #[test]
    fn test_duplicate_subscription_rejected() {
        let bus = EventBus::default();
        let _first = bus.subscribe(id("bob")).unwrap();

        let second = bus.subscribe(id("bob"));
        assert_eq!(
            second.unwrap_err(),
            BastionError::AlreadySubscribed("bob".to_string())
        );
        // The original subscription is untouched
        assert!(bus.is_subscribed("bob"));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::default();
        let mut bob = bus.subscribe(id("bob")).unwrap();

        assert!(bus.unsubscribe(&mut bob));
        assert!(!bus.unsubscribe(&mut bob));
        assert!(!bus.is_subscribed("bob"));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::default();
        {
            let _bob = bus.subscribe(id("bob")).unwrap();
            assert!(bus.is_subscribed("bob"));
        }
        assert!(!bus.is_subscribed("bob"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_resubscribe_after_close() {
        let bus = EventBus::default();
        let mut first = bus.subscribe(id("bob")).unwrap();
        first.close();

        let mut second = bus.subscribe(id("bob")).unwrap();
        // Closing the stale handle again must not remove the new subscription
        assert!(!first.close());
        assert!(bus.is_subscribed("bob"));

        bus.publish(&event(7));
        assert_eq!(drain(&mut second), vec![event(7)]);
    }

    #[test]
    fn test_closed_subscription_receives_nothing_further() {
        let bus = EventBus::default();
        let mut bob = bus.subscribe(id("bob")).unwrap();
        bus.publish(&event(1));
        bob.close();
        bus.publish(&event(2));

        // Already-queued events drain, later ones never arrive
        assert_eq!(drain(&mut bob), vec![event(1)]);
    }

    #[test]
    fn test_full_queue_drops_newest_for_that_subscriber_only() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe(id("slow")).unwrap();
        let mut fast = bus.subscribe(id("fast")).unwrap();

        bus.publish(&event(1));
        assert_eq!(drain(&mut fast), vec![event(1)]);
        bus.publish(&event(2));
        assert_eq!(drain(&mut fast), vec![event(2)]);

        let report = bus.publish(&event(3));
        assert_eq!(report, PublishReport { delivered: 1, dropped: 1 });
        assert_eq!(drain(&mut fast), vec![event(3)]);

        // The slow subscriber kept the oldest events and is still registered
        assert_eq!(drain(&mut slow), vec![event(1), event(2)]);
        assert!(bus.is_subscribed("slow"));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let bus = EventBus::new(0);
        assert_eq!(bus.capacity(), 1);
    }

    #[test]
    fn test_event_into_proto() {
        let proto: Event = event(4).into();
        assert_eq!(proto.consumer, "alice");
        assert_eq!(proto.method, "/bastion.Biz/M4");
        assert_eq!(proto.host, "127.0.0.1:5000");
    }

    #[tokio::test]
    async fn test_recv_waits_for_publish() {
        let bus = EventBus::default();
        let mut bob = bus.subscribe(id("bob")).unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            publisher.publish(&event(9));
        });

        assert_eq!(bob.recv().await, Some(event(9)));
    }

    fn sequence_number(event: &AuditEvent) -> usize {
        event
            .method
            .trim_start_matches("/bastion.Biz/M")
            .parse()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_churn_sees_contiguous_runs() {
        const PUBLISHED: usize = 2000;
        let bus = EventBus::new(PUBLISHED);

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for n in 1..=PUBLISHED {
                    bus.publish(&event(n));
                    if n % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let churners: Vec<_> = (0..4)
            .map(|c| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    let mut runs = Vec::new();
                    for _ in 0..25 {
                        let mut subscription = bus.subscribe(id(&format!("churn{c}"))).unwrap();
                        tokio::task::yield_now().await;
                        assert!(bus.unsubscribe(&mut subscription));
                        runs.push(drain(&mut subscription));
                    }
                    runs
                })
            })
            .collect();

        publisher.await.unwrap();
        for churner in churners {
            for run in churner.await.unwrap() {
                // A subscription sees every event published between its
                // subscribe and unsubscribe, and nothing else
                let numbers: Vec<usize> = run.iter().map(sequence_number).collect();
                if let Some(&first) = numbers.first() {
                    let expected: Vec<usize> = (first..first + numbers.len()).collect();
                    assert_eq!(numbers, expected);
                }
            }
        }

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Subscribe(usize),
        Unsubscribe(usize),
        Publish,
    }

    fn op(subscribers: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..subscribers).prop_map(Op::Subscribe),
            (0..subscribers).prop_map(Op::Unsubscribe),
            Just(Op::Publish),
        ]
    }

    proptest! {
        /// Every subscriber receives exactly the events published while it was
        /// subscribed, once each, in publish order.
        #[test]
        fn prop_subscribers_see_exactly_their_window(
            ops in prop::collection::vec(op(4), 1..60),
        ) {
            // Large enough that nothing is dropped
            let bus = EventBus::new(128);
            let mut handles: Vec<Option<Subscription>> = (0..4).map(|_| None).collect();
            let mut expected: Vec<Vec<AuditEvent>> = vec![Vec::new(); 4];
            let mut received: Vec<Vec<AuditEvent>> = vec![Vec::new(); 4];
            let mut published = 0usize;

            for op in ops {
                match op {
                    Op::Subscribe(i) => {
                        if handles[i].is_none() {
                            handles[i] = Some(bus.subscribe(id(&format!("sub{i}"))).unwrap());
                        } else {
                            let duplicate = bus.subscribe(id(&format!("sub{i}"))).is_err();
                            prop_assert!(duplicate);
                        }
                    }
                    Op::Unsubscribe(i) => {
                        if let Some(mut handle) = handles[i].take() {
                            received[i].extend(drain(&mut handle));
                            prop_assert!(bus.unsubscribe(&mut handle));
                        }
                    }
                    Op::Publish => {
                        published += 1;
                        let e = event(published);
                        bus.publish(&e);
                        for (i, handle) in handles.iter().enumerate() {
                            if handle.is_some() {
                                expected[i].push(e.clone());
                            }
                        }
                    }
                }
            }

            for (i, handle) in handles.iter_mut().enumerate() {
                if let Some(handle) = handle.as_mut() {
                    received[i].extend(drain(handle));
                }
            }

            prop_assert_eq!(received, expected);
        }
    }
}
