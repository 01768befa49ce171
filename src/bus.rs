//! In-process publish/subscribe bus shared by sibling filter controls
//!
//! Delivery is synchronous: subscriber callbacks run to completion before
//! `publish` returns, in subscription order. The bus is explicitly injected
//! into every component that uses it; subscriptions are scoped handles that
//! the owning component releases at teardown.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Subscriber callback invoked with the published payload
pub type HandlerFn = Arc<dyn Fn(&Value) + Send + Sync>;

/// Bus topics known to the filter controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Selected-rule broadcasts between sibling filter controls
    ConnectionsFilters,
    /// Backend notifications (rule registry changes, among others)
    Notifications,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ConnectionsFilters => "connections_filters",
            Topic::Notifications => "notifications",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle identifying one subscription; required to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: Topic,
    id: u64,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<Topic, Vec<(u64, HandlerFn)>>,
}

/// Synchronous in-process publish/subscribe service
///
/// Cloning is cheap; clones share the same subscriber registry.
#[derive(Clone, Default)]
pub struct Bus {
    inner: Arc<Mutex<BusInner>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic, returning the handle needed to remove it
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(%topic, subscription_id = id, "Subscribed");
        SubscriptionHandle { topic, id }
    }

    /// Remove a subscription by handle
    ///
    /// Idempotent: removing an already-removed handle is a no-op.
    /// Returns true if a handler was actually removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut inner = self.inner.lock();
        let Some(handlers) = inner.subscribers.get_mut(&handle.topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != handle.id);
        let removed = handlers.len() < before;
        if removed {
            trace!(topic = %handle.topic, subscription_id = handle.id, "Unsubscribed");
        }
        removed
    }

    /// Publish a payload to every subscriber of a topic, in subscription order
    ///
    /// The subscriber list is snapshotted before delivery so handlers may
    /// subscribe, unsubscribe, or publish to other topics while running.
    pub fn publish(&self, topic: Topic, payload: Value) {
        let handlers: Vec<HandlerFn> = {
            let inner = self.inner.lock();
            inner
                .subscribers
                .get(&topic)
                .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        debug!(%topic, subscriber_count = handlers.len(), "Publishing");
        for handler in handlers {
            handler(&payload);
        }
    }

    /// Number of live subscriptions for a topic
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(&topic)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_subscribers_in_order() {
        let bus = Bus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(Topic::Notifications, move |_| {
                order.lock().push(tag);
            });
        }

        bus.publish(Topic::Notifications, json!({"event": "ping"}));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_publish_is_topic_scoped() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = hits.clone();
        bus.subscribe(Topic::ConnectionsFilters, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Topic::Notifications, json!({"event": "ping"}));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.publish(Topic::ConnectionsFilters, json!({"matched_rules": []}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_only_named_handler() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = hits.clone();
        let handle_a = bus.subscribe(Topic::Notifications, move |_| {
            hits_a.fetch_add(1, Ordering::SeqCst);
        });
        let hits_b = hits.clone();
        let _handle_b = bus.subscribe(Topic::Notifications, move |_| {
            hits_b.fetch_add(10, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(&handle_a));
        bus.publish(Topic::Notifications, json!({}));

        // Only the second handler fired
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(bus.subscriber_count(Topic::Notifications), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = Bus::new();
        let handle = bus.subscribe(Topic::ConnectionsFilters, |_| {});

        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));
        assert_eq!(bus.subscriber_count(Topic::ConnectionsFilters), 0);
    }

    #[test]
    fn test_handler_may_publish_to_another_topic() {
        let bus = Bus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let relay_bus = bus.clone();
        bus.subscribe(Topic::Notifications, move |_| {
            relay_bus.publish(Topic::ConnectionsFilters, json!({"matched_rules": []}));
        });

        let hits_clone = hits.clone();
        bus.subscribe(Topic::ConnectionsFilters, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Must not deadlock: subscriber list is snapshotted before delivery
        bus.publish(Topic::Notifications, json!({"event": "ping"}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = Bus::new();
        bus.publish(Topic::ConnectionsFilters, json!({"matched_rules": ["r1"]}));
    }
}
