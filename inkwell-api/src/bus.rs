//! Notification Bus
//!
//! Carries post-mutation notifications to their subscribers and the
//! dispatcher's lifecycle events to observers.
//!
//! Cache invalidation is not a channel subscriber: [`NotificationBus::publish`]
//! applies it synchronously, before the event is broadcast and before the
//! mutating request's response is written. Socket connections subscribe to
//! the broadcast side.

use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::ActionCache;
use crate::events::{LifecycleEvent, NotificationEvent};
use crate::telemetry::metrics;

/// Shared notification bus. Cloning shares the same channels.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    notifications: broadcast::Sender<NotificationEvent>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    cache: ActionCache,
}

impl NotificationBus {
    /// Create a bus with the given channel capacity.
    ///
    /// Slow subscribers miss events once `capacity` are buffered (lagged).
    pub fn new(capacity: usize, cache: ActionCache) -> Self {
        let (notifications, _) = broadcast::channel(capacity);
        let (lifecycle, _) = broadcast::channel(capacity);
        Self {
            notifications,
            lifecycle,
            cache,
        }
    }

    pub fn cache(&self) -> &ActionCache {
        &self.cache
    }

    /// Publish a notification: invalidate the service's cache entries, then
    /// broadcast to live subscribers.
    pub fn publish(&self, event: NotificationEvent) {
        let dropped = self.cache.invalidate_service(&event.service);
        if let Some(metrics) = metrics() {
            metrics.record_cache_invalidation(&event.service, dropped);
            metrics.record_notification(&event.service, event.verb.as_str());
        }

        let service = event.service.clone();
        let verb = event.verb;
        match self.notifications.send(event) {
            Ok(receivers) => debug!(service = %service, verb = %verb, receivers, "Broadcast notification"),
            Err(_) => debug!(service = %service, verb = %verb, "No receivers for notification"),
        }
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.notifications.subscribe()
    }

    /// Emit a request/response lifecycle event. Dropped when unobserved.
    pub fn emit_lifecycle(&self, event: LifecycleEvent) {
        let _ = self.lifecycle.send(event);
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }
}
