//! Event Stream
//!
//! Multi-listener fan-out keyed by notification name. Listeners for a name
//! run in subscription order; one listener failing or panicking does not stop
//! the rest. A snapshot of the listener list is taken before invocation, so a
//! listener added during a dispatch only sees later deliveries.

use std::collections::HashMap;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A delivery accepted by the dispatch bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    /// Monotonic per-registry arrival number
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Callback interface for notification listeners
pub trait NotificationListener: Send + Sync {
    fn on_notification(&self, notification: &Notification) -> ListenerResult;

    /// Name used in logs when the listener fails
    fn listener_name(&self) -> String {
        "anonymous".to_string()
    }
}

impl<F> NotificationListener for F
where
    F: Fn(&Notification) + Send + Sync,
{
    fn on_notification(&self, notification: &Notification) -> ListenerResult {
        self(notification);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Cancellation token returned by `subscribe`/`on`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    name: String,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Dispatch counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Deliveries that passed the gate
    pub accepted: u64,
    /// Deliveries dropped for unobserved or suspended names
    pub dropped: u64,
    pub listener_invocations: u64,
    pub listener_failures: u64,
}

struct ListenerSlot {
    id: SubscriptionId,
    listener: Arc<dyn NotificationListener>,
}

/// Ordered, per-name listener fan-out
pub struct EventStream {
    listeners: RwLock<HashMap<String, Vec<ListenerSlot>>>,
    next_id: AtomicU64,
    stats: Mutex<DispatchStats>,
}

impl EventStream {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats: Mutex::new(DispatchStats::default()),
        }
    }

    /// Subscribe a listener to `name`
    pub fn subscribe(&self, name: &str, listener: Arc<dyn NotificationListener>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(name.to_string())
            .or_default()
            .push(ListenerSlot { id, listener });
        debug!("Subscribed listener {:?} to '{}'", id, name);

        Subscription {
            id,
            name: name.to_string(),
        }
    }

    /// Subscribe a closure to `name`
    pub fn on<F>(&self, name: &str, callback: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(name, Arc::new(callback))
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.listeners.write();
        let Some(slots) = listeners.get_mut(&subscription.name) else {
            return false;
        };

        let before = slots.len();
        slots.retain(|slot| slot.id != subscription.id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            listeners.remove(&subscription.name);
        }

        if removed {
            debug!("Unsubscribed listener {:?} from '{}'", subscription.id, subscription.name);
        }
        removed
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.read().get(name).map_or(0, Vec::len)
    }

    /// Remove every listener for every name
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Async stream of deliveries for `name`. The subscription is removed
    /// when the stream is dropped.
    pub fn stream(self: &Arc<Self>, name: &str) -> NotificationStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(name, Arc::new(ChannelListener { tx }));
        NotificationStream {
            inner: UnboundedReceiverStream::new(rx),
            events: Arc::downgrade(self),
            subscription: Some(subscription),
        }
    }

    /// Invoke every listener for the notification's name in subscription
    /// order. Returns the number of listeners that completed successfully.
    pub fn publish(&self, notification: &Notification) -> usize {
        let snapshot: Vec<(SubscriptionId, Arc<dyn NotificationListener>)> = self
            .listeners
            .read()
            .get(&notification.name)
            .map(|slots| {
                slots
                    .iter()
                    .map(|slot| (slot.id, Arc::clone(&slot.listener)))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        let mut failures = 0;

        for (id, listener) in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_notification(notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(
                        "Listener '{}' ({:?}) failed on '{}': {}",
                        listener.listener_name(),
                        id,
                        notification.name,
                        e
                    );
                }
                Err(_) => {
                    failures += 1;
                    error!(
                        "Listener '{}' ({:?}) panicked on '{}'",
                        listener.listener_name(),
                        id,
                        notification.name
                    );
                }
            }
        }

        let mut stats = self.stats.lock();
        stats.accepted += 1;
        stats.listener_invocations += snapshot.len() as u64;
        stats.listener_failures += failures;

        delivered
    }

    pub(crate) fn record_drop(&self) {
        self.stats.lock().dropped += 1;
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().clone()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

struct ChannelListener {
    tx: UnboundedSender<Notification>,
}

impl NotificationListener for ChannelListener {
    fn on_notification(&self, notification: &Notification) -> ListenerResult {
        self.tx
            .send(notification.clone())
            .map_err(|_| "notification stream receiver dropped".into())
    }

    fn listener_name(&self) -> String {
        "stream".to_string()
    }
}

/// Async view over deliveries for one name
pub struct NotificationStream {
    inner: UnboundedReceiverStream<Notification>,
    events: Weak<EventStream>,
    subscription: Option<Subscription>,
}

impl NotificationStream {
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }
}

impl Stream for NotificationStream {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        if let (Some(events), Some(subscription)) = (self.events.upgrade(), self.subscription.take()) {
            events.unsubscribe(&subscription);
        }
    }
}
