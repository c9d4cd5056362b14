//! Storage lifecycle events
//!
//! Two delivery paths share one event type:
//! - synchronous listeners registered per event kind or for all kinds
//!   (`EventFilter::All`), called inline on the write path;
//! - a tokio broadcast channel for async subscribers (audit, observability).
//!
//! A listener that returns an error or panics is isolated: the failure is
//! logged and the remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEventKind {
    Set,
    Get,
    Remove,
    Clear,
    Error,
}

impl StorageEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Get => "get",
            Self::Remove => "remove",
            Self::Clear => "clear",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    pub kind: StorageEventKind,
    pub key: Option<String>,
    pub value: Option<Value>,
    pub success: bool,
    /// Why the operation happened or why it failed
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StorageEvent {
    pub fn new(kind: StorageEventKind, key: Option<&str>) -> Self {
        Self {
            kind,
            key: key.map(str::to_string),
            value: None,
            success: kind != StorageEventKind::Error,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn error(key: Option<&str>, reason: impl Into<String>) -> Self {
        Self::new(StorageEventKind::Error, key).with_reason(reason)
    }
}

/// Which events a listener receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Wildcard
    All,
    Only(StorageEventKind),
}

impl EventFilter {
    fn matches(&self, kind: StorageEventKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(k) => *k == kind,
        }
    }
}

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type StorageListener = Arc<dyn Fn(&StorageEvent) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    filter: EventFilter,
    listener: StorageListener,
}

/// Listener registry plus broadcast channel for storage events
pub struct StorageEventBus {
    listeners: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<StorageEvent>,
    subscriber_count: Arc<AtomicUsize>,
    listener_failures: AtomicU64,
}

impl StorageEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
            listener_failures: AtomicU64::new(0),
        }
    }

    pub fn on<F>(&self, filter: EventFilter, listener: F) -> ListenerId
    where
        F: Fn(&StorageEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(Registration {
            id,
            filter,
            listener: Arc::new(listener),
        });
        id
    }

    /// Returns `false` when the id is unknown
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: StorageEvent) {
        // Listeners are called outside the lock so they may register/unregister.
        let matching: Vec<StorageListener> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners
                .iter()
                .filter(|r| r.filter.matches(event.kind))
                .map(|r| r.listener.clone())
                .collect()
        };

        for listener in matching {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(kind = event.kind.as_str(), key = ?event.key, error = %err, "Storage event listener failed");
                }
                Err(_) => {
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(kind = event.kind.as_str(), key = ?event.key, "Storage event listener panicked");
                }
            }
        }

        let kind = event.kind.as_str();
        match self.sender.send(event) {
            Ok(count) => debug!(kind, subscribers = count, "Storage event published"),
            Err(_) => debug!(kind, "Storage event published (no subscribers)"),
        }
    }

    pub fn subscribe(&self) -> StorageEventSubscriber {
        let receiver = self.sender.subscribe();
        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        StorageEventSubscriber {
            receiver,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn listener_failures(&self) -> u64 {
        self.listener_failures.load(Ordering::Relaxed)
    }
}

impl Default for StorageEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Async receiver of storage events
pub struct StorageEventSubscriber {
    receiver: broadcast::Receiver<StorageEvent>,
    subscriber_count: Arc<AtomicUsize>,
}

impl StorageEventSubscriber {
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(missed = count, "Storage event subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for StorageEventSubscriber {
    fn drop(&mut self) {
        self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn filtered_and_wildcard_listeners() {
        let bus = StorageEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let only_set = seen.clone();
        bus.on(EventFilter::Only(StorageEventKind::Set), move |e| {
            only_set.lock().unwrap().push(format!("set-only:{}", e.kind.as_str()));
            Ok(())
        });
        let wildcard = seen.clone();
        bus.on(EventFilter::All, move |e| {
            wildcard.lock().unwrap().push(format!("all:{}", e.kind.as_str()));
            Ok(())
        });

        bus.emit(StorageEvent::new(StorageEventKind::Set, Some("k")));
        bus.emit(StorageEvent::new(StorageEventKind::Remove, Some("k")));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["set-only:set", "all:set", "all:remove"]
        );
    }

    #[test]
    fn failing_and_panicking_listeners_are_isolated() {
        let bus = StorageEventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.on(EventFilter::All, |_| Err("boom".into()));
        bus.on(EventFilter::All, |_| panic!("listener bug"));
        let counter = reached.clone();
        bus.on(EventFilter::All, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(StorageEvent::new(StorageEventKind::Clear, None));

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_failures(), 2);
    }

    #[test]
    fn off_removes_listener() {
        let bus = StorageEventBus::new();
        let id = bus.on(EventFilter::All, |_| Ok(()));
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = StorageEventBus::new();
        let mut subscriber = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(StorageEvent::new(StorageEventKind::Get, Some("k")));

        let received = tokio::time::timeout(std::time::Duration::from_millis(100), subscriber.recv())
            .await
            .expect("Timeout")
            .expect("No event");
        assert_eq!(received.kind, StorageEventKind::Get);
        assert_eq!(received.key.as_deref(), Some("k"));

        drop(subscriber);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
