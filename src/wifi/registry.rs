use crate::error::{WifiError, WifiResult};
use crate::wifi::types::{EventKind, WifiEvent};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked on the driver's notification context
pub type EventHandler = Arc<dyn Fn(&WifiEvent) + Send + Sync>;

/// Handle returned by a subscription, needed to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry {
    id: SubscriptionId,
    kind: EventKind,
    handler: EventHandler,
}

/// Table of live event handlers, shared between a driver's notification source and
/// whoever subscribes through it.
#[derive(Default)]
pub struct EventRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries();
        f.debug_struct("EventRegistry")
            .field(
                "subscriptions",
                &entries.iter().map(|e| (e.id, e.kind)).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push(Entry { id, kind, handler });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> WifiResult<()> {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(WifiError::UnknownSubscription(id.0));
        }
        Ok(())
    }

    /// Deliver `event` to every handler subscribed to its kind, in subscription order.
    /// Handlers run without the table locked. Returns how many were invoked.
    pub fn dispatch(&self, event: &WifiEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .entries()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| Arc::clone(&e.handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of live subscriptions for `kind`
    #[cfg(test)]
    pub fn count(&self, kind: EventKind) -> usize {
        self.entries().iter().filter(|e| e.kind == kind).count()
    }
}
