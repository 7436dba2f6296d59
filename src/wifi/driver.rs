use crate::error::WifiResult;
use crate::wifi::registry::{EventHandler, SubscriptionId};
use crate::wifi::types::{EventKind, WifiCredentials};
use std::sync::Arc;

/// Platform seam underneath the supervisor.
///
/// `connect` and `disconnect` only *request* a change; the outcome arrives later as a
/// [`crate::wifi::WifiEvent`] delivered to whatever handlers are subscribed at that moment,
/// on a context the caller does not control.
pub trait WifiDriver: Send + Sync + 'static {
    /// Ask the station to associate using `credentials`
    fn connect(&self, credentials: &WifiCredentials) -> WifiResult<()>;

    /// Drop the current association, if any
    fn disconnect(&self) -> WifiResult<()>;

    /// Whether the station is associated right now, asked directly rather than learned
    /// from events
    fn is_associated(&self) -> bool;

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> WifiResult<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId) -> WifiResult<()>;
}

impl<D: WifiDriver + ?Sized> WifiDriver for Arc<D> {
    fn connect(&self, credentials: &WifiCredentials) -> WifiResult<()> {
        (**self).connect(credentials)
    }

    fn disconnect(&self) -> WifiResult<()> {
        (**self).disconnect()
    }

    fn is_associated(&self) -> bool {
        (**self).is_associated()
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> WifiResult<SubscriptionId> {
        (**self).subscribe(kind, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> WifiResult<()> {
        (**self).unsubscribe(id)
    }
}

impl<D: WifiDriver + ?Sized> WifiDriver for Box<D> {
    fn connect(&self, credentials: &WifiCredentials) -> WifiResult<()> {
        (**self).connect(credentials)
    }

    fn disconnect(&self) -> WifiResult<()> {
        (**self).disconnect()
    }

    fn is_associated(&self) -> bool {
        (**self).is_associated()
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> WifiResult<SubscriptionId> {
        (**self).subscribe(kind, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> WifiResult<()> {
        (**self).unsubscribe(id)
    }
}
