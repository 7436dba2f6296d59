//! Association lifecycle: blocking connect with indefinite retry, and automatic repair of
//! the link after it drops.

use crate::config;
use crate::error::WifiResult;
use crate::wifi::driver::WifiDriver;
use crate::wifi::registry::{EventHandler, SubscriptionId};
use crate::wifi::types::{ConnectionState, EventKind, WifiCredentials, WifiEvent};
use log::{debug, error, info, warn};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

/// Owns the association state of one station.
///
/// Only the supervisor transitions [`ConnectionState`]. Observers get a read-only view
/// through [`WifiSupervisor::watch_state`].
pub struct WifiSupervisor<D: WifiDriver> {
    inner: Arc<Inner<D>>,
}

struct Inner<D: WifiDriver> {
    driver: D,
    credentials: WifiCredentials,
    runtime: Handle,
    state: watch::Sender<ConnectionState>,
    /// Held for the whole of `connect_blocking`; serializes attempts.
    attempt: Mutex<()>,
    /// The standing disconnect subscription, while auto-reconnect is armed.
    standing: Mutex<Option<SubscriptionId>>,
    request_retry_delay: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D: WifiDriver> WifiSupervisor<D> {
    /// `runtime` hosts the reconnection units spawned after a link drop.
    pub fn new(driver: D, credentials: WifiCredentials, runtime: Handle) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(Inner {
                driver,
                credentials,
                runtime,
                state,
                attempt: Mutex::new(()),
                standing: Mutex::new(None),
                request_retry_delay: Duration::from_millis(config::CONNECT_REQUEST_RETRY_MS),
            }),
        }
    }

    /// Pause applied only when the driver rejects a connect request outright.
    #[cfg(test)]
    pub fn with_request_retry_delay(mut self, delay: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.request_retry_delay = delay;
        }
        self
    }

    /// Block until the station holds an address.
    ///
    /// Failed attempts are retried immediately and forever. The only error returned is a
    /// failure to register the attempt's event handlers. Must not be called from inside an
    /// async context.
    pub fn connect_blocking(&self) -> WifiResult<()> {
        self.inner.connect_blocking()
    }

    /// Arm a standing disconnect subscription that repairs the link in the background.
    /// Calling it again while armed is a no-op.
    ///
    /// A drop that happened after `connect_blocking` returned but before this call starts
    /// the repair immediately. If a repair later fails for good, the state becomes
    /// [`ConnectionState::Halted`].
    pub fn enable_auto_reconnect(&self) -> WifiResult<()> {
        Inner::arm_reconnect(&self.inner)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_auto_reconnect_armed(&self) -> bool {
        lock(&self.inner.standing).is_some()
    }
}

impl<D: WifiDriver> Inner<D> {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("wifi: state {previous:?} -> {state:?}");
        }
    }

    fn connect_blocking(&self) -> WifiResult<()> {
        let _attempt = lock(&self.attempt);

        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            if let Some(addr) = self.try_connection_once(attempt)? {
                info!(
                    "wifi: connected to {:?}, got ip {addr}",
                    self.credentials.ssid()
                );
                self.set_state(ConnectionState::Connected);
                return Ok(());
            }
            self.set_state(ConnectionState::Idle);
        }
    }

    /// One association attempt. `Ok(None)` means the attempt failed and should be retried.
    fn try_connection_once(&self, attempt: u64) -> WifiResult<Option<IpAddr>> {
        info!(
            "wifi: trying connection to {:?} (attempt {attempt})",
            self.credentials.ssid()
        );
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.driver.disconnect() {
            warn!("wifi: reset before attempt failed: {e}");
        }

        // Only drops events raised between subscribing and the connect request. A late
        // notification for the reset above still fails this attempt and costs one retry.
        let requested = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward: EventHandler = {
            let requested = Arc::clone(&requested);
            Arc::new(move |event: &WifiEvent| {
                if requested.load(Ordering::SeqCst) {
                    let _ = tx.send(event.clone());
                } else {
                    debug!("wifi: ignoring stale {event:?}");
                }
            })
        };

        let on_drop = self
            .driver
            .subscribe(EventKind::Disconnected, Arc::clone(&forward))?;
        let on_address = match self.driver.subscribe(EventKind::AddressAcquired, forward) {
            Ok(id) => id,
            Err(e) => {
                self.release(on_drop);
                return Err(e);
            }
        };

        requested.store(true, Ordering::SeqCst);
        let outcome = match self.driver.connect(&self.credentials) {
            Ok(()) => rx.blocking_recv(),
            Err(e) => {
                warn!("wifi: connect request rejected: {e}");
                None
            }
        };

        self.release(on_drop);
        self.release(on_address);

        match outcome {
            Some(WifiEvent::AddressAcquired(addr)) => Ok(Some(addr)),
            Some(WifiEvent::Disconnected { reason }) => {
                info!("wifi: connection attempt {attempt} failed: {reason}");
                Ok(None)
            }
            None => {
                if !self.request_retry_delay.is_zero() {
                    std::thread::sleep(self.request_retry_delay);
                }
                Ok(None)
            }
        }
    }

    fn release(&self, id: SubscriptionId) {
        if let Err(e) = self.driver.unsubscribe(id) {
            warn!("wifi: failed to remove handler {id}: {e}");
        }
    }

    fn arm_reconnect(this: &Arc<Self>) -> WifiResult<()> {
        {
            let mut standing = lock(&this.standing);
            if standing.is_some() {
                debug!("wifi: auto-reconnect already armed");
                return Ok(());
            }

            let weak = Arc::downgrade(this);
            let id = this.driver.subscribe(
                EventKind::Disconnected,
                Arc::new(move |event: &WifiEvent| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_link_lost(event);
                    }
                }),
            )?;
            *standing = Some(id);
        }
        info!("wifi: registered reconnection handler");

        // A drop between the last successful attempt and the subscription above raised
        // its notification while nobody was listening.
        if !this.driver.is_associated() {
            Arc::clone(this).on_link_lost(&WifiEvent::Disconnected {
                reason: "link lost before the reconnection handler was armed".into(),
            });
        }
        Ok(())
    }

    /// Runs on the driver's notification context. It must not remove its own
    /// subscription, so it claims the slot and leaves the unsubscribe to the unit.
    fn on_link_lost(self: Arc<Self>, event: &WifiEvent) {
        let Some(id) = lock(&self.standing).take() else {
            return;
        };

        match event {
            WifiEvent::Disconnected { reason } => {
                warn!("wifi: disconnected ({reason}), reconnecting")
            }
            other => warn!("wifi: unexpected {other:?}, reconnecting"),
        }
        self.set_state(ConnectionState::Idle);

        let runtime = self.runtime.clone();
        runtime.spawn_blocking(move || self.reconnect(id));
    }

    fn reconnect(self: Arc<Self>, id: SubscriptionId) {
        self.release(id);
        debug!("wifi: temporarily disabled reconnection handler");

        if let Err(e) = self.connect_blocking() {
            error!("wifi: reconnection aborted: {e}");
            self.set_state(ConnectionState::Halted);
            return;
        }
        if let Err(e) = Self::arm_reconnect(&self) {
            error!("wifi: failed to re-register reconnection handler: {e}");
            self.set_state(ConnectionState::Halted);
        }
    }
}

impl<D: WifiDriver> Drop for Inner<D> {
    fn drop(&mut self) {
        let standing = self
            .standing
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = standing {
            let _ = self.driver.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WifiError;
    use crate::wifi::driver::testing::{ScriptedDriver, wait_until};
    use crate::wifi::types::AuthThreshold;
    use tokio::runtime::{Builder, Runtime};

    fn runtime() -> Runtime {
        Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap()
    }

    fn credentials() -> WifiCredentials {
        WifiCredentials::new("sensor-ap", "correct horse", AuthThreshold::Wpa2).unwrap()
    }

    fn up() -> WifiEvent {
        WifiEvent::AddressAcquired("192.168.4.20".parse().unwrap())
    }

    fn down() -> WifiEvent {
        WifiEvent::Disconnected {
            reason: "beacon timeout".into(),
        }
    }

    fn supervisor(
        driver: &Arc<ScriptedDriver>,
        rt: &Runtime,
    ) -> WifiSupervisor<Arc<ScriptedDriver>> {
        WifiSupervisor::new(Arc::clone(driver), credentials(), rt.handle().clone())
            .with_request_retry_delay(Duration::ZERO)
    }

    #[test]
    fn connects_on_first_address() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        let sup = supervisor(&driver, &rt);

        sup.connect_blocking().unwrap();

        assert_eq!(sup.state(), ConnectionState::Connected);
        assert_eq!(driver.connects(), 1);
        assert_eq!(driver.disconnects(), 1);
    }

    #[test]
    fn retries_until_address_acquired() {
        let rt = runtime();
        let driver = ScriptedDriver::new([down(), down(), down(), up()]);
        let sup = supervisor(&driver, &rt);

        sup.connect_blocking().unwrap();

        assert_eq!(driver.connects(), 4);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[test]
    fn attempt_handlers_are_removed_before_returning() {
        let rt = runtime();
        let driver = ScriptedDriver::new([down(), up()]);
        let sup = supervisor(&driver, &rt);

        sup.connect_blocking().unwrap();

        assert_eq!(driver.subscriptions(EventKind::Disconnected), 0);
        assert_eq!(driver.subscriptions(EventKind::AddressAcquired), 0);
    }

    #[test]
    fn events_raised_before_the_request_are_ignored() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up(), up()]);
        driver.raise_on_next_subscribe(down());
        let sup = supervisor(&driver, &rt);

        sup.connect_blocking().unwrap();

        assert_eq!(driver.connects(), 1);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[test]
    fn rejected_connect_requests_are_retried() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        driver.fail_connects(2);
        let sup = supervisor(&driver, &rt);

        sup.connect_blocking().unwrap();

        assert_eq!(driver.connects(), 3);
    }

    #[test]
    fn registration_failure_is_surfaced_without_leaking_handlers() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        driver.fail_subscribe_from(1);
        let sup = supervisor(&driver, &rt);

        let err = sup.connect_blocking().unwrap_err();

        assert!(matches!(err, WifiError::NotificationRegistrationFailed { .. }));
        assert_eq!(driver.subscriptions(EventKind::Disconnected), 0);
        assert_eq!(driver.connects(), 0);
    }

    #[test]
    fn enable_auto_reconnect_reports_registration_failure() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        driver.fail_subscribe_from(2);
        let sup = supervisor(&driver, &rt);
        sup.connect_blocking().unwrap();

        assert!(sup.enable_auto_reconnect().is_err());
        assert!(!sup.is_auto_reconnect_armed());
    }

    #[test]
    fn arming_twice_keeps_one_subscription() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        let sup = supervisor(&driver, &rt);
        sup.connect_blocking().unwrap();

        sup.enable_auto_reconnect().unwrap();
        sup.enable_auto_reconnect().unwrap();

        assert_eq!(driver.subscriptions(EventKind::Disconnected), 1);
    }

    #[test]
    fn link_drop_triggers_reconnection_and_rearms() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        let sup = supervisor(&driver, &rt);
        sup.connect_blocking().unwrap();
        sup.enable_auto_reconnect().unwrap();

        driver.push(up());
        assert_eq!(driver.emit(down()), 1);

        wait_until("re-armed handler", || {
            sup.is_auto_reconnect_armed() && driver.connects() == 2
        });
        assert_eq!(sup.state(), ConnectionState::Connected);
        assert_eq!(driver.subscriptions(EventKind::Disconnected), 1);
        assert_eq!(driver.subscriptions(EventKind::AddressAcquired), 0);
    }

    #[test]
    fn only_one_reconnection_unit_at_a_time() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        let sup = supervisor(&driver, &rt);
        sup.connect_blocking().unwrap();
        sup.enable_auto_reconnect().unwrap();

        driver.emit(down());
        wait_until("first reconnection attempt", || driver.connects() == 2);

        // Only the pending attempt listens now; the standing handler is gone.
        assert_eq!(driver.emit(down()), 1);
        wait_until("second reconnection attempt", || driver.connects() == 3);

        assert_eq!(driver.emit(up()), 1);
        wait_until("re-armed handler", || sup.is_auto_reconnect_armed());

        assert_eq!(driver.connects(), 3);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[test]
    fn drop_before_arming_still_reconnects() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        let sup = supervisor(&driver, &rt);
        sup.connect_blocking().unwrap();

        // Nobody is subscribed yet.
        assert_eq!(driver.emit(down()), 0);
        driver.push(up());
        sup.enable_auto_reconnect().unwrap();

        wait_until("reconnection after early drop", || {
            sup.is_auto_reconnect_armed() && driver.connects() == 2
        });
        assert_eq!(sup.state(), ConnectionState::Connected);
        assert_eq!(driver.subscriptions(EventKind::Disconnected), 1);
    }

    #[test]
    fn failed_reconnection_halts() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        let sup = supervisor(&driver, &rt);
        sup.connect_blocking().unwrap();
        sup.enable_auto_reconnect().unwrap();
        let rx = sup.watch_state();

        // Three subscriptions so far: the attempt's two and the standing handler.
        driver.fail_subscribe_from(3);
        driver.emit(down());

        wait_until("halted state", || *rx.borrow() == ConnectionState::Halted);
        assert!(!sup.is_auto_reconnect_armed());
        assert_eq!(driver.subscriptions(EventKind::Disconnected), 0);
    }

    #[test]
    fn state_watchers_see_connected() {
        let rt = runtime();
        let driver = ScriptedDriver::new([down(), up()]);
        let sup = supervisor(&driver, &rt);
        let rx = sup.watch_state();
        assert_eq!(*rx.borrow(), ConnectionState::Idle);

        sup.connect_blocking().unwrap();

        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }

    #[test]
    fn dropping_the_supervisor_removes_standing_handler() {
        let rt = runtime();
        let driver = ScriptedDriver::new([up()]);
        let sup = supervisor(&driver, &rt);
        sup.connect_blocking().unwrap();
        sup.enable_auto_reconnect().unwrap();

        drop(sup);

        assert_eq!(driver.subscriptions(EventKind::Disconnected), 0);
    }
}
