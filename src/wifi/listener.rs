use crate::config;
use crate::error::{WifiError, WifiResult, wlan_reason_to_string};
use crate::wifi::host::route_source_address;
use crate::wifi::registry::EventRegistry;
use crate::wifi::types::WifiEvent;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use windows::Win32::{
    Foundation::{ERROR_SUCCESS, HANDLE},
    NetworkManagement::WiFi::*,
};

/// State handed to the OS callback. Owned by the listener, borrowed by the callback.
struct ListenerContext {
    registry: Arc<EventRegistry>,
    relay_host: String,
    relay_port: u16,
}

/// Routes the ACM notifications of one WLAN handle into an [`EventRegistry`].
///
/// Registered once for the lifetime of the driver; which handlers see an event is decided
/// by the registry, not by the OS registration.
#[derive(Debug)]
pub struct NotificationListener {
    handle: HANDLE,
    context: *mut std::ffi::c_void,
}

unsafe impl Send for NotificationListener {}
unsafe impl Sync for NotificationListener {}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        unsafe {
            let _ = WlanRegisterNotification(
                self.handle,
                WLAN_NOTIFICATION_SOURCE_NONE,
                true,
                None,
                None,
                None,
                None,
            );
            // The OS no longer calls back with this context once unregistration returns.
            drop(Box::from_raw(self.context as *mut ListenerContext));
        }
    }
}

unsafe extern "system" fn notification_callback(
    data: *mut L2_NOTIFICATION_DATA,
    context: *mut std::ffi::c_void,
) {
    if data.is_null() || context.is_null() {
        return;
    }

    // SAFETY: We checked for null above.
    // The context is the boxed ListenerContext created in NotificationListener::register
    let (data, context) = unsafe { (&*data, &*(context as *const ListenerContext)) };

    if data.NotificationSource != WLAN_NOTIFICATION_SOURCE_ACM {
        return;
    }

    let code = data.NotificationCode;
    let complete = code == wlan_notification_acm_connection_complete.0 as u32;
    let failed = code == wlan_notification_acm_connection_attempt_fail.0 as u32;
    let dropped = code == wlan_notification_acm_disconnected.0 as u32;
    if !(complete || failed || dropped) {
        return;
    }

    if data.dwDataSize < std::mem::size_of::<WLAN_CONNECTION_NOTIFICATION_DATA>() as u32 {
        return;
    }

    // SAFETY: The documentation guarantees pData points to WLAN_CONNECTION_NOTIFICATION_DATA
    // for these notification codes, and we checked the size above.
    let conn_data = unsafe { &*(data.pData as *const WLAN_CONNECTION_NOTIFICATION_DATA) };
    let reason_code = conn_data.wlanReasonCode;

    if complete && reason_code == 0 {
        debug!("wlan: associated, waiting for an address");
        await_address(context);
        return;
    }

    let reason = if dropped {
        format!("disconnected: {}", wlan_reason_to_string(reason_code))
    } else {
        wlan_reason_to_string(reason_code)
    };
    context
        .registry
        .dispatch(&WifiEvent::Disconnected { reason });
}

/// Association is complete but DHCP may still be running. Poll for a routable source
/// address off the callback thread and report whichever comes first.
fn await_address(context: &ListenerContext) {
    let registry = Arc::clone(&context.registry);
    let host = context.relay_host.clone();
    let port = context.relay_port;

    let spawned = std::thread::Builder::new()
        .name("wlan-address".into())
        .spawn(move || {
            for _ in 0..config::ADDRESS_POLL_ATTEMPTS {
                if let Ok(addr) = route_source_address(&host, port) {
                    registry.dispatch(&WifiEvent::AddressAcquired(addr));
                    return;
                }
                std::thread::sleep(Duration::from_millis(config::ADDRESS_POLL_INTERVAL_MS));
            }
            registry.dispatch(&WifiEvent::Disconnected {
                reason: "associated but no address was assigned".to_string(),
            });
        });

    if let Err(e) = spawned {
        warn!("wlan: cannot wait for address: {e}");
        context.registry.dispatch(&WifiEvent::Disconnected {
            reason: "address watcher unavailable".to_string(),
        });
    }
}

impl NotificationListener {
    /// Start delivering ACM notifications of `handle` to `registry`
    pub fn register(
        handle: HANDLE,
        registry: Arc<EventRegistry>,
        relay_host: &str,
        relay_port: u16,
    ) -> WifiResult<Self> {
        let context = Box::into_raw(Box::new(ListenerContext {
            registry,
            relay_host: relay_host.to_string(),
            relay_port,
        }));

        unsafe {
            let result = WlanRegisterNotification(
                handle,
                WLAN_NOTIFICATION_SOURCE_ACM,
                false,
                Some(notification_callback),
                Some(context as *mut std::ffi::c_void),
                None,
                None,
            );

            if result != ERROR_SUCCESS.0 {
                drop(Box::from_raw(context)); // Cleanup
                return Err(WifiError::NotificationRegistrationFailed { code: result });
            }
        }

        Ok(Self {
            handle,
            context: context as *mut std::ffi::c_void,
        })
    }
}
