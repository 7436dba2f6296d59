use crate::error::{WifiError, WifiResult};
use crate::wifi::driver::WifiDriver;
use crate::wifi::listener::NotificationListener;
use crate::wifi::profile::create_profile_xml;
use crate::wifi::registry::{EventHandler, EventRegistry, SubscriptionId};
use crate::wifi::types::{EventKind, WifiCredentials};
use log::debug;
use std::sync::Arc;
use windows::{
    Win32::{
        Foundation::{ERROR_SUCCESS, HANDLE},
        NetworkManagement::WiFi::*,
    },
    core::{GUID, PCWSTR},
};

/// WLAN client handle bound to the first wireless interface. Closed on drop.
#[derive(Debug)]
struct WlanSession {
    handle: HANDLE,
    interface: GUID,
}

unsafe impl Send for WlanSession {}
unsafe impl Sync for WlanSession {}

impl WlanSession {
    fn open() -> WifiResult<Self> {
        let mut negotiated_version = 0;
        let mut handle = HANDLE::default();
        unsafe {
            let result = WlanOpenHandle(2, None, &mut negotiated_version, &mut handle);
            if result != ERROR_SUCCESS.0 {
                return Err(WifiError::HandleOpenFailed { code: result });
            }
        }

        match first_interface(handle) {
            Ok(interface) => Ok(Self { handle, interface }),
            Err(e) => {
                unsafe {
                    let _ = WlanCloseHandle(handle, None);
                }
                Err(e)
            }
        }
    }
}

impl Drop for WlanSession {
    fn drop(&mut self) {
        unsafe {
            let _ = WlanCloseHandle(self.handle, None);
        }
    }
}

fn first_interface(handle: HANDLE) -> WifiResult<GUID> {
    unsafe {
        let mut interface_list: *mut WLAN_INTERFACE_INFO_LIST = std::ptr::null_mut();
        let result = WlanEnumInterfaces(handle, None, &mut interface_list);
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::InterfaceEnumFailed { code: result });
        }

        if (*interface_list).dwNumberOfItems == 0 {
            WlanFreeMemory(interface_list as *mut _);
            return Err(WifiError::NoInterface);
        }

        let guid = (*interface_list).InterfaceInfo[0].InterfaceGuid;
        WlanFreeMemory(interface_list as *mut _);
        Ok(guid)
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Native WLAN backend for Windows stations
#[derive(Debug)]
pub struct WlanDriver {
    // Field order matters: the listener must unregister before the session closes.
    _listener: NotificationListener,
    session: WlanSession,
    registry: Arc<EventRegistry>,
}

impl WlanDriver {
    /// `relay_host`/`relay_port` are used to confirm a routable address after association.
    pub fn open(relay_host: &str, relay_port: u16) -> WifiResult<Self> {
        let session = WlanSession::open()?;
        let registry = Arc::new(EventRegistry::new());
        let listener = NotificationListener::register(
            session.handle,
            Arc::clone(&registry),
            relay_host,
            relay_port,
        )?;
        Ok(Self {
            _listener: listener,
            session,
            registry,
        })
    }

    fn set_profile(&self, xml: &str) -> WifiResult<()> {
        unsafe {
            let xml_wide = wide(xml);
            let mut reason_code = 0;
            let result = WlanSetProfile(
                self.session.handle,
                &self.session.interface,
                0,
                PCWSTR(xml_wide.as_ptr()),
                None,
                true,
                None,
                &mut reason_code,
            );

            if result != ERROR_SUCCESS.0 {
                return Err(WifiError::ProfileAddFailed {
                    code: result,
                    reason: reason_code,
                });
            }
        }
        Ok(())
    }
}

impl WifiDriver for WlanDriver {
    fn connect(&self, credentials: &WifiCredentials) -> WifiResult<()> {
        self.set_profile(&create_profile_xml(credentials))?;
        debug!("wlan: profile {:?} written", credentials.ssid());

        unsafe {
            let profile_name = wide(credentials.ssid());
            let connection_params = WLAN_CONNECTION_PARAMETERS {
                wlanConnectionMode: wlan_connection_mode_profile,
                strProfile: PCWSTR(profile_name.as_ptr()),
                pDot11Ssid: std::ptr::null_mut(),
                pDesiredBssidList: std::ptr::null_mut(),
                dot11BssType: dot11_BSS_type_infrastructure,
                dwFlags: 0,
            };

            let result = WlanConnect(
                self.session.handle,
                &self.session.interface,
                &connection_params,
                None,
            );
            if result != ERROR_SUCCESS.0 {
                return Err(WifiError::ConnectionFailed { code: result });
            }
        }
        Ok(())
    }

    fn disconnect(&self) -> WifiResult<()> {
        unsafe {
            let result = WlanDisconnect(self.session.handle, &self.session.interface, None);
            if result != ERROR_SUCCESS.0 {
                return Err(WifiError::DisconnectFailed { code: result });
            }
        }
        Ok(())
    }

    // A failed query means there is no current connection to report.
    fn is_associated(&self) -> bool {
        unsafe {
            let mut data_size = 0;
            let mut data_ptr: *mut std::ffi::c_void = std::ptr::null_mut();
            let mut opcode_value_type = wlan_opcode_value_type_invalid;

            let result = WlanQueryInterface(
                self.session.handle,
                &self.session.interface,
                wlan_intf_opcode_current_connection,
                None,
                &mut data_size,
                &mut data_ptr,
                Some(&mut opcode_value_type),
            );
            if result != ERROR_SUCCESS.0 {
                return false;
            }

            let attributes = &*(data_ptr as *const WLAN_CONNECTION_ATTRIBUTES);
            let connected = attributes.isState == wlan_interface_state_connected;
            WlanFreeMemory(data_ptr);
            connected
        }
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> WifiResult<SubscriptionId> {
        Ok(self.registry.subscribe(kind, handler))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> WifiResult<()> {
        self.registry.unsubscribe(id)
    }
}
