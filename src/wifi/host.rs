//! Driver for hosts whose network link is managed by the operating system.
//!
//! There is no radio to command here: "associated" means the host has a route to the
//! relay server. A connect request probes that route in the background; a monitor thread
//! keeps probing while associated and reports the loss of the route as a disconnect.

use crate::config;
use crate::error::{WifiError, WifiResult};
use crate::wifi::driver::WifiDriver;
use crate::wifi::registry::{EventHandler, EventRegistry, SubscriptionId};
use crate::wifi::types::{EventKind, WifiCredentials, WifiEvent};
use log::debug;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

type Probe = Box<dyn Fn() -> io::Result<IpAddr> + Send + Sync>;

pub struct HostLinkDriver {
    shared: Arc<Shared>,
}

struct Shared {
    registry: EventRegistry,
    probe: Probe,
    associated: AtomicBool,
    retry_interval: Duration,
}

impl HostLinkDriver {
    /// Probe the route towards `host:port` using the configured intervals
    pub fn for_route(host: &str, port: u16) -> WifiResult<Self> {
        let host = host.to_string();
        Self::with_probe(
            Box::new(move || route_source_address(&host, port)),
            Duration::from_millis(config::HOST_LINK_RETRY_MS),
            Duration::from_millis(config::HOST_LINK_MONITOR_MS),
        )
    }

    pub fn with_probe(
        probe: Probe,
        retry_interval: Duration,
        monitor_interval: Duration,
    ) -> WifiResult<Self> {
        let shared = Arc::new(Shared {
            registry: EventRegistry::new(),
            probe,
            associated: AtomicBool::new(false),
            retry_interval,
        });

        let weak = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("host-link-monitor".into())
            .spawn(move || monitor(weak, monitor_interval))
            .map_err(|source| WifiError::Spawn {
                what: "host link monitor",
                source,
            })?;

        Ok(Self { shared })
    }
}

impl std::fmt::Debug for HostLinkDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLinkDriver")
            .field("associated", &self.shared.associated.load(Ordering::SeqCst))
            .field("registry", &self.shared.registry)
            .finish()
    }
}

impl Shared {
    fn attempt(&self) {
        match (self.probe)() {
            Ok(addr) => {
                self.associated.store(true, Ordering::SeqCst);
                self.registry.dispatch(&WifiEvent::AddressAcquired(addr));
            }
            Err(e) => {
                // Stand-in for the radio's association timeout.
                thread::sleep(self.retry_interval);
                self.registry.dispatch(&WifiEvent::Disconnected {
                    reason: format!("no route to relay host: {e}"),
                });
            }
        }
    }
}

fn monitor(shared: Weak<Shared>, interval: Duration) {
    loop {
        thread::sleep(interval);
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.associated.load(Ordering::SeqCst) {
            continue;
        }
        if let Err(e) = (shared.probe)() {
            if shared.associated.swap(false, Ordering::SeqCst) {
                shared.registry.dispatch(&WifiEvent::Disconnected {
                    reason: format!("route lost: {e}"),
                });
            }
        }
    }
}

impl WifiDriver for HostLinkDriver {
    fn connect(&self, _credentials: &WifiCredentials) -> WifiResult<()> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("host-link-probe".into())
            .spawn(move || shared.attempt())
            .map(|_| ())
            .map_err(|source| WifiError::Spawn {
                what: "host link probe",
                source,
            })
    }

    fn disconnect(&self) -> WifiResult<()> {
        if self.shared.associated.swap(false, Ordering::SeqCst) {
            debug!("host link: forgetting association");
        }
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.shared.associated.load(Ordering::SeqCst)
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> WifiResult<SubscriptionId> {
        Ok(self.shared.registry.subscribe(kind, handler))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> WifiResult<()> {
        self.shared.registry.unsubscribe(id)
    }
}

/// Source address the OS would use to reach `host:port`. Connecting a UDP socket only
/// consults the routing table; nothing is sent.
pub(crate) fn route_source_address(host: &str, port: u16) -> io::Result<IpAddr> {
    let target = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host did not resolve"))?;

    let local: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local)?;
    socket.connect(target)?;

    let addr = socket.local_addr()?.ip();
    if addr.is_unspecified() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no source address for route",
        ));
    }
    Ok(addr)
}
