//! WiFi link management for the relay
//!
//! The supervisor owns the association lifecycle and talks to the platform through the
//! [`WifiDriver`] seam. Drivers deliver notifications through a per-driver event registry.

#[cfg(windows)]
mod connection;
mod driver;
mod host;
#[cfg(windows)]
mod listener;
mod profile;
mod registry;
mod supervisor;
mod types;

// Re-export public API
#[cfg(windows)]
pub use connection::WlanDriver;
pub use driver::WifiDriver;
pub use host::HostLinkDriver;
pub use supervisor::WifiSupervisor;
pub use types::{AuthThreshold, ConnectionState, WifiCredentials};
