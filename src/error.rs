/// Typed errors for the relay's WiFi, HTTPS and configuration layers
use std::io;
use thiserror::Error;

/// Result type alias for WiFi operations
pub type WifiResult<T> = Result<T, WifiError>;

/// Errors that can occur while driving the WiFi link
#[derive(Error, Debug)]
#[cfg_attr(not(windows), allow(dead_code))]
pub enum WifiError {
    #[error("Failed to open WLAN handle (code: {code})")]
    HandleOpenFailed { code: u32 },

    #[error("Failed to enumerate interfaces (code: {code})")]
    InterfaceEnumFailed { code: u32 },

    #[error("No WiFi interface found")]
    NoInterface,

    #[error("Failed to register notification (code: {code})")]
    NotificationRegistrationFailed { code: u32 },

    #[error("No handler registered under subscription {0}")]
    UnknownSubscription(u64),

    #[error("Failed to connect (code: {code})")]
    ConnectionFailed { code: u32 },

    #[error("Failed to add profile (code: {code}, reason: {reason})")]
    ProfileAddFailed { code: u32, reason: u32 },

    #[error("Failed to disconnect (code: {code})")]
    DisconnectFailed { code: u32 },

    #[error("Failed to spawn {what}: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Faults of a single HTTPS exchange. The relay only ever sees these collapsed into
/// [`crate::https::ExchangeOutcome::Failure`]; they exist for logging.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Invalid TLS server name {0:?}")]
    ServerName(String),

    #[error("TLS session setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Write failed after {written} of {total} bytes: {source}")]
    Write {
        written: usize,
        total: usize,
        #[source]
        source: io::Error,
    },

    #[error("Read failed: {0}")]
    Read(#[source] io::Error),

    #[error("Connection closed before a status code was seen")]
    ConnectionClosed,

    #[error("Server answered with status class {0:?}")]
    Status(char),
}

/// Build-time configuration that cannot be used. Always fatal to startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No WiFi SSID was embedded at build time (set WIFI_RELAY_SSID)")]
    MissingSsid,

    #[error("SSID is {len} bytes, must be 1..=32")]
    SsidLength { len: usize },

    #[error("Passphrase is {len} bytes, must be empty or 8..=63")]
    PassphraseLength { len: usize },

    #[error("A passphrase is required for authentication {0:?}")]
    PassphraseRequired(&'static str),

    #[error("Unknown authentication threshold {0:?} (expected open, wpa, wpa2 or wpa3)")]
    UnknownAuth(String),

    #[error("No secret token was embedded at build time (set WIFI_RELAY_SECRET_FILE)")]
    EmptySecret,

    #[error("Secret token is not valid UTF-8 (first bad byte at offset {offset})")]
    SecretNotUtf8 { offset: usize },

    #[error("No root certificate was embedded at build time (set WIFI_RELAY_ROOT_CERT)")]
    NoRootCertificate,

    #[error("Root certificate rejected: {0}")]
    InvalidRootCertificate(String),
}

/// Convert a WLAN reason code to a human-readable string
#[cfg_attr(not(windows), allow(dead_code))]
pub fn wlan_reason_to_string(code: u32) -> String {
    match code {
        0 => "Success".to_string(),
        1 => "Unknown Failure".to_string(),
        0x00010001 => "Network Not Compatible".to_string(),
        0x00010002 => "Profile Not Compatible".to_string(),
        0x00028002 => "Association Failed".to_string(),
        0x00028003 => "Association Timeout".to_string(),
        0x00028004 => "Pre-Security Failure".to_string(),
        0x00028005 => "Start Security Failure".to_string(),
        0x00028006 => "Security Failure".to_string(),
        0x00028007 => "Security Timeout".to_string(),
        0x00028008 => "Roaming Failure".to_string(),
        0x0002800B => "Driver Disconnected (Possible Wrong Password)".to_string(),
        0x0002800C => "Driver Operation Failure".to_string(),
        0x00038002 => "Connection Failed (Network Not Available or Wrong Password)".to_string(),
        0x00038003 => "Profile Not Found".to_string(),
        0x00038006 => "Profile Invalid".to_string(),
        0x00050004 => "Incorrect Password".to_string(),
        0x00048005 => "Incorrect Password (Key Exchange Timeout)".to_string(),
        0x00048014 => "Authentication Timeout (Possible Wrong Password)".to_string(),
        _ => format!("Unknown Error (Code: {code}, 0x{code:X})"),
    }
}
