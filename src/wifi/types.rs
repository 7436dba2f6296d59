use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Longest SSID an 802.11 beacon can carry
pub const SSID_MAX_LEN: usize = 32;
/// WPA passphrases are 8..=63 printable characters
pub const PASSPHRASE_MIN_LEN: usize = 8;
pub const PASSPHRASE_MAX_LEN: usize = 63;

/// Association lifecycle as seen by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Automatic repair hit an unrecoverable error; nothing restores the link any more
    Halted,
}

/// Notifications raised by a WiFi driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiEvent {
    /// Link is up and the station holds an address
    AddressAcquired(IpAddr),
    /// Link dropped, or an association attempt failed
    Disconnected { reason: String },
}

impl WifiEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WifiEvent::AddressAcquired(_) => EventKind::AddressAcquired,
            WifiEvent::Disconnected { .. } => EventKind::Disconnected,
        }
    }
}

/// Discriminant used to subscribe to one class of [`WifiEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AddressAcquired,
    Disconnected,
}

/// Weakest authentication the station will accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthThreshold {
    Open,
    Wpa,
    #[default]
    Wpa2,
    Wpa3,
}

impl AuthThreshold {
    /// Authentication and cipher names as they appear in a WLAN profile
    pub fn profile_auth(self) -> (&'static str, &'static str) {
        match self {
            AuthThreshold::Open => ("open", "none"),
            AuthThreshold::Wpa => ("WPAPSK", "AES"),
            AuthThreshold::Wpa2 => ("WPA2PSK", "AES"),
            AuthThreshold::Wpa3 => ("WPA3SAE", "AES"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            AuthThreshold::Open => "open",
            AuthThreshold::Wpa => "wpa",
            AuthThreshold::Wpa2 => "wpa2",
            AuthThreshold::Wpa3 => "wpa3",
        }
    }
}

impl fmt::Display for AuthThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AuthThreshold {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "none" => Ok(AuthThreshold::Open),
            "wpa" | "wpa-psk" => Ok(AuthThreshold::Wpa),
            "" | "wpa2" | "wpa2-psk" => Ok(AuthThreshold::Wpa2),
            "wpa3" | "wpa3-sae" => Ok(AuthThreshold::Wpa3),
            _ => Err(ConfigError::UnknownAuth(s.to_string())),
        }
    }
}

/// Station credentials, fixed for the lifetime of a supervisor
#[derive(Debug, Clone)]
pub struct WifiCredentials {
    ssid: String,
    passphrase: SecretString,
    auth: AuthThreshold,
}

impl WifiCredentials {
    /// Validate and wrap credentials. Oversized values are rejected rather than truncated.
    pub fn new(ssid: &str, passphrase: &str, auth: AuthThreshold) -> Result<Self, ConfigError> {
        if ssid.is_empty() {
            return Err(ConfigError::MissingSsid);
        }
        if ssid.len() > SSID_MAX_LEN {
            return Err(ConfigError::SsidLength { len: ssid.len() });
        }
        if !passphrase.is_empty()
            && !(PASSPHRASE_MIN_LEN..=PASSPHRASE_MAX_LEN).contains(&passphrase.len())
        {
            return Err(ConfigError::PassphraseLength {
                len: passphrase.len(),
            });
        }
        if passphrase.is_empty() && auth != AuthThreshold::Open {
            return Err(ConfigError::PassphraseRequired(auth.label()));
        }

        Ok(Self {
            ssid: ssid.to_string(),
            passphrase: SecretString::from(passphrase.to_string()),
            auth,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn passphrase(&self) -> Option<&SecretString> {
        if self.passphrase.expose_secret().is_empty() {
            None
        } else {
            Some(&self.passphrase)
        }
    }

    pub fn auth(&self) -> AuthThreshold {
        self.auth
    }
}
