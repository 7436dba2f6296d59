/// Centralized configuration constants for the relay
use crate::error::ConfigError;
use crate::wifi::{AuthThreshold, WifiCredentials};
use secrecy::SecretString;

// Relay server
pub const RELAY_HOST: &str = match option_env!("WIFI_RELAY_HOST") {
    Some(host) => host,
    None => "relay.example.net",
};
pub const RELAY_PORT: u16 = 443;
pub const NOTIFY_PATH: &str = "/";
pub const PROBE_PATH: &str = "/";
pub const USER_AGENT: &str = concat!("wifi-relay/", env!("CARGO_PKG_VERSION"));

// Serial
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const SERIAL_READ_TIMEOUT_MS: u64 = 50;

// Timing
pub const CONNECT_REQUEST_RETRY_MS: u64 = 1000;
pub const HOST_LINK_RETRY_MS: u64 = 2000;
pub const HOST_LINK_MONITOR_MS: u64 = 5000;
#[cfg_attr(not(windows), allow(dead_code))]
pub const ADDRESS_POLL_ATTEMPTS: u32 = 60;
#[cfg_attr(not(windows), allow(dead_code))]
pub const ADDRESS_POLL_INTERVAL_MS: u64 = 500;

// Embedded by build.rs
const SECRET_TOKEN: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/secret_token"));
const ROOT_CERT_PEM: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/server_root_cert.pem"));

/// Everything baked into the binary at build time, validated
pub struct EmbeddedConfig {
    pub credentials: WifiCredentials,
    pub secret: SecretString,
    pub root_cert_pem: &'static [u8],
}

impl EmbeddedConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_parts(
            option_env!("WIFI_RELAY_SSID").unwrap_or(""),
            option_env!("WIFI_RELAY_PASSPHRASE").unwrap_or(""),
            option_env!("WIFI_RELAY_AUTH").unwrap_or(""),
            SECRET_TOKEN,
            ROOT_CERT_PEM,
        )
    }

    pub fn from_parts(
        ssid: &str,
        passphrase: &str,
        auth: &str,
        secret: &[u8],
        root_cert_pem: &'static [u8],
    ) -> Result<Self, ConfigError> {
        let auth: AuthThreshold = auth.parse()?;
        let credentials = WifiCredentials::new(ssid, passphrase, auth)?;

        let secret = std::str::from_utf8(secret).map_err(|e| ConfigError::SecretNotUtf8 {
            offset: e.valid_up_to(),
        })?;
        // Token files usually end with a newline that is not part of the token.
        let secret = secret.trim_end().to_string();
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if root_cert_pem.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigError::NoRootCertificate);
        }

        Ok(Self {
            credentials,
            secret: SecretString::from(secret),
            root_cert_pem,
        })
    }
}

impl std::fmt::Debug for EmbeddedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedConfig")
            .field("credentials", &self.credentials)
            .field("secret", &"[REDACTED]")
            .field("root_cert_pem", &format_args!("{} bytes", self.root_cert_pem.len()))
            .finish()
    }
}
