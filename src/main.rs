mod config;
mod error;
mod https;
mod relay;
mod serial;
mod wifi;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use log::{LevelFilter, error, info, warn};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::{
    config::EmbeddedConfig,
    https::{HttpsExchangeClient, RustlsConnector},
    relay::{CommandRelay, RelayTargets},
    wifi::{ConnectionState, HostLinkDriver, WifiDriver, WifiSupervisor},
};

/// How the station's network link is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Native WLAN API (Windows)
    Wlan,
    /// Link managed by the operating system; only the route to the relay is watched
    Host,
}

impl Backend {
    const fn platform_default() -> Self {
        if cfg!(windows) {
            Backend::Wlan
        } else {
            Backend::Host
        }
    }
}

/// Relays single-byte commands from a serial-attached sensor node to an HTTPS endpoint
#[derive(Parser, Debug)]
#[command(
    name = "wifi-relay",
    about = "Relays single-byte commands from a serial-attached sensor node to an HTTPS endpoint over a self-healing WiFi link.",
    long_about = None,
    version = env!("CARGO_PKG_VERSION"),
    disable_version_flag = true
)]
struct Args {
    /// Print version information
    #[arg(short = 'V', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Serial device the node is attached to (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long)]
    port: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = config::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Network link backend
    #[arg(long, value_enum, default_value_t = Backend::platform_default())]
    backend: Backend,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn open_driver(backend: Backend) -> Result<Box<dyn WifiDriver>> {
    match backend {
        #[cfg(windows)]
        Backend::Wlan => {
            let driver = wifi::WlanDriver::open(config::RELAY_HOST, config::RELAY_PORT)
                .wrap_err("cannot open the WLAN interface")?;
            Ok(Box::new(driver))
        }
        #[cfg(not(windows))]
        Backend::Wlan => Err(color_eyre::eyre::eyre!(
            "the wlan backend is only available on Windows; use --backend host"
        )),
        Backend::Host => {
            let driver = HostLinkDriver::for_route(config::RELAY_HOST, config::RELAY_PORT)
                .wrap_err("cannot start the host link driver")?;
            Ok(Box::new(driver))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let embedded = EmbeddedConfig::load().wrap_err("build-time configuration is unusable")?;
    let connector = RustlsConnector::from_pem(embedded.root_cert_pem)
        .wrap_err("embedded root certificate is unusable")?;
    let mut port = serial::open(&args.port, args.baud)
        .wrap_err_with(|| format!("failed to open serial port {} @ {}", args.port, args.baud))?;

    let driver = open_driver(args.backend)?;
    let supervisor = Arc::new(WifiSupervisor::new(
        driver,
        embedded.credentials,
        Handle::current(),
    ));

    let mut states = supervisor.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                ConnectionState::Connected => info!("link up"),
                ConnectionState::Idle => warn!("link down"),
                ConnectionState::Connecting => {}
                ConnectionState::Halted => {
                    error!("auto-reconnect stopped, the link will not be repaired")
                }
            }
        }
    });

    info!(
        "connecting to WiFi ({:?} backend, relay {})",
        args.backend,
        config::RELAY_HOST
    );
    let setup = Arc::clone(&supervisor);
    tokio::task::spawn_blocking(move || {
        setup.connect_blocking()?;
        setup.enable_auto_reconnect()
    })
    .await?
    .wrap_err("failed to bring up the WiFi link")?;
    info!(
        "ready (link {:?}, auto-reconnect {})",
        supervisor.state(),
        if supervisor.is_auto_reconnect_armed() {
            "armed"
        } else {
            "off"
        }
    );

    let mut relay = CommandRelay::new(
        HttpsExchangeClient::new(connector, config::RELAY_PORT),
        RelayTargets::default(),
        embedded.secret,
    );
    tokio::task::spawn_blocking(move || serial::run(&mut port, &mut relay))
        .await?
        .wrap_err("serial port failed")?;

    Ok(())
}
