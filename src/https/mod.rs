pub mod client;
pub mod request;
pub mod scanner;
pub mod tls;

pub use client::{Exchange, HttpsExchangeClient};
pub use request::OutboundRequest;
pub use scanner::ExchangeOutcome;
pub use tls::RustlsConnector;
