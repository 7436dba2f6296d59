use crate::error::{ConfigError, ExchangeError};
use crate::https::client::Connector;
use log::debug;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

/// TLS over TCP, trusting exactly the root certificates it was built with
#[derive(Debug, Clone)]
pub struct RustlsConnector {
    config: Arc<ClientConfig>,
}

impl RustlsConnector {
    pub fn from_pem(pem: &[u8]) -> Result<Self, ConfigError> {
        let mut roots = RootCertStore::empty();
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert = cert.map_err(|e| ConfigError::InvalidRootCertificate(e.to_string()))?;
            roots
                .add(cert)
                .map_err(|e| ConfigError::InvalidRootCertificate(e.to_string()))?;
        }
        if roots.is_empty() {
            return Err(ConfigError::NoRootCertificate);
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ConfigError::InvalidRootCertificate(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            config: Arc::new(config),
        })
    }
}

impl Connector for RustlsConnector {
    type Stream = TlsSession;

    fn open(&self, host: &str, port: u16) -> Result<TlsSession, ExchangeError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| ExchangeError::ServerName(host.to_string()))?;
        let tcp = TcpStream::connect((host, port)).map_err(|source| ExchangeError::Connect {
            host: host.to_string(),
            port,
            source,
        })?;
        let conn = ClientConnection::new(Arc::clone(&self.config), server_name)?;
        debug!("tls: session to {host}:{port} opened");
        Ok(TlsSession {
            inner: StreamOwned::new(conn, tcp),
        })
    }
}

/// One TLS session. The handshake completes on first use; dropping it sends
/// `close_notify` and shuts the socket down.
pub struct TlsSession {
    inner: StreamOwned<ClientConnection, TcpStream>,
}

impl Read for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        self.inner.conn.send_close_notify();
        while self.inner.conn.wants_write() {
            if self.inner.conn.write_tls(&mut self.inner.sock).is_err() {
                break;
            }
        }
        let _ = self.inner.sock.shutdown(Shutdown::Both);
    }
}
