use crate::config;
use std::fmt;

/// One fully rendered HTTP/1.0 request, built fresh for every exchange
#[derive(Clone)]
pub struct OutboundRequest {
    host: String,
    url: String,
    bytes: Vec<u8>,
}

impl OutboundRequest {
    pub fn get(host: &str, path: &str) -> Self {
        let url = format!("https://{host}{path}");
        let head = format!(
            "GET {url} HTTP/1.0\r\nHost: {host}\r\nUser-Agent: {agent}\r\n\r\n",
            agent = config::USER_AGENT,
        );
        Self {
            host: host.to_string(),
            url,
            bytes: head.into_bytes(),
        }
    }

    pub fn post(host: &str, path: &str, body: &[u8]) -> Self {
        let url = format!("https://{host}{path}");
        let head = format!(
            "POST {url} HTTP/1.0\r\nHost: {host}\r\nUser-Agent: {agent}\r\nContent-Length: {len}\r\n\r\n",
            agent = config::USER_AGENT,
            len = body.len(),
        );
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(body);
        Self {
            host: host.to_string(),
            url,
            bytes,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// The body may carry a secret, so only the request line is shown.
impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line_end = self
            .bytes
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(self.bytes.len());
        f.debug_struct("OutboundRequest")
            .field("url", &self.url)
            .field("line", &String::from_utf8_lossy(&self.bytes[..line_end]))
            .field("len", &self.bytes.len())
            .finish()
    }
}
