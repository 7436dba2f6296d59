use crate::error::ExchangeError;
use crate::https::request::OutboundRequest;
use crate::https::scanner::{ExchangeOutcome, StatusLineScanner};
use log::{debug, warn};
use std::io::{self, Read, Write};

/// Opens a byte stream to the relay server. The stream is torn down when dropped.
pub trait Connector {
    type Stream: Read + Write;

    fn open(&self, host: &str, port: u16) -> Result<Self::Stream, ExchangeError>;
}

/// Anything that can run one request to a go/no-go outcome
pub trait Exchange {
    fn execute(&self, request: &OutboundRequest) -> ExchangeOutcome;
}

/// Runs a single request per connection and classifies the response by its status line.
///
/// Each exchange opens a fresh session, writes the whole request, reads until the first
/// status digit is known and then drops the session. Every fault collapses into
/// [`ExchangeOutcome::Failure`].
#[derive(Debug)]
pub struct HttpsExchangeClient<C> {
    connector: C,
    port: u16,
}

impl<C: Connector> HttpsExchangeClient<C> {
    pub fn new(connector: C, port: u16) -> Self {
        Self { connector, port }
    }

    fn try_execute(&self, request: &OutboundRequest) -> Result<ExchangeOutcome, ExchangeError> {
        let mut stream = self.connector.open(request.host(), self.port)?;
        write_request(&mut stream, request.as_bytes())?;
        read_status(&mut stream)
    }
}

impl<C: Connector> Exchange for HttpsExchangeClient<C> {
    fn execute(&self, request: &OutboundRequest) -> ExchangeOutcome {
        match self.try_execute(request) {
            Ok(outcome) => {
                debug!("{} -> {:?}", request.url(), outcome);
                outcome
            }
            Err(e) => {
                warn!("{} failed: {e}", request.url());
                ExchangeOutcome::Failure
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Write every byte, resuming after short writes
fn write_request<W: Write>(stream: &mut W, bytes: &[u8]) -> Result<(), ExchangeError> {
    let total = bytes.len();
    let mut written = 0;
    while written < total {
        match stream.write(&bytes[written..]) {
            Ok(0) => {
                return Err(ExchangeError::Write {
                    written,
                    total,
                    source: io::Error::from(io::ErrorKind::WriteZero),
                });
            }
            Ok(n) => written += n,
            Err(e) if is_transient(&e) => continue,
            Err(source) => {
                return Err(ExchangeError::Write {
                    written,
                    total,
                    source,
                });
            }
        }
    }

    loop {
        match stream.flush() {
            Ok(()) => return Ok(()),
            Err(e) if is_transient(&e) => continue,
            Err(source) => {
                return Err(ExchangeError::Write {
                    written,
                    total,
                    source,
                });
            }
        }
    }
}

/// Read one byte at a time until the scanner decides. Nothing past the decisive byte is
/// consumed.
fn read_status<R: Read>(stream: &mut R) -> Result<ExchangeOutcome, ExchangeError> {
    let mut scanner = StatusLineScanner::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => return Err(ExchangeError::ConnectionClosed),
            Ok(_) => {
                if let Some(outcome) = scanner.feed(byte[0]) {
                    if let (ExchangeOutcome::Failure, Some(class)) =
                        (outcome, scanner.status_class())
                    {
                        debug!("{}", ExchangeError::Status(char::from(class)));
                    }
                    return Ok(outcome);
                }
            }
            Err(e) if is_transient(&e) => continue,
            Err(e) => return Err(ExchangeError::Read(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        response: Vec<u8>,
        read_pos: usize,
        read_faults: VecDeque<io::ErrorKind>,
        write_faults: VecDeque<io::ErrorKind>,
        max_write: Option<usize>,
        zero_write: bool,
        written: Vec<u8>,
        opened: usize,
        closed: usize,
    }

    struct FakeStream(Rc<RefCell<Wire>>);

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut wire = self.0.borrow_mut();
            if let Some(kind) = wire.read_faults.pop_front() {
                return Err(io::Error::from(kind));
            }
            let remaining = &wire.response[wire.read_pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            wire.read_pos += n;
            Ok(n)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut wire = self.0.borrow_mut();
            if let Some(kind) = wire.write_faults.pop_front() {
                return Err(io::Error::from(kind));
            }
            if wire.zero_write {
                return Ok(0);
            }
            let n = wire.max_write.unwrap_or(buf.len()).min(buf.len());
            wire.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.0.borrow_mut().closed += 1;
        }
    }

    struct FakeConnector {
        wire: Rc<RefCell<Wire>>,
        refuse: bool,
    }

    impl Connector for FakeConnector {
        type Stream = FakeStream;

        fn open(&self, host: &str, port: u16) -> Result<FakeStream, ExchangeError> {
            if self.refuse {
                return Err(ExchangeError::Connect {
                    host: host.to_string(),
                    port,
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                });
            }
            self.wire.borrow_mut().opened += 1;
            Ok(FakeStream(Rc::clone(&self.wire)))
        }
    }

    fn client_for(wire: Wire) -> (HttpsExchangeClient<FakeConnector>, Rc<RefCell<Wire>>) {
        let wire = Rc::new(RefCell::new(wire));
        let connector = FakeConnector {
            wire: Rc::clone(&wire),
            refuse: false,
        };
        (HttpsExchangeClient::new(connector, 443), wire)
    }

    fn responding(response: &[u8]) -> Wire {
        Wire {
            response: response.to_vec(),
            ..Wire::default()
        }
    }

    fn request() -> OutboundRequest {
        OutboundRequest::post("relay.example.net", "/", b"token")
    }

    #[test]
    fn ok_status_is_success() {
        let (client, wire) = client_for(responding(b"HTTP/1.0 200 OK\r\n\r\nbody"));
        let req = request();

        assert_eq!(client.execute(&req), ExchangeOutcome::Success);

        let wire = wire.borrow();
        assert_eq!(wire.written, req.as_bytes());
        assert_eq!(wire.opened, 1);
        assert_eq!(wire.closed, 1);
    }

    #[test]
    fn error_status_is_failure() {
        let (client, wire) = client_for(responding(b"HTTP/1.0 404 Not Found\r\n\r\n"));
        assert_eq!(client.execute(&request()), ExchangeOutcome::Failure);
        assert_eq!(wire.borrow().closed, 1);
    }

    #[test]
    fn stops_reading_at_decisive_byte() {
        let (client, wire) = client_for(responding(b"HTTP/1.1 204 No Content\r\nX: y\r\n\r\n"));
        assert_eq!(client.execute(&request()), ExchangeOutcome::Success);
        assert_eq!(wire.borrow().read_pos, "HTTP/1.1 2".len());
    }

    #[test]
    fn closed_before_status_is_failure() {
        let (client, _) = client_for(responding(b""));
        assert_eq!(client.execute(&request()), ExchangeOutcome::Failure);

        let (client, _) = client_for(responding(b"HTTP/1.0 "));
        assert_eq!(client.execute(&request()), ExchangeOutcome::Failure);
    }

    #[test]
    fn short_writes_resume_until_complete() {
        let mut wire = responding(b"HTTP/1.0 200 OK");
        wire.max_write = Some(3);
        wire.write_faults = VecDeque::from([io::ErrorKind::WouldBlock, io::ErrorKind::Interrupted]);
        let (client, wire) = client_for(wire);
        let req = request();

        assert_eq!(client.execute(&req), ExchangeOutcome::Success);
        assert_eq!(wire.borrow().written, req.as_bytes());
    }

    #[test]
    fn transient_read_errors_are_retried() {
        let mut wire = responding(b"HTTP/1.0 200 OK");
        wire.read_faults = VecDeque::from([io::ErrorKind::WouldBlock; 4]);
        let (client, _) = client_for(wire);
        assert_eq!(client.execute(&request()), ExchangeOutcome::Success);
    }

    #[test]
    fn hard_read_error_is_failure() {
        let mut wire = responding(b"HTTP/1.0 200 OK");
        wire.read_faults = VecDeque::from([io::ErrorKind::ConnectionReset]);
        let (client, wire) = client_for(wire);
        assert_eq!(client.execute(&request()), ExchangeOutcome::Failure);
        assert_eq!(wire.borrow().closed, 1);
    }

    #[test]
    fn hard_write_error_skips_reading() {
        let mut wire = responding(b"HTTP/1.0 200 OK");
        wire.write_faults = VecDeque::from([io::ErrorKind::BrokenPipe]);
        let (client, wire) = client_for(wire);
        assert_eq!(client.execute(&request()), ExchangeOutcome::Failure);
        assert_eq!(wire.borrow().read_pos, 0);
    }

    #[test]
    fn zero_length_write_is_failure() {
        let mut wire = responding(b"HTTP/1.0 200 OK");
        wire.zero_write = true;
        let (client, wire) = client_for(wire);
        assert_eq!(client.execute(&request()), ExchangeOutcome::Failure);
        assert_eq!(wire.borrow().read_pos, 0);
    }

    #[test]
    fn refused_connection_is_failure() {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let client = HttpsExchangeClient::new(
            FakeConnector {
                wire: Rc::clone(&wire),
                refuse: true,
            },
            443,
        );
        assert_eq!(client.execute(&request()), ExchangeOutcome::Failure);
        assert_eq!(wire.borrow().opened, 0);
    }

    #[test]
    fn each_exchange_uses_a_fresh_session() {
        let (client, wire) = client_for(responding(b"HTTP/1.0 200 OK"));
        assert_eq!(client.execute(&request()), ExchangeOutcome::Success);

        wire.borrow_mut().read_pos = 0;
        assert_eq!(client.execute(&request()), ExchangeOutcome::Success);

        let wire = wire.borrow();
        assert_eq!(wire.opened, 2);
        assert_eq!(wire.closed, 2);
    }
}
