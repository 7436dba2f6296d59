use crate::config;
use crate::https::Exchange;
use crate::relay::CommandRelay;
use log::{debug, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;

/// A byte port the command loop can drain
pub trait CommandPort: Read + Write {
    /// Drop whatever is still waiting in the receive buffer
    fn discard_pending(&mut self) -> io::Result<()>;
}

impl CommandPort for Box<dyn SerialPort> {
    fn discard_pending(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Open the node's UART as 8N1 with a short read timeout
pub fn open(path: &str, baud: u32) -> serialport::Result<Box<dyn SerialPort>> {
    let port = serialport::new(path, baud)
        .timeout(Duration::from_millis(config::SERIAL_READ_TIMEOUT_MS))
        .open()?;
    info!("serial: listening on {path} @ {baud}");
    Ok(port)
}

/// Wait for at most one command byte and answer it.
///
/// Anything received after the command byte is discarded before the command runs, so a
/// node that keeps retransmitting while an exchange is in flight is heard only once.
pub fn serve_once<P, E>(port: &mut P, relay: &mut CommandRelay<E>) -> io::Result<()>
where
    P: CommandPort,
    E: Exchange,
{
    let mut byte = [0u8; 1];
    match port.read(&mut byte) {
        Ok(0) => return Ok(()),
        Ok(_) => {}
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    port.discard_pending()?;

    if let Some(ack) = relay.handle(byte[0]) {
        debug!("serial: -> {ack}");
        port.write_all(ack.as_bytes())?;
        port.flush()?;
    }
    Ok(())
}

/// Serve commands until the port fails
pub fn run<P, E>(port: &mut P, relay: &mut CommandRelay<E>) -> io::Result<()>
where
    P: CommandPort,
    E: Exchange,
{
    loop {
        serve_once(port, relay)?;
    }
}
