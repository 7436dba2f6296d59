//! Single-byte command dispatch.
//!
//! The sensor node sends one ASCII byte per command. Network commands run one HTTPS
//! exchange and are acknowledged with `DONE:<c>` or `<c>:FAIL`. A byte equal to the
//! previous accepted command is treated as a retransmission: it is acknowledged with
//! `DONE:<c>` without repeating the side effect. A failed exchange is not remembered, so
//! resending the same byte runs it again.

use crate::config;
use crate::https::{Exchange, ExchangeOutcome, OutboundRequest};
use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `C`: the node finished booting
    ConfirmStartup,
    /// `N`: report an event, carrying the secret token
    NotifyEvent,
    /// `P` or `R`: liveness probe
    Probe(u8),
    /// `G`: refresh the repeat filter without acknowledging
    Refresh,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'C' => Some(Command::ConfirmStartup),
            b'N' => Some(Command::NotifyEvent),
            b'P' | b'R' => Some(Command::Probe(byte)),
            b'G' => Some(Command::Refresh),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Command::ConfirmStartup => 'C',
            Command::NotifyEvent => 'N',
            Command::Probe(byte) => char::from(byte),
            Command::Refresh => 'G',
        }
    }
}

/// Where each network command is sent
#[derive(Debug, Clone)]
pub struct RelayTargets {
    pub host: String,
    pub notify_path: String,
    pub probe_path: String,
}

impl Default for RelayTargets {
    fn default() -> Self {
        Self {
            host: config::RELAY_HOST.to_string(),
            notify_path: config::NOTIFY_PATH.to_string(),
            probe_path: config::PROBE_PATH.to_string(),
        }
    }
}

pub struct CommandRelay<E> {
    exchange: E,
    targets: RelayTargets,
    secret: SecretString,
    last_command: Option<u8>,
}

impl<E: Exchange> CommandRelay<E> {
    pub fn new(exchange: E, targets: RelayTargets, secret: SecretString) -> Self {
        Self {
            exchange,
            targets,
            secret,
            last_command: None,
        }
    }

    /// Process one received byte and return the acknowledgement to send back, if any
    pub fn handle(&mut self, byte: u8) -> Option<String> {
        let Some(command) = Command::from_byte(byte) else {
            debug!("ignoring byte 0x{byte:02X}");
            return None;
        };

        let repeated = self.last_command == Some(byte);
        self.last_command = Some(byte);
        let code = command.code();

        match command {
            Command::Refresh => None,
            _ if repeated => {
                debug!("{code} repeated, acknowledging without side effect");
                Some(format!("DONE:{code}"))
            }
            Command::ConfirmStartup => {
                info!("node started");
                Some("C:STARTED".to_string())
            }
            Command::NotifyEvent | Command::Probe(_) => {
                let request = self.request_for(command);
                match self.exchange.execute(&request) {
                    ExchangeOutcome::Success => Some(format!("DONE:{code}")),
                    ExchangeOutcome::Failure => {
                        self.last_command = None;
                        Some(format!("{code}:FAIL"))
                    }
                }
            }
        }
    }

    fn request_for(&self, command: Command) -> OutboundRequest {
        let host = &self.targets.host;
        match command {
            Command::NotifyEvent => OutboundRequest::post(
                host,
                &self.targets.notify_path,
                self.secret.expose_secret().as_bytes(),
            ),
            _ => OutboundRequest::get(host, &self.targets.probe_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct RecordingExchange {
        outcomes: RefCell<VecDeque<ExchangeOutcome>>,
        seen: RefCell<Vec<OutboundRequest>>,
    }

    impl RecordingExchange {
        fn failing_first(n: usize) -> Self {
            let exchange = Self::default();
            exchange
                .outcomes
                .borrow_mut()
                .extend(std::iter::repeat_n(ExchangeOutcome::Failure, n));
            exchange
        }
    }

    impl Exchange for &RecordingExchange {
        fn execute(&self, request: &OutboundRequest) -> ExchangeOutcome {
            self.seen.borrow_mut().push(request.clone());
            self.outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or(ExchangeOutcome::Success)
        }
    }

    fn relay(exchange: &RecordingExchange) -> CommandRelay<&RecordingExchange> {
        CommandRelay::new(
            exchange,
            RelayTargets {
                host: "relay.example.net".into(),
                notify_path: "/notify".into(),
                probe_path: "/alive".into(),
            },
            SecretString::from("tok3n".to_string()),
        )
    }

    fn feed(relay: &mut CommandRelay<&RecordingExchange>, bytes: &[u8]) -> Vec<Option<String>> {
        bytes.iter().map(|&b| relay.handle(b)).collect()
    }

    fn ack(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn repeated_notify_runs_once() {
        let exchange = RecordingExchange::default();
        let mut relay = relay(&exchange);

        assert_eq!(
            feed(&mut relay, b"NNP"),
            vec![ack("DONE:N"), ack("DONE:N"), ack("DONE:P")]
        );

        let seen = exchange.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].url(), "https://relay.example.net/notify");
        assert!(
            seen[0]
                .as_bytes()
                .starts_with(b"POST https://relay.example.net/notify HTTP/1.0\r\n")
        );
        assert!(seen[0].as_bytes().ends_with(b"\r\n\r\ntok3n"));
        assert!(
            seen[1]
                .as_bytes()
                .starts_with(b"GET https://relay.example.net/alive HTTP/1.0\r\n")
        );
    }

    #[test]
    fn unknown_bytes_are_ignored() {
        let exchange = RecordingExchange::default();
        let mut relay = relay(&exchange);

        assert_eq!(feed(&mut relay, b"X\n\0"), vec![None, None, None]);
        assert!(exchange.seen.borrow().is_empty());
    }

    #[test]
    fn unknown_bytes_do_not_break_repeat_detection() {
        let exchange = RecordingExchange::default();
        let mut relay = relay(&exchange);

        assert_eq!(
            feed(&mut relay, b"NXN"),
            vec![ack("DONE:N"), None, ack("DONE:N")]
        );
        assert_eq!(exchange.seen.borrow().len(), 1);
    }

    #[test]
    fn failed_exchange_is_reported() {
        let exchange = RecordingExchange::failing_first(2);
        let mut relay = relay(&exchange);

        assert_eq!(feed(&mut relay, b"NP"), vec![ack("N:FAIL"), ack("P:FAIL")]);
    }

    #[test]
    fn repeat_after_failure_runs_again() {
        let exchange = RecordingExchange::failing_first(1);
        let mut relay = relay(&exchange);

        assert_eq!(
            feed(&mut relay, b"RRR"),
            vec![ack("R:FAIL"), ack("DONE:R"), ack("DONE:R")]
        );
        assert_eq!(exchange.seen.borrow().len(), 2);
    }

    #[test]
    fn persistent_failure_is_never_reported_as_done() {
        let exchange = RecordingExchange::failing_first(3);
        let mut relay = relay(&exchange);

        assert_eq!(
            feed(&mut relay, b"NNN"),
            vec![ack("N:FAIL"), ack("N:FAIL"), ack("N:FAIL")]
        );
        assert_eq!(exchange.seen.borrow().len(), 3);
    }

    #[test]
    fn refresh_resets_repeat_filter_silently() {
        let exchange = RecordingExchange::default();
        let mut relay = relay(&exchange);

        assert_eq!(
            feed(&mut relay, b"NGNGG"),
            vec![ack("DONE:N"), None, ack("DONE:N"), None, None]
        );
        assert_eq!(exchange.seen.borrow().len(), 2);
    }

    #[test]
    fn startup_confirmation() {
        let exchange = RecordingExchange::default();
        let mut relay = relay(&exchange);

        assert_eq!(
            feed(&mut relay, b"CCPC"),
            vec![ack("C:STARTED"), ack("DONE:C"), ack("DONE:P"), ack("C:STARTED")]
        );
        assert_eq!(exchange.seen.borrow().len(), 1);
    }

    #[test]
    fn probe_codes_are_distinct_commands() {
        let exchange = RecordingExchange::default();
        let mut relay = relay(&exchange);

        assert_eq!(
            feed(&mut relay, b"PRP"),
            vec![ack("DONE:P"), ack("DONE:R"), ack("DONE:P")]
        );
        assert_eq!(exchange.seen.borrow().len(), 3);
    }

    #[test]
    fn command_codes_round_trip() {
        for byte in *b"CNPRG" {
            let command = Command::from_byte(byte).unwrap();
            assert_eq!(command.code(), char::from(byte));
        }
        assert_eq!(Command::from_byte(b'n'), None);
    }
}
