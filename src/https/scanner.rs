/// Go/no-go result of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    /// Inside the protocol-version token
    SeekingSpace,
    /// The next byte is the first status digit
    AwaitingStatusDigit,
    Decided(ExchangeOutcome),
}

/// Classifies an HTTP response from its status line, one byte at a time.
///
/// Only the first digit of the status code is examined: `2` is success, anything else is
/// failure. The rest of the code and everything after it is never looked at.
#[derive(Debug, Clone)]
pub struct StatusLineScanner {
    state: ScannerState,
    status_class: Option<u8>,
}

impl Default for StatusLineScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLineScanner {
    pub fn new() -> Self {
        Self {
            state: ScannerState::SeekingSpace,
            status_class: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// The decisive byte, once seen
    pub fn status_class(&self) -> Option<u8> {
        self.status_class
    }

    /// Consume one byte. Returns the decision once made; further calls leave it unchanged
    /// and ignore their byte.
    pub fn feed(&mut self, byte: u8) -> Option<ExchangeOutcome> {
        match self.state {
            ScannerState::SeekingSpace => {
                if byte == b' ' {
                    self.state = ScannerState::AwaitingStatusDigit;
                }
                None
            }
            ScannerState::AwaitingStatusDigit => {
                let outcome = if byte == b'2' {
                    ExchangeOutcome::Success
                } else {
                    ExchangeOutcome::Failure
                };
                self.status_class = Some(byte);
                self.state = ScannerState::Decided(outcome);
                Some(outcome)
            }
            ScannerState::Decided(outcome) => Some(outcome),
        }
    }
}
