use thiserror::Error;

/// Where in the single-wire exchange a wait ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Sensor never pulled the line low after the start signal
    ResponseLow,
    /// Acknowledge low phase never ended
    ResponseHigh,
    /// Acknowledge high phase never ended
    DataStart,
    /// Low phase of the given bit never ended
    BitStart(u8),
    /// High phase of the given bit never ended
    BitEnd(u8),
}

/// Errors of a temperature/humidity acquisition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError<E> {
    #[error("sensor timed out in {0:?}")]
    Timeout(Phase),
    #[error("checksum mismatch: frame says {expected:#04x}, bytes sum to {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    #[error("data pin error: {0:?}")]
    Pin(E),
}

/// Errors of a distance poll.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangingError<E> {
    #[error("no new sample ready")]
    NotReady,
    #[error("sample discarded, range status {0}")]
    InvalidStatus(u8),
    #[error("ranging device error: {0:?}")]
    Device(E),
}

/// Why a single step of a modem session failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StepError {
    /// The reply never contained the expected token
    #[error("expected reply not received")]
    CommandMismatch,
    /// A prompt or transmit slot never came
    #[error("timed out")]
    Timeout,
    #[error("serial link error")]
    Serial,
    #[error("command does not fit the command buffer")]
    CommandTooLong,
    #[error("payload does not fit the payload buffer")]
    PayloadTooLong,
}
