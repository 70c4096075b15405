//! Error types shared by the register map, the codecs and the engine.

use thiserror::Error;

pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Everything that can go wrong while executing a command against a device.
///
/// `E` is the error type of the [`Transport`](crate::transport::Transport) in use.
#[derive(Error, Debug)]
pub enum Error<E: embedded_io::Error> {
    #[error(transparent)]
    UnknownCommand(#[from] UnknownCommand),
    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
    #[error("Transport error")]
    Transport(E),
    #[error("Invalid response: expected {expected} bytes, received {received}")]
    InvalidResponse { expected: usize, received: usize },
    #[error("{command} does not support {operation}")]
    UnsupportedAccess {
        command: &'static str,
        operation: &'static str,
    },
    #[error("Invalid page value {0}")]
    InvalidPage(u16),
}

impl<E: embedded_io::Error> Error<E> {
    /// True when the failure came from the underlying transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// No register entry or alias matched the requested name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command `{0}`")]
pub struct UnknownCommand(pub String);

/// A value does not fit the target register format.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Value {value} out of range ({min}..={max})")]
pub struct OutOfRange {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl OutOfRange {
    pub(crate) const fn new(value: f64, min: f64, max: f64) -> Self {
        Self { value, min, max }
    }
}
