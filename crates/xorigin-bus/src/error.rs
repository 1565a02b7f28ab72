use std::time::Duration;

use xorigin_codec::CodecError;
use xorigin_transport::TransportError;

/// How a failed call should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The call failed; retrying or reacting is up to the caller.
    Error,
    /// The call could never succeed as issued (nothing was sent).
    Fatal,
}

/// Errors that can occur in bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The remote handler rejected the call. Carries the rejection reason.
    #[error("remote handler failed: {0}")]
    Remote(serde_json::Value),

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The bus has been disposed.
    #[error("bus has been disposed")]
    Disposed,

    /// The bus options failed validation.
    #[error("invalid bus options: {0}")]
    InvalidOptions(String),

    /// The bus was created outside a tokio runtime.
    #[error("no async runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

impl BusError {
    /// Severity of the error.
    pub fn severity(&self) -> Severity {
        match self {
            BusError::Codec(err) if err.is_fatal() => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Shorthand for `severity() == Severity::Fatal`.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
