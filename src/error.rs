//! Link error taxonomy
//!
//! The facade never surfaces these to its callers. They flow into the diagnostics sink
//! and the facade degrades to a no-op, `false` or the last known value.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to open port {port}: {source}")]
    Open {
        port:   String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to list serial ports: {0}")]
    Enumerate(#[source] serialport::Error),

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{port} is not a Copley controller, ping answered {response:02X?}")]
    ProbeMismatch { port: String, response: Vec<u8> },

    #[error("no Copley controller found on any of {scanned} ports")]
    NoControllerFound { scanned: usize },

    #[error("response timed out after {waited_ms} ms with {received} bytes")]
    Timeout { waited_ms: u64, received: usize },

    #[error("checksum mismatch in response {response:02X?}")]
    Checksum { response: Vec<u8> },

    #[error("unexpected response data length: expected {expected}, got {got}")]
    UnexpectedLength { expected: usize, got: usize },

    #[error("controller answered with error code {code:#04x}")]
    Controller { code: u8 },

    #[error("not connected")]
    NotConnected,

    #[error("exchange cancelled")]
    Cancelled,
}

/// Counter bucket for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Port,
    Probe,
    Timeout,
    Checksum,
    Length,
    Controller,
    Cancelled,
}

impl LinkError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Open { .. } | Self::Enumerate(_) | Self::Io(_) | Self::NotConnected => {
                FailureKind::Port
            }
            Self::ProbeMismatch { .. } | Self::NoControllerFound { .. } => FailureKind::Probe,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Checksum { .. } => FailureKind::Checksum,
            Self::UnexpectedLength { .. } => FailureKind::Length,
            Self::Controller { .. } => FailureKind::Controller,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
