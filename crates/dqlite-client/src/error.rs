//! Client error types.

use std::fmt;
use std::io;
use std::sync::Arc;

use dqlite_wire::WireError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Step of an exchange during which a transport error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Writing the request header.
    SendHeader,
    /// Writing the request body.
    SendBody,
    /// Reading the response header.
    ReceiveHeader,
    /// Reading the response body.
    ReceiveBody,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Phase::SendHeader => "send header",
            Phase::SendBody => "send body",
            Phase::ReceiveHeader => "receive header",
            Phase::ReceiveBody => "receive body",
        };
        f.write_str(phase)
    }
}

/// A read made no progress after too many consecutive empty reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no progress after {attempts} consecutive empty reads")]
pub struct NoProgress {
    /// Number of empty reads observed.
    pub attempts: usize,
}

/// Errors that can occur during client operations.
///
/// The type is cheap to clone so that a latched transport error can be
/// handed back, identical, to every later caller.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The dial function failed.
    #[error("failed to establish network connection to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// The protocol version handshake could not be written.
    #[error("failed to send handshake: {0}")]
    Handshake(#[source] Arc<io::Error>),

    /// A read or write on the connection failed.
    #[error("failed to {phase}: {source}")]
    Transport {
        phase: Phase,
        #[source]
        source: Arc<io::Error>,
    },

    /// The deadline could not be applied to the connection.
    #[error("failed to set connection deadline: {0}")]
    Deadline(#[source] Arc<io::Error>),

    /// Closing the connection failed.
    #[error("failed to close connection: {0}")]
    Close(#[source] Arc<io::Error>),

    /// Malformed or unexpected message, or a failure reported by the node.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),
}

impl ClientError {
    /// Creates a dial error.
    pub fn dial(address: impl Into<String>, source: io::Error) -> Self {
        Self::Dial {
            address: address.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a transport error for the given phase.
    pub fn transport(phase: Phase, source: io::Error) -> Self {
        Self::Transport {
            phase,
            source: Arc::new(source),
        }
    }

    /// Returns true if the error came from the connection itself.
    ///
    /// Such errors leave the connection unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns the phase of a transport error.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Transport { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns true if a read gave up after too many empty reads.
    pub fn is_no_progress(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source
                .get_ref()
                .is_some_and(|inner| inner.is::<NoProgress>()),
            _ => false,
        }
    }
}
