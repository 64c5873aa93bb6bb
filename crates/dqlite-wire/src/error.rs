//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding messages.
///
/// These are protocol-level errors: they describe a malformed or unexpected
/// message, never a broken transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The response carries a different message type than the one expected.
    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedType { expected: u8, actual: u8 },

    /// The node answered with a failure response.
    #[error("node failure ({code}): {message}")]
    Failure { code: u64, message: String },

    /// Attempted to read past the end of the body.
    #[error("truncated body: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// A string is missing its nul terminator.
    #[error("string is not nul-terminated")]
    UnterminatedString,

    /// A decoded string is not valid UTF-8.
    #[error("string is not valid utf-8")]
    InvalidUtf8,

    /// A string to encode contains an interior nul byte.
    #[error("string contains an interior nul byte")]
    InteriorNul,

    /// The body does not fit in the header's word count.
    #[error("body too large: {size} bytes")]
    BodyTooLarge { size: usize },
}
