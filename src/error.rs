//! Error types
//!
//! Validation failures (empty channel name, empty payload, unknown command)
//! are not errors at this level: they are answered with an error frame and
//! the session keeps going. Only conditions that change the control flow of a
//! session or a channel surface as [`Error`].

use std::fmt;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Read or write failure on the underlying connection (fatal for a session)
    Io(std::io::Error),
    /// Malformed wire frame (recoverable, reported to the peer)
    Protocol(ProtocolError),
    /// Operation submitted to a channel actor that has been closed
    ChannelClosed(String),
}

impl Error {
    /// Whether the session can answer with an error frame and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::ChannelClosed(name) => write!(f, "Channel closed: {}", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::ChannelClosed(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

/// Malformed RESP input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Expected a `$` bulk string inside a multi-bulk request
    ExpectedBulk(u8),
    /// Length header is not a valid integer
    InvalidLength,
    /// Multi-bulk element count out of range
    InvalidMultiBulkLength,
    /// Bulk string length out of range
    InvalidBulkLength,
    /// Bulk payload not followed by CRLF
    MissingCrlf,
    /// Inline request line exceeds the maximum size
    InlineTooLong,
    /// Unbalanced quotes or similar in an inline request
    InvalidInline,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ExpectedBulk(b) => {
                write!(f, "expected '$', got '{}'", char::from(*b).escape_default())
            }
            ProtocolError::InvalidLength => write!(f, "invalid length"),
            ProtocolError::InvalidMultiBulkLength => write!(f, "invalid multibulk length"),
            ProtocolError::InvalidBulkLength => write!(f, "invalid bulk length"),
            ProtocolError::MissingCrlf => write!(f, "expected CRLF after bulk data"),
            ProtocolError::InlineTooLong => write!(f, "too big inline request"),
            ProtocolError::InvalidInline => write!(f, "unbalanced quotes in request"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_is_recoverable() {
        let err: Error = ProtocolError::InvalidLength.into();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Protocol error: invalid length");
    }

    #[test]
    fn test_io_error_is_fatal() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_expected_bulk_display() {
        assert_eq!(
            ProtocolError::ExpectedBulk(b':').to_string(),
            "expected '$', got ':'"
        );
    }
}
