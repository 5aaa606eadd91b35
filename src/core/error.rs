use std::io;
use thiserror::Error;

/// Error types for the NAN engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unrecognized protocol: {0}")]
    UnrecognizedProtocol(String),

    #[error("Transmit failure: code {code}")]
    TransmitFailure { code: i32 },

    #[error("Outbound queue full")]
    QueueFull,

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedFrame(msg.into())
    }

    /// Creates a new unrecognized protocol error
    pub fn unrecognized(msg: impl Into<String>) -> Self {
        Error::UnrecognizedProtocol(msg.into())
    }

    /// Creates a new transmit failure from a driver error code
    pub fn transmit(code: i32) -> Self {
        Error::TransmitFailure { code }
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::malformed("tlv overrun");
        assert!(matches!(err, Error::MalformedFrame(_)));
        assert_eq!(err.to_string(), "Malformed frame: tlv overrun");
    }

    #[test]
    fn test_transmit_failure_display() {
        let err = Error::transmit(-3);
        assert_eq!(err.to_string(), "Transmit failure: code -3");
        assert!(matches!(err, Error::TransmitFailure { code: -3 }));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
