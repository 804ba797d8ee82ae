//! Error types for orei-control.

use std::io;

use thiserror::Error;

/// Main error type for all controller operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport could not be opened.
    #[error("Connect to {addr} failed: {source}")]
    Connect {
        /// Address the connection was attempted against.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Writing a command line to the transport failed.
    #[error("Write failed: {0}")]
    Write(#[source] io::Error),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A command string does not have the `MMM[A]` shape.
    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),

    /// Action id not present in the command table.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Choice not offered by the action.
    #[error("Invalid choice {choice:?} for action {action}")]
    InvalidChoice {
        /// Table id of the action.
        action: String,
        /// Rejected choice id.
        choice: String,
    },
}

impl ControlError {
    /// Error code used to coalesce repeated transport failures.
    ///
    /// Only transport errors carry a code; everything else returns `None`
    /// and is always reported.
    pub fn kind(&self) -> Option<io::ErrorKind> {
        match self {
            ControlError::Io(e) | ControlError::Write(e) => Some(e.kind()),
            ControlError::Connect { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Result type alias using ControlError.
pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_kind() {
        let err = ControlError::Connect {
            addr: "10.0.0.5:60000".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.kind(), Some(io::ErrorKind::ConnectionRefused));
        assert!(err.to_string().contains("10.0.0.5:60000"));
    }

    #[test]
    fn test_non_transport_errors_have_no_kind() {
        assert_eq!(ControlError::Config("host".into()).kind(), None);
        assert_eq!(ControlError::InvalidCommand("P".into()).kind(), None);
    }
}
