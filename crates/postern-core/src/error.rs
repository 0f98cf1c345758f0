//! Error types for the core library.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument was rejected before any network I/O.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Message assembly failed.
    #[error("MIME error: {0}")]
    Mime(#[from] postern_mime::Error),

    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] postern_imap::Error),

    /// The mail server has no such message.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A server round trip took longer than allowed.
    #[error("Cancelled after {0:?}")]
    Cancelled(Duration),

    /// Handing a message to the delivery backend failed.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification for callers that map errors to user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad folder, UID, address list or setting.
    InvalidInput,
    /// The mail server or the connection to it failed.
    Protocol(ProtocolKind),
    /// The message does not exist.
    NotFound,
    /// Timed out.
    Cancelled,
}

/// Which side of the protocol failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// Could not reach the server or the connection dropped.
    Connection,
    /// Credentials were rejected.
    Login,
    /// The server refused or garbled a command.
    MailServer,
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::Mime(_) | Self::Serde(_) => ErrorKind::InvalidInput,
            Self::Imap(e) => match e {
                postern_imap::Error::Timeout(_) => ErrorKind::Cancelled,
                postern_imap::Error::Auth(_) => ErrorKind::Protocol(ProtocolKind::Login),
                e if e.is_connection() => ErrorKind::Protocol(ProtocolKind::Connection),
                _ => ErrorKind::Protocol(ProtocolKind::MailServer),
            },
            Self::Io(_) => ErrorKind::Protocol(ProtocolKind::Connection),
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Delivery(_) => ErrorKind::Protocol(ProtocolKind::MailServer),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_imap_errors_are_classified() {
        let auth = Error::from(postern_imap::Error::Auth("bad password".into()));
        assert_eq!(auth.kind(), ErrorKind::Protocol(ProtocolKind::Login));

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let dropped = Error::from(postern_imap::Error::Io(io));
        assert_eq!(dropped.kind(), ErrorKind::Protocol(ProtocolKind::Connection));

        let refused = Error::from(postern_imap::Error::No("no such mailbox".into()));
        assert_eq!(refused.kind(), ErrorKind::Protocol(ProtocolKind::MailServer));

        let slow = Error::from(postern_imap::Error::Timeout(Duration::from_secs(5)));
        assert_eq!(slow.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_builder_errors_are_invalid_input() {
        let err = Error::from(postern_mime::Error::InvalidAddress("bogus".into()));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("bogus"));
    }
}
