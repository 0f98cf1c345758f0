//! Error types for MIME operations.

use std::string::FromUtf8Error;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid MIME header.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Invalid encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),

    /// A recipient list contained an address that does not parse.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The sender context has no usable address.
    #[error("Missing sender address")]
    MissingSender,

    /// Reading an attachment from the store failed.
    #[error("Attachment {name}: {source}")]
    Attachment {
        /// Cached file name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
