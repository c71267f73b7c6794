//! Error types for pki-bootstrap
//!
//! Every failure the CA subsystem can report is a configuration or input
//! problem, so each variant carries the path or parameter name needed to fix it.

use std::path::Path;
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for key generation, CA lifecycle and leaf issuance
#[derive(Error, Debug)]
pub enum Error {
    /// Bad key size, empty SAN list, non-positive validity, unknown role...
    #[error("Invalid parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },

    /// Root (or leaf, when overwriting is refused) material is already present
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Expected file or directory is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Wrong passphrase, or passphrase required but missing
    #[error("Decryption error: {0}")]
    DecryptionError(String),

    /// Bytes are not valid PEM/DER key or certificate material
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Loaded root certificate violates the self-signed CA invariant
    #[error("Invalid root certificate: {0}")]
    InvalidRoot(String),

    /// Filesystem failures
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation attempted on a CA that has not been created or loaded
    #[error("Certificate authority not ready: {0}")]
    NotReady(String),

    /// Failure inside OpenSSL while building or signing
    #[error("Crypto error: {context}: {source}")]
    Crypto {
        context: String,
        #[source]
        source: openssl::error::ErrorStack,
    },
}

/// Copyable discriminant of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    AlreadyExists,
    NotFound,
    DecryptionError,
    ParseError,
    InvalidRoot,
    Io,
    NotReady,
    Crypto,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DecryptionError(_) => ErrorKind::DecryptionError,
            Error::ParseError(_) => ErrorKind::ParseError,
            Error::InvalidRoot(_) => ErrorKind::InvalidRoot,
            Error::Io { .. } => ErrorKind::Io,
            Error::NotReady(_) => ErrorKind::NotReady,
            Error::Crypto { .. } => ErrorKind::Crypto,
        }
    }

    /// Create an invalid parameter error naming the offending parameter
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::DecryptionError(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn invalid_root(msg: impl Into<String>) -> Self {
        Self::InvalidRoot(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Wrap an IO error with the path it happened on
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Map an OpenSSL error stack, keeping a short description of the step
    pub fn crypto(context: impl Into<String>) -> impl FnOnce(openssl::error::ErrorStack) -> Self {
        let context = context.into();
        move |source| Self::Crypto { context, source }
    }
}
