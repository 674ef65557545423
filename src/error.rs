//! Error taxonomy shared by every layer of the store.

use thiserror::Error;

/// The result type used throughout the crate's in-process API.
pub type Result<T> = std::result::Result<T, Error>;

/// The kinds of failure a backend, the provider, or a client handle can
/// surface. Each variant corresponds to one row of the error-kind table.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("empty result: {0}")]
    Empty(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The short kind name, used when building wire-level error envelopes
    /// and for test assertions against the error taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::Invalid(_) => "invalid",
            Error::PermissionDenied(_) => "permission_denied",
            Error::Unsupported(_) => "unsupported",
            Error::Empty(_) => "empty",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Invalid(e.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<Box<rhai::EvalAltResult>> for Error {
    fn from(e: Box<rhai::EvalAltResult>) -> Self {
        Error::Invalid(e.to_string())
    }
}

impl From<rhai::ParseError> for Error {
    fn from(e: rhai::ParseError) -> Self {
        Error::Invalid(e.to_string())
    }
}
