//! `RequestResult<T>`, the wire-level ok/err envelope every backend
//! operation and RPC response is expressed in.
//!
//! This is the serializable mirror of [`crate::error::Result`]: backends
//! and the provider dispatcher exchange `RequestResult<T>` values across
//! the RPC boundary, and client handles convert an `err` envelope back
//! into a raised [`crate::error::Error`] at the blocking boundary.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A tagged ok/err envelope, serialized as `{"ok": true, "value": ...}` or
/// `{"ok": false, "error": {"kind": "...", "message": "..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "ok")]
pub enum RequestResult<T> {
    #[serde(rename = "true")]
    Ok {
        value: T,
    },
    #[serde(rename = "false")]
    Err {
        error: WireError,
    },
}

/// The serializable shape of an [`Error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for WireError {
    fn from(e: &Error) -> Self {
        WireError {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl WireError {
    /// Reconstruct an [`Error`] from its wire representation. The kind
    /// tag selects the variant; the message is carried through verbatim.
    pub fn into_error(self) -> Error {
        match self.kind.as_str() {
            "not_found" => Error::NotFound(self.message),
            "already_exists" => Error::AlreadyExists(self.message),
            "invalid" => Error::Invalid(self.message),
            "permission_denied" => Error::PermissionDenied(self.message),
            "unsupported" => Error::Unsupported(self.message),
            "empty" => Error::Empty(self.message),
            "io" => Error::Io(self.message),
            _ => Error::Internal(self.message),
        }
    }
}

impl<T> RequestResult<T> {
    pub fn success(value: T) -> Self {
        RequestResult::Ok { value }
    }

    pub fn error(e: &Error) -> Self {
        RequestResult::Err { error: e.into() }
    }

    /// Convert into a [`crate::error::Result`], consuming the envelope.
    pub fn into_result(self) -> crate::error::Result<T> {
        match self {
            RequestResult::Ok { value } => Ok(value),
            RequestResult::Err { error } => Err(error.into_error()),
        }
    }
}

impl<T> From<crate::error::Result<T>> for RequestResult<T> {
    fn from(r: crate::error::Result<T>) -> Self {
        match r {
            Ok(value) => RequestResult::success(value),
            Err(e) => RequestResult::error(&e),
        }
    }
}
