//! Error taxonomy for every exchange driven by this crate.
//!
//! Errors are grouped by how a caller is expected to react to them:
//!
//! - [`MongoError::Framing`]: the reply stream is no longer trustworthy; the connection must be
//!   discarded. Never retried.
//! - [`MongoError::CommandFailure`]: the server answered with `ok: 0`. The full reply is kept.
//! - [`MongoError::WriteFailure`] / [`MongoError::DuplicateKey`]: per-item write errors reported
//!   inside an otherwise successful reply.
//! - [`MongoError::Auth`]: configuration or handshake problems while authenticating.
//!
//! Write-concern problems are *not* errors; they are attached to a
//! [`WriteResult`](crate::write::WriteResult) and must be inspected by the caller.
use bson::Document;
use thiserror::Error;

use crate::{
    connection::ConnectionError, document::CodecError, protocol::CommandResult,
    write::WriteResult,
};

pub type Result<T> = std::result::Result<T, MongoError>;

/// Violations of the reply framing rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("the responseTo ({actual}) in the reply does not match the requestId ({expected}) of the request")]
    ResponseTo { expected: i32, actual: i32 },

    #[error("unexpected reply opcode {actual}, expected {expected}")]
    OpCode { expected: i32, actual: i32 },

    #[error("reply truncated: needed {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("reply header declares {declared} bytes but the frame holds {actual}")]
    Length { declared: i32, actual: usize },

    #[error("reply header declares {declared} documents but the body holds {actual}")]
    DocumentCount { declared: i32, actual: usize },

    #[error("{0} unread bytes left after the last reply document")]
    TrailingBytes(usize),
}

/// Problems raised while authenticating credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("unsupported authentication mechanism '{0}'")]
    UnsupportedMechanism(String),

    #[error("no credential registered for source '{0}'")]
    MissingCredential(String),

    #[error("duplicate credentials for source '{0}'")]
    DuplicateCredential(String),

    #[error("authentication against '{database}' failed: {reason}")]
    Handshake { database: String, reason: String },
}

#[derive(Debug, Error)]
pub enum MongoError {
    #[error("protocol framing error: {0}")]
    Framing(#[from] FramingError),

    #[error(
        "command failed on server {}: {} (code {})",
        .0.address(),
        .0.error_message().unwrap_or("no error message"),
        .0.error_code().unwrap_or_default()
    )]
    CommandFailure(Box<CommandResult>),

    #[error("write failed: {}", .0.first_error_message())]
    WriteFailure(Box<WriteResult>),

    #[error("duplicate key error (code {code})")]
    DuplicateKey { code: i32, result: Box<WriteResult> },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("document of {size} bytes exceeds the maximum of {max} bytes")]
    DocumentTooLarge { size: usize, max: usize },

    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    /// Every completer of a result cell went away without delivering an outcome.
    #[error("operation abandoned before its result was delivered")]
    Abandoned,
}

impl MongoError {
    /// Returns `true` when the connection that produced this error must be discarded.
    pub fn is_framing(&self) -> bool {
        matches!(self, MongoError::Framing(_))
    }

    /// The server-reported error code, if the error originated from a server reply.
    pub fn code(&self) -> Option<i32> {
        match self {
            MongoError::CommandFailure(result) => result.error_code(),
            MongoError::DuplicateKey { code, .. } => Some(*code),
            MongoError::WriteFailure(result) => result.error_code(),
            _ => None,
        }
    }

    /// The server document carried as diagnostic payload, if any.
    pub fn server_response(&self) -> Option<&Document> {
        match self {
            MongoError::CommandFailure(result) => Some(result.response()),
            _ => None,
        }
    }

    /// The write outcome carried by a write failure.
    pub fn write_result(&self) -> Option<&WriteResult> {
        match self {
            MongoError::WriteFailure(result) | MongoError::DuplicateKey { result, .. } => {
                Some(&**result)
            }
            _ => None,
        }
    }
}
