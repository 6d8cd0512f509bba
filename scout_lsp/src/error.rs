//! Error types for the analyzer client.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by [`crate::client::ClangdClient`] and the query layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The caller passed an empty workspace path to `start`.
    #[error("workspace path cannot be empty")]
    EmptyWorkspacePath,

    /// An operation requires a running analyzer.
    #[error("analyzer is not running, call start first")]
    NotRunning,

    /// The request id counter overflowed.
    #[error("request id space exhausted")]
    IdExhausted,

    /// The connection was torn down while a caller was waiting on a reply.
    #[error("connection closed while waiting for the analyzer")]
    ConnectionClosed,

    /// `didClose` was issued for a document that was never opened.
    #[error("document was never opened: {path}")]
    NotOpened { path: PathBuf },

    /// The analyzer process could not be spawned.
    #[error("failed to spawn analyzer '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The compilation database is missing, malformed, or empty.
    #[error("compilation database error: {message}")]
    CompileDb { message: String },

    /// The static initialize-params document could not be used.
    #[error("invalid init params {path}: {message}")]
    InitParams { path: PathBuf, message: String },

    /// The analyzer violated the wire protocol.
    #[error("protocol violation: {message}")]
    Protocol { message: String },

    /// The analyzer answered a request with an error response.
    #[error("analyzer rejected {method}: {message}")]
    Server { method: String, message: String },

    /// A query produced no result to act on.
    #[error("empty result for {method}")]
    EmptyResult { method: String },

    /// Underlying stream or file IO failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Creates a protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        ClientError::Protocol {
            message: message.into(),
        }
    }

    /// Creates a compilation database error.
    pub fn compile_db(message: impl Into<String>) -> Self {
        ClientError::CompileDb {
            message: message.into(),
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
