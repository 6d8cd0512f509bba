//! Symbol Scout - clangd client library.
//!
//! Talks to a clangd process over its standard streams using the LSP
//! header framing, tracks per-file document state, and drives the
//! background-indexing handshake before exposing symbol queries. All
//! communication runs through two long-lived tasks coordinated by queues,
//! so callers simply await their replies.

pub mod cdb;
pub mod client;
pub mod dispatch;
pub mod documents;
pub mod error;
pub mod pending;
pub mod progress;
pub mod queries;
pub mod transport;
pub mod types;

pub use client::{ClangdClient, ClangdConfig, ConnectionState, OutboundEnvelope};
pub use error::{ClientError, ClientResult};
pub use types::{Location, Position, Range};
