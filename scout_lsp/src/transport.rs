//! JSON-RPC transport layer for analyzer communication.
//!
//! Handles reading and writing framed messages over stdin/stdout of the
//! analyzer process. A message is a `Content-Length: <N>` header line, an
//! empty line, then exactly N bytes of JSON. clangd interleaves plain log
//! lines on the same stream; anything that is not a header line is treated
//! as diagnostic output and discarded.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// JSON-RPC message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request initiated by the analyzer (has `id` and `method`).
    Request(JsonRpcRequest),
    /// A reply to one of our requests (has `id`, no `method`).
    Response(JsonRpcResponse),
    /// A notification (has `method`, no `id`).
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Short description for log and error messages.
    pub fn describe(&self) -> String {
        match self {
            JsonRpcMessage::Request(req) => format!("request {}", req.method),
            JsonRpcMessage::Response(resp) => format!("response {:?}", resp.id),
            JsonRpcMessage::Notification(notif) => format!("notification {}", notif.method),
        }
    }
}

/// JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request ID (can be number or string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

/// Read half of the transport.
///
/// Generic over the stream so tests can run against in-memory pipes.
pub struct TransportReader<R> {
    stream: R,
}

impl<R: AsyncBufRead + Unpin> TransportReader<R> {
    /// Creates a reader over the analyzer's output stream.
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Reads the next framed payload, skipping interleaved log output.
    ///
    /// Returns the raw JSON text of one message. An `UnexpectedEof` error
    /// means the analyzer closed its output stream.
    pub async fn read_message(&mut self) -> std::io::Result<String> {
        let mut content_length: Option<usize> = None;
        let mut header_line = String::new();

        loop {
            header_line.clear();
            let bytes_read = self.stream.read_line(&mut header_line).await?;
            if bytes_read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "analyzer closed its output stream",
                ));
            }

            let line = header_line.trim_end_matches(['\r', '\n']);

            if let Some(len_str) = line.strip_prefix("Content-Length:") {
                content_length = Some(len_str.trim().parse().map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid Content-Length")
                })?);
            } else if line.is_empty() {
                if let Some(length) = content_length {
                    return self.read_body(length).await;
                }
                // stray blank line with no header, treat as log noise
            } else {
                // not a protocol frame, clangd log output
                log::debug!("analyzer log: {}", line);
            }
        }
    }

    async fn read_body(&mut self, length: usize) -> std::io::Result<String> {
        let mut content = vec![0u8; length];
        self.stream.read_exact(&mut content).await?;

        let payload = String::from_utf8(content).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid UTF-8 in message")
        })?;

        log::trace!("received: {}", payload);
        Ok(payload)
    }
}

/// Write half of the transport.
pub struct TransportWriter<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> TransportWriter<W> {
    /// Creates a writer over the analyzer's input stream.
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    /// Frames and sends a JSON-RPC message, flushing the stream.
    pub async fn write_message(&mut self, message: &Value) -> std::io::Result<()> {
        let content = serde_json::to_string(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", content.len());

        self.stream.write_all(header.as_bytes()).await?;
        self.stream.write_all(content.as_bytes()).await?;
        self.stream.flush().await?;

        log::trace!("sent: {}", content);
        Ok(())
    }
}

/// Parses a raw payload and determines its message type.
pub fn parse_message(payload: &str) -> Option<JsonRpcMessage> {
    let value: Value = serde_json::from_str(payload).ok()?;

    // A response has an id and result/error but no method
    if value.get("id").is_some() && value.get("method").is_none() {
        return serde_json::from_value(value)
            .ok()
            .map(JsonRpcMessage::Response);
    }

    // An analyzer-initiated request has both id and method
    if value.get("id").is_some() && value.get("method").is_some() {
        return serde_json::from_value(value)
            .ok()
            .map(JsonRpcMessage::Request);
    }

    // A notification has a method but no id
    if value.get("method").is_some() && value.get("id").is_none() {
        return serde_json::from_value(value)
            .ok()
            .map(JsonRpcMessage::Notification);
    }

    None
}
