//! Analyzer client - owns the clangd process and the message pipelines.
//!
//! The client spawns clangd rooted at a workspace and runs two long-lived
//! tasks: one draining the outbound queue onto the analyzer's stdin, one
//! reading its stdout, reframing, and dispatching against the pending
//! ledger. Replies reach waiting callers through a shared delivery queue.
//! `start` only returns once the analyzer has finished indexing the
//! project, so queries issued afterwards see the whole workspace.

use crate::cdb;
use crate::dispatch::{self, Route};
use crate::documents::DocumentTracker;
use crate::error::ClientError;
use crate::pending::PendingLedger;
use crate::progress::{IndexProgress, IndexStep};
use crate::transport::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    TransportReader, TransportWriter,
};
use crate::types::path_to_uri;
use lsp_types::{
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, TextDocumentIdentifier,
    TextDocumentItem,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Request ids are allocated above this value; the first one issued is 11.
const INITIAL_REQUEST_ID: i64 = 10;

/// Analyzer process configuration.
#[derive(Debug, Clone)]
pub struct ClangdConfig {
    /// Command used to launch the analyzer.
    pub command: String,
    /// Arguments passed to the analyzer.
    pub args: Vec<String>,
    /// Optional JSON document supplied verbatim as `initialize` params.
    /// When absent, default client capabilities are sent.
    pub init_params_path: Option<PathBuf>,
    /// Language id announced in `didOpen` notifications.
    pub language_id: String,
}

impl Default for ClangdConfig {
    fn default() -> Self {
        Self {
            command: "clangd".to_string(),
            args: vec![
                "--log=verbose".to_string(),
                "--background-index".to_string(),
            ],
            init_params_path: None,
            language_id: "c".to_string(),
        }
    }
}

/// Lifecycle state of the analyzer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No analyzer process.
    Stopped,
    /// Process spawned, handshake or indexing still in flight.
    Starting,
    /// Indexing finished, queries are meaningful.
    Running,
}

/// A queued outbound message paired with whether it expects a reply.
#[derive(Debug)]
pub struct OutboundEnvelope {
    pub payload: Value,
    pub needs_response: bool,
}

/// Live wiring to a running analyzer: queues, ledger, tasks, process handle.
struct Connection {
    outbound_tx: mpsc::UnboundedSender<OutboundEnvelope>,
    delivery_rx: Mutex<mpsc::UnboundedReceiver<JsonRpcMessage>>,
    ledger: Arc<Mutex<PendingLedger>>,
    send_task: JoinHandle<()>,
    receive_task: JoinHandle<()>,
    child: Option<Child>,
}

impl Connection {
    /// Wires the two pipeline tasks onto the given streams.
    fn new<R, W>(reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let ledger = Arc::new(Mutex::new(PendingLedger::new()));

        let send_task = tokio::spawn(drain_outbound(
            TransportWriter::new(writer),
            outbound_rx,
            ledger.clone(),
        ));
        let receive_task = tokio::spawn(dispatch_inbound(
            TransportReader::new(reader),
            delivery_tx,
            ledger.clone(),
        ));

        Self {
            outbound_tx,
            delivery_rx: Mutex::new(delivery_rx),
            ledger,
            send_task,
            receive_task,
            child,
        }
    }

    /// Pushes a message onto the outbound queue.
    fn enqueue(&self, payload: Value, needs_response: bool) -> Result<(), ClientError> {
        self.outbound_tx
            .send(OutboundEnvelope {
                payload,
                needs_response,
            })
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Takes the next delivery-queue entry. Callers consume in FIFO order,
    /// one entry per call; a closed queue means the connection died.
    async fn receive(&self) -> Result<JsonRpcMessage, ClientError> {
        self.delivery_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(ClientError::ConnectionClosed)
    }

    /// Cancels both pipeline tasks and terminates the analyzer process.
    async fn shutdown(mut self) {
        self.send_task.abort();
        self.receive_task.abort();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                log::warn!("failed to kill analyzer process: {}", e);
            }
        }
    }
}

/// Drains the outbound queue onto the analyzer's input stream.
async fn drain_outbound<W>(
    mut writer: TransportWriter<W>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundEnvelope>,
    ledger: Arc<Mutex<PendingLedger>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = outbound_rx.recv().await {
        if envelope.needs_response {
            // the ledger entry must exist before the bytes hit the wire, or
            // a fast reply could arrive with nothing to match against
            if let (Some(id), Some(method)) = (
                envelope.payload.get("id").and_then(Value::as_i64),
                envelope.payload.get("method").and_then(Value::as_str),
            ) {
                log::debug!("sending {}({})", method, id);
                ledger.lock().await.insert(id, method);
            }
        } else if let Some(method) = envelope.payload.get("method").and_then(Value::as_str) {
            log::debug!("sending {}", method);
        }

        if let Err(e) = writer.write_message(&envelope.payload).await {
            log::error!("failed to write to analyzer: {}", e);
            break;
        }
    }
}

/// Reads framed payloads and routes them against the pending ledger.
async fn dispatch_inbound<R>(
    mut reader: TransportReader<R>,
    delivery_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    ledger: Arc<Mutex<PendingLedger>>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        let payload = match reader.read_message().await {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("analyzer stream ended: {}", e);
                break;
            }
        };

        let route = {
            let mut ledger = ledger.lock().await;
            dispatch::route_payload(&payload, &mut ledger)
        };
        match route {
            Route::Deliver(message) => {
                if delivery_tx.send(message).is_err() {
                    break;
                }
            }
            Route::Drop => {}
        }
    }
    // dropping delivery_tx here releases any caller still blocked on a reply
}

/// Client for a clangd analyzer process.
pub struct ClangdClient {
    config: ClangdConfig,
    state: ConnectionState,
    workspace: PathBuf,
    next_id: AtomicI64,
    documents: Mutex<DocumentTracker>,
    connection: Option<Connection>,
}

impl ClangdClient {
    /// Creates a stopped client with the given configuration.
    pub fn new(config: ClangdConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Stopped,
            workspace: PathBuf::new(),
            next_id: AtomicI64::new(INITIAL_REQUEST_ID),
            documents: Mutex::new(DocumentTracker::new()),
            connection: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Workspace the analyzer is rooted at, if any.
    pub fn workspace(&self) -> Option<&Path> {
        if self.connection.is_some() {
            Some(&self.workspace)
        } else {
            None
        }
    }

    /// Starts the analyzer for a workspace and waits for indexing to finish.
    ///
    /// Starting against the workspace that is already running is a no-op;
    /// a different workspace restarts the analyzer. A failed start tears
    /// down whatever partial state it created.
    pub async fn start(&mut self, workspace_path: impl AsRef<Path>) -> Result<(), ClientError> {
        let workspace = workspace_path.as_ref();
        if workspace.as_os_str().is_empty() {
            return Err(ClientError::EmptyWorkspacePath);
        }

        if self.connection.is_some() {
            if workspace == self.workspace {
                return Ok(());
            }
            log::info!("workspace changed, restarting analyzer");
            self.stop().await;
        }

        self.state = ConnectionState::Starting;
        self.workspace = workspace.to_path_buf();

        let workspace = self.workspace.clone();
        match self.start_inner(&workspace).await {
            Ok(()) => {
                self.state = ConnectionState::Running;
                log::info!("analyzer ready at {}", workspace.display());
                Ok(())
            }
            Err(e) => {
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn start_inner(&mut self, workspace: &Path) -> Result<(), ClientError> {
        // locate the compilation database before paying for a process spawn
        let db_path = cdb::find_compile_db(workspace)?;

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .current_dir(workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = command.spawn().map_err(|source| ClientError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;
        log::info!("started analyzer: {}", self.config.command);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::protocol("analyzer stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::protocol("analyzer stdout was not piped"))?;

        self.connection = Some(Connection::new(BufReader::new(stdout), stdin, Some(child)));

        // initialize handshake
        let init_params = self.load_init_params(workspace).await?;
        let response = self.send_request("initialize", init_params).await?;
        if let Some(error) = response.error {
            return Err(ClientError::Server {
                method: "initialize".to_string(),
                message: error.message,
            });
        }
        self.send_notification("initialized", json!({})).await?;

        // open one file from the compilation database so indexing starts
        let trigger = cdb::first_source_file(&db_path).await?;
        self.open_document(&trigger).await?;

        self.wait_for_background_index().await
    }

    /// Stops the analyzer and releases every caller still waiting on a reply.
    ///
    /// Queues are dropped wholesale; the next `start` builds fresh ones.
    pub async fn stop(&mut self) {
        if let Some(connection) = self.connection.take() {
            log::info!("stopping analyzer");
            connection.ledger.lock().await.clear();
            connection.shutdown().await;
        }
        self.documents.lock().await.clear();
        self.workspace = PathBuf::new();
        self.state = ConnectionState::Stopped;
    }

    /// Sends a request and waits for its reply on the delivery queue.
    ///
    /// Stale progress entries left over from earlier indexing rounds are
    /// skipped, not returned.
    pub async fn send_request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<JsonRpcResponse, ClientError> {
        let connection = self.connection.as_ref().ok_or(ClientError::NotRunning)?;
        let id = self.next_request_id()?;

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.to_string(),
            params: Some(params),
        };
        connection.enqueue(serde_json::to_value(request)?, true)?;

        loop {
            match connection.receive().await? {
                JsonRpcMessage::Response(response) => return Ok(response),
                other => log::debug!("skipping stale delivery entry: {}", other.describe()),
            }
        }
    }

    /// Sends a notification; returns as soon as it is queued.
    pub async fn send_notification(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let connection = self.connection.as_ref().ok_or(ClientError::NotRunning)?;
        let notification = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(params),
        };
        connection.enqueue(serde_json::to_value(notification)?, false)
    }

    /// Announces a document as open, reading its contents from disk.
    ///
    /// Returns the canonical path. Re-opening an already open document
    /// sends nothing.
    pub async fn open_document(&self, path: impl AsRef<Path>) -> Result<PathBuf, ClientError> {
        let file = tokio::fs::canonicalize(path.as_ref()).await?;

        let mut documents = self.documents.lock().await;
        if documents.is_open(&file) {
            return Ok(file);
        }

        let text = tokio::fs::read_to_string(&file).await?;
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: path_to_uri(&file),
                language_id: self.config.language_id.clone(),
                version: 1,
                text,
            },
        };
        self.send_notification("textDocument/didOpen", serde_json::to_value(params)?)
            .await?;
        documents.mark_opened(&file);
        Ok(file)
    }

    /// Announces a document as closed. Fails if it was never opened.
    pub async fn close_document(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let file = tokio::fs::canonicalize(path.as_ref()).await?;

        let mut documents = self.documents.lock().await;
        if !documents.is_open(&file) {
            return Err(ClientError::NotOpened { path: file });
        }

        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier {
                uri: path_to_uri(&file),
            },
        };
        self.send_notification("textDocument/didClose", serde_json::to_value(params)?)
            .await?;
        documents.mark_closed(&file);
        Ok(())
    }

    /// Allocates the next request id.
    fn next_request_id(&self) -> Result<i64, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        if id < 0 {
            return Err(ClientError::IdExhausted);
        }
        Ok(id)
    }

    /// Builds `initialize` params: the configured static document, or
    /// default capabilities for the workspace.
    async fn load_init_params(&self, workspace: &Path) -> Result<Value, ClientError> {
        if let Some(path) = &self.config.init_params_path {
            let raw = tokio::fs::read_to_string(path).await?;
            return serde_json::from_str(&raw).map_err(|e| ClientError::InitParams {
                path: path.clone(),
                message: e.to_string(),
            });
        }

        #[allow(deprecated)]
        let params = lsp_types::InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(path_to_uri(workspace)),
            capabilities: lsp_types::ClientCapabilities {
                text_document: Some(lsp_types::TextDocumentClientCapabilities {
                    definition: Some(lsp_types::GotoCapability {
                        dynamic_registration: Some(false),
                        link_support: Some(false),
                    }),
                    references: Some(lsp_types::DynamicRegistrationClientCapabilities {
                        dynamic_registration: Some(false),
                    }),
                    ..Default::default()
                }),
                // work-done progress support is what makes clangd report
                // background indexing at all
                window: Some(lsp_types::WindowClientCapabilities {
                    work_done_progress: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        Ok(serde_json::to_value(params)?)
    }

    /// Drives the indexing handshake to completion.
    async fn wait_for_background_index(&self) -> Result<(), ClientError> {
        let connection = self.connection.as_ref().ok_or(ClientError::NotRunning)?;
        let mut progress = IndexProgress::new();

        loop {
            let message = connection.receive().await?;
            match progress.advance(message)? {
                IndexStep::Acknowledge { id } => {
                    // clangd stalls until its create request is answered
                    connection.enqueue(
                        json!({ "jsonrpc": "2.0", "id": id, "result": null }),
                        false,
                    )?;
                    log::info!("analyzer began background indexing");
                }
                IndexStep::Reported { percentage } => {
                    log::info!("indexing progress: {}%", percentage);
                }
                IndexStep::Finished => {
                    log::info!("indexing progress: 100%");
                    return Ok(());
                }
            }
        }
    }
}

impl Drop for ClangdClient {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.send_task.abort();
            connection.receive_task.abort();
            if let Some(child) = connection.child.as_mut() {
                let _ = child.start_kill();
            }
        }
    }
}
