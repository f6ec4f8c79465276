// ABOUTME: Stdio transport for MCP communication.
// ABOUTME: Spawns a subprocess and communicates via JSON-RPC over stdin/stdout.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Transport, TransportEvent};
use crate::error::McpError;
use crate::mcp::{
    Inbound, McpMessage, McpNotification, McpRequest, McpResponse, McpRpcError, RequestId,
};

type PendingMap = Arc<Mutex<HashMap<RequestId, mpsc::Sender<McpResponse>>>>;
type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// Stdio transport - spawns a subprocess and communicates via JSON-RPC over stdin/stdout.
///
/// Lines the child writes to stderr are forwarded into the log with an
/// `[mcp-remote]` prefix. Requests the child sends us are answered in the
/// reader task: `ping` gets an empty result, anything else "method not found".
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: SharedStdin,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    stderr_handle: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Create a new stdio transport by spawning a subprocess.
    pub async fn connect(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&Path>,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Connection(format!("Failed to spawn {}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Connection("Failed to open stdin".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Connection("Failed to open stdout".into()))?;

        let stderr_handle = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                loop {
                    match next_lossy_line(&mut reader, &mut buf).await {
                        Ok(Some(line)) => info!("[mcp-remote] {}", line),
                        Ok(None) => break,
                        Err(e) => {
                            debug!(error = %e, "Stopped reading upstream stderr");
                            break;
                        }
                    }
                }
            })
        });

        let stdin: SharedStdin = Arc::new(Mutex::new(Some(stdin)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Spawn reader task
        let pending_clone = pending.clone();
        let stdin_clone = stdin.clone();
        let closed_clone = closed.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                let line = match next_lossy_line(&mut reader, &mut buf).await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "Failed to read from upstream");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let message = match serde_json::from_str::<McpMessage>(&line) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(error = %e, "Ignoring unparsable line from upstream");
                        continue;
                    }
                };
                match message.classify() {
                    Some(Inbound::Response(response)) => {
                        let Some(id) = response.id.clone() else {
                            continue;
                        };
                        let waiter = pending_clone.lock().await.remove(&id);
                        if let Some(tx) = waiter {
                            let _ = tx.send(response).await;
                        }
                    }
                    Some(Inbound::Notification(notification)) => {
                        let _ = events_tx.send(TransportEvent::Notification(notification));
                    }
                    Some(Inbound::Request(request)) => {
                        let reply = answer_peer_request(request);
                        if let Err(e) = write_line(&stdin_clone, &reply).await {
                            debug!(error = %e, "Failed to answer upstream request");
                        }
                    }
                    None => debug!("Ignoring unrecognised message from upstream"),
                }
            }
            closed_clone.store(true, Ordering::SeqCst);
            pending_clone.lock().await.clear();
            let _ = events_tx.send(TransportEvent::Closed);
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin,
            pending,
            closed,
            events: Mutex::new(Some(events_rx)),
            reader_handle: Mutex::new(Some(reader_handle)),
            stderr_handle: Mutex::new(stderr_handle),
            request_timeout,
        })
    }
}

/// Build the reply to a request the child sent us.
fn answer_peer_request(request: McpRequest) -> McpResponse {
    match request.method.as_str() {
        "ping" => McpResponse::success(request.id, serde_json::json!({})),
        other => McpResponse::failure(Some(request.id), McpRpcError::method_not_found(other)),
    }
}

/// Write one newline-delimited JSON message to the child's stdin.
async fn write_line<T: Serialize>(stdin: &SharedStdin, message: &T) -> Result<(), McpError> {
    let json = serde_json::to_string(message)?;
    let mut stdin = stdin.lock().await;
    let stdin_ref = stdin.as_mut().ok_or(McpError::Closed)?;
    let mut line = json.into_bytes();
    line.push(b'\n');
    let written = async {
        stdin_ref.write_all(&line).await?;
        stdin_ref.flush().await
    };
    written.await.map_err(|e| match e.kind() {
        std::io::ErrorKind::BrokenPipe => McpError::Closed,
        _ => McpError::Io(e),
    })
}

/// Read one newline-delimited line, replacing invalid UTF-8 rather than
/// failing on it. `None` at EOF.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, request: McpRequest) -> Result<McpResponse, McpError> {
        let id = request.id.clone();

        let (tx, mut rx) = mpsc::channel(1);
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(McpError::Closed);
            }
            pending.insert(id.clone(), tx);
        }

        if let Err(e) = write_line(&self.stdin, &request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        // Wait for response with timeout
        match tokio::time::timeout(self.request_timeout, rx.recv()).await {
            Ok(Some(response)) => Ok(response),
            // The reader dropped every waiter when the child's stdout closed
            Ok(None) => Err(McpError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Protocol("Request timed out".into()))
            }
        }
    }

    async fn notify(&self, notification: McpNotification) -> Result<(), McpError> {
        write_line(&self.stdin, &notification).await
    }

    async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.lock().await.take()
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        self.stdin.lock().await.take();

        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_handle.lock().await.take() {
            handle.abort();
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(Duration::from_millis(500), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    let _ = child.kill().await;
                }
            }
        }

        Ok(())
    }
}
