// ABOUTME: Local MCP server - answers one client over newline-delimited JSON-RPC.
// ABOUTME: Renders the tool registry as tools/list and routes tools/call to handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{
    Inbound, LATEST_PROTOCOL_VERSION, McpClientInfo, McpInitializeParams, McpInitializeResult,
    McpMessage, McpNotification, McpRequest, McpResponse, McpRpcError, McpServerCapabilities,
    McpToolCallParams, SUPPORTED_PROTOCOL_VERSIONS, TOOLS_LIST_CHANGED,
};
use crate::error::McpError;
use crate::tool::{Dispatch, RegistryView, ToolResult};

/// Name of the single string argument every mirrored tool accepts.
pub const ARGS_JSON: &str = "args_json";

/// The input schema advertised for every mirrored tool.
pub fn args_json_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            ARGS_JSON: {
                "type": "string",
                "description": "JSON payload forwarded to the upstream tool. Leave blank to send `{}`."
            }
        },
        "additionalProperties": false,
        "$schema": "http://json-schema.org/draft-07/schema#"
    })
}

/// MCP server exposing a [`RegistryView`] to a single local client.
pub struct McpServer {
    dispatcher: Dispatcher,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

/// Cloneable handle for pushing notifications to the connected client.
#[derive(Clone)]
pub struct ServerHandle {
    outbound: mpsc::UnboundedSender<String>,
    initialized: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Tell the client to re-fetch `tools/list`.
    ///
    /// Returns `false` when nothing was sent: the client has not finished
    /// `initialize` yet, or the server has stopped.
    pub fn notify_tools_changed(&self) -> bool {
        if !self.initialized.load(Ordering::SeqCst) {
            return false;
        }
        let notification = McpNotification::new(TOOLS_LIST_CHANGED, None);
        match serde_json::to_string(&notification) {
            Ok(line) => self.outbound.send(line).is_ok(),
            Err(_) => false,
        }
    }
}

#[derive(Clone)]
struct Dispatcher {
    info: Arc<McpClientInfo>,
    tools: RegistryView,
    initialized: Arc<AtomicBool>,
}

impl McpServer {
    /// Create a server presenting `info` as its identity.
    pub fn new(info: McpClientInfo, tools: RegistryView) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            dispatcher: Dispatcher {
                info: Arc::new(info),
                tools,
                initialized: Arc::new(AtomicBool::new(false)),
            },
            outbound_tx,
            outbound_rx,
        }
    }

    /// A handle for sending notifications while the server runs.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            outbound: self.outbound_tx.clone(),
            initialized: Arc::clone(&self.dispatcher.initialized),
        }
    }

    /// Serve until the client closes its end of `reader`.
    ///
    /// Every `tools/call` runs in its own task so slow upstream calls never
    /// hold up other requests. Calls still in flight at EOF are abandoned.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let McpServer {
            dispatcher,
            outbound_tx,
            outbound_rx,
        } = self;

        let mut writer_task = tokio::spawn(write_loop(writer, outbound_rx));
        let mut lines = BufReader::new(reader).lines();

        let result = loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if !line.trim().is_empty() {
                            dispatcher.handle_line(&line, &outbound_tx).await;
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(McpError::Io(e)),
                },
                written = &mut writer_task => {
                    break match written {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(McpError::Io(e)),
                        Err(e) => Err(McpError::Connection(format!("Writer task failed: {}", e))),
                    };
                }
            }
        };

        writer_task.abort();
        result
    }
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

fn send<T: Serialize>(outbound: &mpsc::UnboundedSender<String>, message: &T) {
    match serde_json::to_string(message) {
        Ok(line) => {
            let _ = outbound.send(line);
        }
        Err(e) => debug!(error = %e, "Failed to serialize outbound message"),
    }
}

impl Dispatcher {
    async fn handle_line(&self, line: &str, outbound: &mpsc::UnboundedSender<String>) {
        let message = match serde_json::from_str::<McpMessage>(line) {
            Ok(message) => message,
            Err(e) => {
                send(
                    outbound,
                    &McpResponse::failure(None, McpRpcError::parse_error(e.to_string())),
                );
                return;
            }
        };

        match message.classify() {
            Some(Inbound::Request(request)) if request.method == "tools/call" => {
                let dispatcher = self.clone();
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    let response = dispatcher.respond(request).await;
                    send(&outbound, &response);
                });
            }
            Some(Inbound::Request(request)) => {
                let response = self.respond(request).await;
                send(outbound, &response);
            }
            Some(Inbound::Notification(notification)) => {
                debug!(method = %notification.method, "Notification from client");
            }
            Some(Inbound::Response(_)) => debug!("Ignoring response from client"),
            None => send(
                outbound,
                &McpResponse::failure(None, McpRpcError::parse_error("Not a JSON-RPC message")),
            ),
        }
    }

    async fn respond(&self, request: McpRequest) -> McpResponse {
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" | "logging/setLevel" => Ok(serde_json::json!({})),
            "tools/list" => Ok(self.list_tools().await),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(McpRpcError::method_not_found(other)),
        };

        match outcome {
            Ok(result) => McpResponse::success(request.id, result),
            Err(error) => McpResponse::failure(Some(request.id), error),
        }
    }

    fn initialize(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, McpRpcError> {
        let params: McpInitializeParams =
            serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
                .map_err(|e| McpRpcError::invalid_params(e.to_string()))?;

        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            params.protocol_version
        } else {
            LATEST_PROTOCOL_VERSION.to_string()
        };

        let result = McpInitializeResult {
            protocol_version,
            capabilities: McpServerCapabilities {
                tools: Some(serde_json::json!({ "listChanged": true })),
                logging: Some(serde_json::json!({})),
            },
            server_info: Some((*self.info).clone()),
        };

        self.initialized.store(true, Ordering::SeqCst);
        info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            "Client connected to proxy"
        );

        serde_json::to_value(result).map_err(|e| McpRpcError::invalid_params(e.to_string()))
    }

    async fn list_tools(&self) -> serde_json::Value {
        let tools: Vec<serde_json::Value> = self
            .tools
            .enabled()
            .await
            .into_iter()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name,
                    "title": tool.title,
                    "description": tool.description,
                    "inputSchema": args_json_schema(),
                })
            })
            .collect();

        serde_json::json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, McpRpcError> {
        let params: McpToolCallParams =
            serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
                .map_err(|e| McpRpcError::invalid_params(e.to_string()))?;

        let raw_args = match params.arguments.as_ref().and_then(|a| a.get(ARGS_JSON)) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(_) => {
                return Err(McpRpcError::invalid_params(format!(
                    "{} must be a string",
                    ARGS_JSON
                )));
            }
        };

        match self.tools.dispatch(&params.name).await {
            Dispatch::Unknown => Err(McpRpcError::invalid_params(format!(
                "Tool {} not found",
                params.name
            ))),
            Dispatch::Disabled => Err(McpRpcError::invalid_params(format!(
                "Tool {} is disabled: it is no longer available upstream",
                params.name
            ))),
            Dispatch::Enabled(handler) => match handler.invoke(raw_args.as_deref()).await {
                Ok(result) => Ok(result),
                Err(e) => Ok(ToolResult::error(e.to_string()).into_value()),
            },
        }
    }
}
