//! The MCP server loop
//!
//! [`McpGateway`] reads newline-delimited JSON-RPC from stdin, answers the
//! MCP lifecycle methods, and executes `tools/call` by turning the call
//! into a command for the IPC broker. Tool calls run concurrently: each one
//! is handled on its own task and responses are serialized through a single
//! writer, so several commands can be in flight over the socket at once.
//!
//! Transport-level failures never leak to the agent: every tool-call
//! outcome is an MCP result, with `isError` content for anything that went
//! wrong.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::gateway::catalog::ToolCatalog;
use crate::gateway::rpc::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerCapabilities, INVALID_PARAMS, LATEST_PROTOCOL_VERSION,
    METHOD_INITIALIZE, METHOD_NOT_FOUND, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PARSE_ERROR,
};
use crate::ipc::IpcBroker;
use crate::protocol::Command;

/// How long a tool call waits for an extension to attach before giving up.
pub const DEFAULT_ATTACH_WAIT: Duration = Duration::from_secs(5);

/// The MCP tool gateway.
///
/// # Examples
///
/// ```no_run
/// use agentfox::gateway::McpGateway;
/// use agentfox::ipc::{BrokerConfig, IpcBroker};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let broker = Arc::new(IpcBroker::start(BrokerConfig::new("/tmp/agentfox.sock"))?);
/// let gateway = McpGateway::new(Arc::clone(&broker));
/// gateway.run(tokio::io::stdin(), tokio::io::stdout()).await?;
/// # Ok(())
/// # }
/// ```
pub struct McpGateway {
    broker: Arc<IpcBroker>,
    catalog: Arc<ToolCatalog>,
    attach_wait: Duration,
}

impl McpGateway {
    /// Gateway over the given broker with the default attach wait.
    pub fn new(broker: Arc<IpcBroker>) -> Self {
        Self {
            broker,
            catalog: Arc::new(ToolCatalog::new()),
            attach_wait: DEFAULT_ATTACH_WAIT,
        }
    }

    /// Override the attach wait (tests use a short one).
    pub fn with_attach_wait(mut self, attach_wait: Duration) -> Self {
        self.attach_wait = attach_wait;
        self
    }

    /// Serve MCP until the reader reaches EOF.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport itself fails; a malformed
    /// request only produces a JSON-RPC error response.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // All responses funnel through one writer task so concurrent tool
        // calls cannot interleave their output lines.
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = out_rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if writer.write_all(b"\n").await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("unparseable request line: {}", e);
                    send(&out_tx, &JsonRpcResponse::error(None, PARSE_ERROR, "Parse error"));
                    continue;
                }
            };

            let is_notification = request.id.is_none();
            match request.method.as_str() {
                METHOD_TOOLS_CALL => {
                    let id = request.id.clone();
                    let params = request.params.clone().unwrap_or(Value::Null);
                    match serde_json::from_value::<CallToolParams>(params) {
                        Ok(call) => {
                            let broker = Arc::clone(&self.broker);
                            let catalog = Arc::clone(&self.catalog);
                            let attach_wait = self.attach_wait;
                            let out_tx = out_tx.clone();
                            tokio::spawn(async move {
                                let result =
                                    call_tool(&broker, &catalog, attach_wait, call).await;
                                let response = JsonRpcResponse::result(
                                    id,
                                    serde_json::to_value(result).unwrap_or(Value::Null),
                                );
                                send(&out_tx, &response);
                            });
                        }
                        Err(e) => {
                            send(
                                &out_tx,
                                &JsonRpcResponse::error(
                                    request.id,
                                    INVALID_PARAMS,
                                    format!("Invalid tools/call parameters: {}", e),
                                ),
                            );
                        }
                    }
                }
                method => {
                    if let Some(response) = self.handle_sync(method, request.id) {
                        send(&out_tx, &response);
                    } else if !is_notification {
                        // Reached only for requests we never answer; keep
                        // the transport healthy anyway.
                        tracing::debug!("request {} produced no response", method);
                    }
                }
            }
        }

        drop(out_tx);
        let _ = writer_task.await;
        Ok(())
    }

    /// Handle the synchronous (non-tool-call) methods.
    fn handle_sync(&self, method: &str, id: Option<Value>) -> Option<JsonRpcResponse> {
        match method {
            METHOD_INITIALIZE => {
                let result = InitializeResult {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(json!({})),
                    },
                    server_info: Implementation {
                        name: "agentfox".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                    instructions: Some(
                        "Drive the user's live browser session. Start with browser_navigate \
                         or browser_snapshot; interaction tools take element references (e0, \
                         e1, ...) from the most recent snapshot."
                            .to_string(),
                    ),
                };
                Some(JsonRpcResponse::result(
                    id,
                    serde_json::to_value(result).unwrap_or(Value::Null),
                ))
            }
            METHOD_PING => Some(JsonRpcResponse::result(id, json!({}))),
            METHOD_TOOLS_LIST => {
                let result = ListToolsResult {
                    tools: self.catalog.list(),
                };
                Some(JsonRpcResponse::result(
                    id,
                    serde_json::to_value(result).unwrap_or(Value::Null),
                ))
            }
            method if method.starts_with("notifications/") => None,
            method => {
                id.map(|id| {
                    JsonRpcResponse::error(
                        Some(id),
                        METHOD_NOT_FOUND,
                        format!("Method not found: {}", method),
                    )
                })
            }
        }
    }
}

fn send(out_tx: &mpsc::UnboundedSender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            let _ = out_tx.send(line);
        }
        Err(e) => tracing::error!("cannot serialize response: {}", e),
    }
}

/// Execute one tool call end to end. Always yields a visible result.
async fn call_tool(
    broker: &IpcBroker,
    catalog: &ToolCatalog,
    attach_wait: Duration,
    call: CallToolParams,
) -> CallToolResult {
    let Some(tool) = catalog.get(&call.name) else {
        return CallToolResult::visible_error(format!("Unknown tool: {}", call.name));
    };

    // Do not silently queue behind a missing extension: wait briefly for an
    // attachment, then fail with a message that distinguishes "never
    // connected" from "was connected then lost".
    if !broker.connected().await {
        if let Err(e) = broker.wait_for_connection(attach_wait).await {
            return CallToolResult::visible_error(e.to_string());
        }
    }

    let arguments = call
        .arguments
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let command = Command::new(Uuid::new_v4().to_string(), tool.action, arguments);
    tracing::debug!("tool {} -> command {}", call.name, command.id);

    match broker.send_command(command).await {
        Ok(response) if response.success => {
            let result = response.result.unwrap_or(Value::Null);
            CallToolResult::ok((tool.format)(&result))
        }
        Ok(response) => CallToolResult::visible_error(
            response
                .error
                .unwrap_or_else(|| "Unknown command error".to_string()),
        ),
        Err(e) => CallToolResult::visible_error(e.to_string()),
    }
}
