//! IPC envelopes exchanged on the broker socket
//!
//! Every frame on the stream socket is one [`IpcEnvelope`], discriminated by
//! the `"type"` field: commands flow toward the browser, responses flow
//! back, and ping/pong keep the link alive. Only the broker generates
//! pings; either side answers with a pong.

use serde::{Deserialize, Serialize};

use super::command::{Command, CommandResponse};

/// One frame on the broker socket.
///
/// # Examples
///
/// ```
/// use agentfox::protocol::IpcEnvelope;
///
/// let ping = serde_json::to_value(&IpcEnvelope::Ping).unwrap();
/// assert_eq!(ping, serde_json::json!({"type": "ping"}));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpcEnvelope {
    /// A command heading toward the browser.
    Command(Command),
    /// A response heading back to the broker.
    Response(CommandResponse),
    /// Liveness probe from the broker.
    Ping,
    /// Liveness answer.
    Pong,
}
