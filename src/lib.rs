//! AgentFox - bridge an MCP client to a live browser session
//!
//! AgentFox lets an AI agent drive a real, interactive browser: navigate,
//! read pages as accessibility trees, click, type, fill forms, evaluate
//! scripts, capture screenshots. One end speaks the Model Context
//! Protocol over stdio; the other end speaks browser automation commands
//! through a native-messaging relay.
//!
//! # Architecture
//!
//! A tool call crosses four processes and two framings:
//!
//! - `gateway`: the MCP server; publishes the tool catalog and turns each
//!   call into a typed command with a fresh correlation ID
//! - `ipc`: the broker; a single-client stream-socket server multiplexing
//!   concurrent commands by correlation ID with heartbeat liveness
//! - `relay`: the process the browser spawns; converts between the IPC
//!   framing and the browser's native-messaging framing
//! - `browser`: the extension side; a background dispatcher routing
//!   commands to browser APIs or to per-tab content contexts, which build
//!   accessibility trees, keep the element reference map, and execute DOM
//!   actions
//! - `codec` and `protocol` carry the shared wire types; `install`
//!   manages the native-messaging host manifest
//!
//! Element references (`e0`, `e1`, ...) produced by a snapshot stay valid
//! until the next snapshot or navigation; stale uses produce a distinct
//! recoverable error telling the agent to re-snapshot.

pub mod browser;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod install;
pub mod ipc;
pub mod protocol;
pub mod relay;

// Re-export commonly used types
pub use browser::{BrowserApi, Dispatcher, ExtensionPort};
pub use codec::{FrameCodec, FrameDialect};
pub use config::Config;
pub use error::{AgentfoxError, Result};
pub use gateway::McpGateway;
pub use ipc::{BrokerConfig, BrokerEvent, IpcBroker};
pub use protocol::{Action, Command, CommandResponse, IpcEnvelope};

#[cfg(test)]
pub mod test_utils;
