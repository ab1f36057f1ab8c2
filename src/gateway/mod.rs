//! MCP tool gateway
//!
//! The gateway speaks the Model Context Protocol over stdio: it publishes a
//! static catalog of browser tools, turns each `tools/call` into a typed
//! command for the IPC broker, and formats the browser's reply as MCP
//! content items.

pub mod catalog;
pub mod rpc;
pub mod server;

pub use catalog::{ToolCatalog, ToolSpec};
pub use server::McpGateway;
