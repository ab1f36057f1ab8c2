//! Local IPC between the MCP gateway and the browser relay
//!
//! The broker owns a stream-socket endpoint, accepts exactly one relay at a
//! time, and multiplexes concurrent command/response pairs over it by
//! correlation ID.

pub mod broker;

pub use broker::{BrokerConfig, BrokerEvent, IpcBroker};
