//! Error types for AgentFox
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.
//!
//! The variants follow the failure taxonomy of the request pipeline: framing
//! errors kill a connection, lifecycle errors are surfaced to the MCP client
//! as readable messages, and command/reference/target errors travel back to
//! the agent inside a `CommandResponse` as error strings.

use thiserror::Error;

/// Main error type for AgentFox operations
///
/// This enum encompasses all possible errors that can occur while bridging
/// tool calls to the browser: frame codec violations, broker and relay
/// lifecycle failures, command dispatch errors, and the recoverable errors
/// produced by the browser-side handlers.
#[derive(Error, Debug)]
pub enum AgentfoxError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A frame declared a length beyond the dialect's cap
    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Declared payload length
        size: usize,
        /// Cap of the dialect that rejected the frame
        limit: usize,
    },

    /// Malformed frame or undecodable payload
    #[error("Framing error: {0}")]
    Framing(String),

    /// Broker socket setup failure (fatal to start)
    #[error("IPC socket error: {0}")]
    Socket(String),

    /// No extension relay has ever attached to the broker
    #[error("Browser extension not connected. Open the browser and make sure the AgentFox extension is installed and enabled.")]
    ExtensionNotConnected,

    /// The extension relay was attached earlier but the link is gone
    #[error("Browser extension disconnected. Reload the AgentFox extension or restart the browser to reconnect.")]
    ExtensionDisconnected,

    /// The relay could not reach the broker endpoint
    #[error("Cannot reach the AgentFox socket at {0}. Is the MCP server running?")]
    BrokerUnreachable(String),

    /// A command outlived its response deadline
    #[error("Command {id} timed out after {seconds}s")]
    CommandTimeout {
        /// Correlation ID of the expired command
        id: String,
        /// Deadline that elapsed, in seconds
        seconds: u64,
    },

    /// The dispatcher received an action tag outside the catalog
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The dispatcher could not parse the command parameters
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// A reference that no snapshot ever produced
    #[error("Unknown element reference {0}. Take a new snapshot to get current references.")]
    UnknownRef(String),

    /// A reference whose element left the document
    #[error("Element reference {0} is stale; the page has changed since the snapshot. Take a new snapshot to get current references.")]
    StaleRef(String),

    /// The active tab has no content script (internal or blank page)
    #[error("Content script unavailable in the active tab; this page cannot be inspected")]
    ContentUnavailable,

    /// The tab was removed while a navigation was awaited
    #[error("Tab closed during navigation")]
    TabClosed,

    /// Navigation did not reach the complete state in time
    #[error("Navigation to {url} timed out after {seconds}s")]
    NavigationTimeout {
        /// Navigation target
        url: String,
        /// Deadline that elapsed, in seconds
        seconds: u64,
    },

    /// A fill-form field did not match its declared type
    #[error("Element type mismatch: expected {expected}, found {actual}")]
    TargetMismatch {
        /// Type the caller declared
        expected: String,
        /// Type the element actually has
        actual: String,
    },

    /// A select-option value matched neither option text nor option value
    #[error("No option matching {0:?} in select element")]
    MissingOption(String),

    /// A page-content selector that does not parse as CSS
    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),

    /// A valid selector that matches nothing in the document
    #[error("No element matches selector {0:?}")]
    SelectorNoMatch(String),

    /// save-pdf is not available on this platform or browser build
    #[error("PDF saving is not supported on this platform")]
    PdfUnsupported,

    /// Script evaluation failure (non-function, thrown exception, timeout)
    #[error("Evaluate error: {0}")]
    Evaluate(String),

    /// Native-messaging host installation errors
    #[error("Install error: {0}")]
    Install(String),

    /// MCP protocol violation on the gateway transport
    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for AgentFox operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
