//! Command-line interface definition for AgentFox
//!
//! This module defines the CLI structure using clap's derive API: the MCP
//! server itself plus the native-messaging host management commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AgentFox - drive a live browser session from an MCP client
///
/// Runs an MCP server over stdio that forwards tool calls to a browser
/// extension through a local socket and a native-messaging relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "agentfox")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stream-socket endpoint path (overrides config and AGENTFOX_SOCKET)
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Enable verbose logging (stderr only)
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute; defaults to serve
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the MCP server (default)
    Serve,

    /// Install the native-messaging host manifest for the browser
    Setup {
        /// Path to the relay binary; defaults to agentfox-relay next to
        /// this executable
        #[arg(long)]
        relay_path: Option<PathBuf>,

        /// Extension ID allowed to open the native port
        #[arg(long, default_value = "agentfox@agentfox.dev")]
        extension_id: String,
    },

    /// Report manifest, relay binary, and socket health
    Status,

    /// Remove the native-messaging host manifest
    Uninstall,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
