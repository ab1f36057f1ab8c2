//! Configuration management for AgentFox
//!
//! This module handles loading, parsing, validating, and merging
//! configuration from an optional YAML file, environment variables, and
//! CLI overrides. Precedence, lowest to highest: built-in defaults, file,
//! `AGENTFOX_SOCKET`, command line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentfoxError, Result};
use crate::ipc::BrokerConfig;

/// Environment variable overriding the socket endpoint path.
pub const SOCKET_ENV: &str = "AGENTFOX_SOCKET";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Stream-socket endpoint settings.
    #[serde(default)]
    pub socket: SocketConfig,
    /// Timing knobs for the request pipeline.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Socket endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SocketConfig {
    /// Explicit endpoint path; the runtime-directory default applies when
    /// absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Timing knobs, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per-command response deadline.
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,
    /// Interval between heartbeat pings.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Grace period for the answering pong.
    #[serde(default = "default_heartbeat_grace_secs")]
    pub heartbeat_grace_secs: u64,
    /// How long a tool call waits for an extension to attach.
    #[serde(default = "default_attach_wait_secs")]
    pub attach_wait_secs: u64,
}

fn default_command_secs() -> u64 {
    30
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_heartbeat_grace_secs() -> u64 {
    5
}

fn default_attach_wait_secs() -> u64 {
    5
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: default_command_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            heartbeat_grace_secs: default_heartbeat_grace_secs(),
            attach_wait_secs: default_attach_wait_secs(),
        }
    }
}

impl Config {
    /// Load configuration, merging file, environment, and CLI socket
    /// override.
    ///
    /// A missing file is fine (defaults apply); an unreadable or
    /// unparseable file is an error.
    pub fn load(file: Option<&Path>, socket_override: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    AgentfoxError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_yaml::from_str(&raw).map_err(|e| {
                    AgentfoxError::Config(format!("cannot parse {}: {}", path.display(), e))
                })?
            }
            _ => Config::default(),
        };

        if let Ok(env_path) = std::env::var(SOCKET_ENV) {
            if !env_path.is_empty() {
                config.socket.path = Some(PathBuf::from(env_path));
            }
        }
        if let Some(path) = socket_override {
            config.socket.path = Some(path.to_path_buf());
        }
        Ok(config)
    }

    /// Validate timing settings.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::Config`] for zero timeouts or a grace
    /// period that is not shorter than the heartbeat interval.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        if t.command_secs == 0 || t.heartbeat_secs == 0 || t.heartbeat_grace_secs == 0 {
            return Err(AgentfoxError::Config("timeouts must be non-zero".to_string()).into());
        }
        if t.heartbeat_grace_secs >= t.heartbeat_secs {
            return Err(AgentfoxError::Config(
                "heartbeat grace must be shorter than the heartbeat interval".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// The effective endpoint path.
    pub fn socket_path(&self) -> PathBuf {
        self.socket
            .path
            .clone()
            .unwrap_or_else(default_socket_path)
    }

    /// Broker settings derived from this configuration.
    pub fn broker_config(&self) -> BrokerConfig {
        let mut broker = BrokerConfig::new(self.socket_path());
        broker.command_timeout = std::time::Duration::from_secs(self.timeouts.command_secs);
        broker.heartbeat_interval = std::time::Duration::from_secs(self.timeouts.heartbeat_secs);
        broker.heartbeat_grace =
            std::time::Duration::from_secs(self.timeouts.heartbeat_grace_secs);
        broker
    }

    /// How long tool calls wait for an extension to attach.
    pub fn attach_wait(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeouts.attach_wait_secs)
    }
}

/// The default endpoint: `$XDG_RUNTIME_DIR/agentfox.sock` when the runtime
/// directory is set, else a per-user path under `/tmp`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return PathBuf::from(runtime_dir).join("agentfox.sock");
        }
    }
    PathBuf::from(format!("/tmp/agentfox-{}.sock", user_discriminator()))
}

#[cfg(unix)]
fn user_discriminator() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
fn user_discriminator() -> u32 {
    std::process::id()
}
