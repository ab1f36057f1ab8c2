//! agentfox-relay - the native-messaging host process
//!
//! The browser spawns this binary when the extension opens its native
//! port. It bridges the browser's native-messaging framing on stdio to
//! the broker's stream socket. Standard output is reserved for the
//! transport; everything diagnostic goes to standard error.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use agentfox::config::{default_socket_path, SOCKET_ENV};
use agentfox::relay::run_relay;

#[tokio::main]
async fn main() -> Result<()> {
    // The browser passes the manifest path and extension origin as
    // arguments; neither affects the bridge, so they are ignored.
    let filter =
        EnvFilter::try_from_env("AGENTFOX_LOG").unwrap_or_else(|_| EnvFilter::new("agentfox=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let socket_path = match std::env::var(SOCKET_ENV) {
        Ok(path) if !path.is_empty() => path.into(),
        _ => default_socket_path(),
    };
    tracing::info!("relay starting against {}", socket_path.display());

    run_relay(tokio::io::stdin(), tokio::io::stdout(), &socket_path).await
}
