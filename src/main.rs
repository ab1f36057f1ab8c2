//! AgentFox - MCP browser bridge
//!
//! Main entry point: runs the MCP gateway (with its embedded IPC broker)
//! or one of the native-messaging host management commands.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use agentfox::cli::{Cli, Commands};
use agentfox::config::Config;
use agentfox::gateway::McpGateway;
use agentfox::install;
use agentfox::ipc::IpcBroker;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref(), cli.socket.as_deref())?;
    config.validate()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Setup {
            relay_path,
            extension_id,
        } => install::setup(relay_path, extension_id),
        Commands::Status => install::status(&config.socket_path()),
        Commands::Uninstall => install::uninstall(),
    }
}

/// Run the MCP server until stdin closes or a termination signal arrives.
async fn serve(config: Config) -> Result<()> {
    let broker = Arc::new(IpcBroker::start(config.broker_config())?);
    let gateway = McpGateway::new(Arc::clone(&broker)).with_attach_wait(config.attach_wait());
    tracing::info!("agentfox MCP server starting");

    tokio::select! {
        result = gateway.run(tokio::io::stdin(), tokio::io::stdout()) => {
            tracing::info!("MCP transport closed");
            broker.close().await;
            result
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down on signal");
            // Closing the broker rejects all pending commands before the
            // transport goes away.
            broker.close().await;
            Ok(())
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Diagnostics go to stderr only; stdout belongs to the MCP transport.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "agentfox=debug" } else { "agentfox=info" };
    let filter = EnvFilter::try_from_env("AGENTFOX_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
