//! termrelay-server: terminal command relay.
//!
//! Accepts WebSocket connections from browser consoles and executor
//! clients, relays commands and results between them, and broadcasts
//! terminal and client-list changes to every connected session.

mod config;
mod gateway;
mod registry;
mod relay;
mod server;
mod session;
mod transport;

use clap::Parser;
use config::{CliOverrides, ServerConfig};
use server::RelayServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// termrelay-server: terminal command relay
#[derive(Parser, Debug)]
#[command(name = "termrelay-server", version, about = "Terminal command relay")]
struct Cli {
    /// Listen port (overrides PORT and the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.termrelay/config.toml")]
    config: String,

    /// Seconds a disconnected client stays listed before eviction
    #[arg(long)]
    grace_period: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting termrelay-server");

    let env_port = std::env::var("PORT").ok();
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        env_port.as_deref(),
        CliOverrides {
            port: cli.port,
            bind: cli.bind.clone(),
            grace_period_secs: cli.grace_period,
        },
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let ws_rx = match transport::websocket::start_listener(server_config.bind_addr).await {
        Ok((addr, rx)) => {
            info!(addr = %addr, "server running on ws://{addr}");
            rx
        }
        Err(e) => {
            error!(error = %e, "failed to start listener");
            std::process::exit(1);
        }
    };

    let relay_server = Arc::new(RelayServer::new(server_config));

    let run = relay_server.clone().run(ws_rx);
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result,
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            relay_server.shutdown();
            run.await
        }
    };
    if let Err(e) = result {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("termrelay-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
