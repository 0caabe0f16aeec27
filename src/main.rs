use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use livegate::{Gateway, GatewayConfig, GatewayServer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "livegate")]
#[command(about = "Personal live-media gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "LIVEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address, overrides `[server] bind`
    #[arg(long, env = "LIVEGATE_BIND")]
    bind: Option<SocketAddr>,

    /// Maximum concurrent encoder sessions, overrides `[encoder] max_sessions`
    #[arg(long, env = "LIVEGATE_MAX_SESSIONS")]
    max_sessions: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => GatewayConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            tracing::warn!("No config file given, serving without sources");
            GatewayConfig::default()
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(max_sessions) = args.max_sessions {
        config.encoder.max_sessions = max_sessions;
    }
    let config = config.validate()?;

    let gateway = Gateway::from_config(&config).await?;
    let server = GatewayServer::new(config.server_config(), gateway);

    server.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
