//! myapp server
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:8000, JSON logs
//! myapp
//!
//! # Local development
//! myapp --listen 127.0.0.1:3000 --log-format pretty
//! ```
//!
//! All other settings come from the environment (see `AppConfig::from_env`).

use anyhow::Context;
use clap::Parser;
use myapp::observability::{self, LogFormat, ObservabilityConfig};
use myapp::{build_app, error, AppConfig, AppState, ErrorConfig};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Instrumented HTTP service
#[derive(Parser)]
#[command(name = "myapp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on (overrides LISTEN_ADDR)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format: json, pretty or compact (overrides LOG_FORMAT)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut obs_config = ObservabilityConfig::from_env();
    if let Some(format) = cli.log_format {
        obs_config.log_format = format;
    }
    observability::init(&obs_config).context("failed to initialize logging")?;
    error::init(ErrorConfig::from_env());

    let mut config = AppConfig::from_env();
    if let Some(addr) = cli.listen {
        config.listen_addr = addr;
    }

    let state = AppState::new(config.clone()).context("failed to register metrics")?;
    state.on_startup().context("failed to set startup metrics")?;

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, metrics_path = %config.metrics_path, "Listening");

    let app = build_app(state.clone());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    state.on_shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
