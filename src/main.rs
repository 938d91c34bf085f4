use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filecritic::gateway::ServiceStatus;
use filecritic::providers::Dependencies;
use filecritic::{build_router, instructions, logging, AppState, Config};
use serde_json::json;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "filecritic", version, about = "File upload review service")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration and dependency status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Status => status(&config),
    }
}

async fn serve(config: Config) -> Result<()> {
    let deps = Dependencies::from_config(&config)?;
    let store = instructions::open_store(&config).context("Failed to open instruction store")?;
    let state = AppState::new(&config, deps, store);
    info!(
        storage = state.status.storage.configured,
        inference = state.status.inference.configured,
        store = state.status.instructions.backend,
        "Dependencies resolved"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let deps = Dependencies::from_config(config)?;
    let store = instructions::open_store(config)?;
    let status = ServiceStatus::describe(&deps, &store, &config.temp_dir());
    let report = json!({
        "config": config.redacted(),
        "status": status,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
