//! NeuroRAG API server binary.
//!
//! Usage:
//!   neurorag-api --config neurorag.toml
//!   neurorag-api --port 8000 --bind 0.0.0.0
//!   neurorag-api --data-dir /var/lib/neurorag
//!
//! # Environment Variables
//!
//! - `NEURORAG_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `GEMINI_API_KEY` / `OPENAI_API_KEY` - LLM provider key
//! - `RUST_LOG` - Log filter

use clap::Parser;
use neurorag_api::{serve, AppConfig, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "neurorag-api", version, about = "NeuroRAG retrieval-augmented QA server")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides NEURORAG_BIND_ADDR)
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory for the chunk store, vectors and dump archive
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,neurorag_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = if let Some(path) = &args.config {
        tracing::info!(path = %path.display(), "Loading configuration");
        AppConfig::from_file(path)?
    } else {
        tracing::info!("Using default configuration");
        AppConfig::default()
    };

    // CLI flag > env var > config file
    config.apply_env();
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.server.temp_dir = data_dir.join("temp");
        config.memory.data_dir = data_dir;
    }

    if config.server.bind == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0. This exposes the API to all network interfaces. \
             The API has no authentication; ensure a firewall is in place."
        );
    }

    let addr = config.socket_addr()?;
    let state = AppState::from_config(config).await?;
    serve(Arc::new(state), addr).await?;

    Ok(())
}
