//! vizier - streaming tool-use orchestration server

mod config;
mod documents;
mod exchange;
mod prompts;
mod provider;
mod routes;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use documents::MemoryDocumentStore;
use exchange::AppState;
use provider::{AnthropicFactory, HttpToolProvider};

/// vizier - conversational data-analysis agent server
#[derive(Parser, Debug)]
#[command(name = "vizier")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (default: platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address override (e.g. 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "vizier=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = Config::load(args.config.as_ref());
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let api_key =
        std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY must be set")?;

    let state = AppState {
        tools: Arc::new(HttpToolProvider::new(
            config.tool_provider.base_url.clone(),
            Duration::from_secs(config.tool_provider.timeout_secs),
        )),
        store: Arc::new(MemoryDocumentStore::new(config.document_retention())),
        models: Arc::new(AnthropicFactory::new(api_key, config.clone())),
        config: Arc::new(config),
    };

    let listen = state.config.listen.clone();
    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    tracing::info!("vizier listening on http://{}", listen);
    axum::serve(listener, app).await?;

    Ok(())
}
