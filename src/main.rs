//! News sentiment comparison: binary entrypoint.
//!
//! `run` fetches and analyzes one round of news, `compare` prints a single-text
//! comparison, `serve` exposes the diagnostics API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_sentiment::api::{create_router, AppState};
use news_sentiment::bootstrap::{build_sources, Runtime};
use news_sentiment::config::AnalyzerConfig;
use news_sentiment::metrics::Metrics;
use news_sentiment::persist::JsonlSink;
use news_sentiment::pipeline;

#[derive(Parser)]
#[command(name = "news-sentiment", version, about = "Compare sentiment and company extraction across models")]
struct Cli {
    /// Config file (default: $ANALYZER_CONFIG_PATH, then config/analyzer.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, analyze and persist one round of articles
    Run,
    /// Compare every model on one text and print the report as JSON
    Compare {
        #[arg(long)]
        text: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Serve the diagnostics HTTP API
    Serve {
        #[arg(long, env = "ANALYZER_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_sentiment=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => AnalyzerConfig::load_from_file(path)?,
        None => AnalyzerConfig::load_default()?,
    };
    let rt = Runtime::from_config(cfg)?;

    match cli.command {
        Command::Run => {
            let sources = build_sources(&rt.cfg)?;
            let sink = JsonlSink::new(&rt.cfg.output.path);
            let report = pipeline::run_once(&sources, &rt.engine, &sink, rt.cfg.batch_size).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Compare { text, title } => {
            let report = rt.manager.comprehensive(&text, title.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { addr } => {
            let metrics = Metrics::init()?;
            let state = AppState::new(rt.engine.clone(), rt.manager.clone());
            let router = create_router(state).merge(metrics.router());

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            info!(%addr, "diagnostics api listening");
            axum::serve(listener, router).await?;
        }
    }
    Ok(())
}
