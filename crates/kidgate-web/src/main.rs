//! HTTP server for the kidgate moderation pipeline.
//!
//! # Usage
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run -p kidgate-web
//! OPENAI_API_KEY=sk-... cargo run -p kidgate-web -- --port 8080 --audit-dir ./audit
//! OPENAI_API_KEY=sk-... cargo run -p kidgate-web -- --config kidgate.json
//! ```
//!
//! ## Example request
//!
//! ```bash
//! curl -s localhost:3001/api/interact -H 'content-type: application/json' -d '{
//!   "user_id": "kid-1",
//!   "child_prompt": "Can you help me with fractions?",
//!   "features": ["school_assignment"],
//!   "strategies": ["Tailor to Age Group"],
//!   "child_age": "9-12 years"
//! }'
//! ```

use std::path::PathBuf;

use clap::Parser;
use kidgate::config::GateConfig;
use kidgate_web::{AppState, WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// HTTP JSON surface for the moderation gate.
#[derive(Parser)]
#[command(about = "Serve the kidgate moderation pipeline over HTTP")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for JSON Lines audit files (in-memory when omitted).
    #[arg(long)]
    audit_dir: Option<PathBuf>,

    /// API key (overrides OPENAI_API_KEY).
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Err(e) = serve(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn serve(args: Args) -> Result<(), String> {
    let mut config = match &args.config {
        Some(path) => GateConfig::from_file(path).map_err(|e| e.to_string())?,
        None => GateConfig::default(),
    }
    .with_env_overrides()
    .map_err(|e| e.to_string())?;
    if let Some(dir) = args.audit_dir {
        config = config.with_audit_dir(dir);
    }

    let state = AppState::from_config(config, args.api_key.as_deref()).map_err(|e| e.to_string())?;
    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
    };
    let addr = spawn_web(state, web_config)
        .await
        .map_err(|e| format!("failed to bind port {}: {e}", args.port))?;
    info!("Listening on http://{addr}");
    println!("API: http://{addr}/api");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for shutdown signal: {e}"))?;
    info!("Shutting down");
    Ok(())
}
