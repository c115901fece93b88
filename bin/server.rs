// Org Ledger - Web Server
// REST API + SSE change streams with Axum

use anyhow::{Context, Result};
use clap::Parser;
use org_ledger::api::{router, AppState};
use org_ledger::{logging, Config, Store, VERSION};
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "org-ledger-server", version, about = "Org Ledger HTTP API")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    logging::init(&config.logging.level, args.verbose);

    println!("🌐 Org Ledger v{VERSION} - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Store::open(&config.database.path)
        .with_context(|| format!("Failed to open database at {:?}", config.database.path))?
        .with_org_config(&config.org);
    println!("✓ Database opened: {:?}", config.database.path);

    let app = router(AppState::new(store))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = args.bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{addr}");
    println!("   API: http://{addr}/api/transactions");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;
    Ok(())
}
