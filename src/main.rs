use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use workmate_relay::auth::{HttpIdentityProvider, IdentityProvider, StaticIdentityProvider};
use workmate_relay::{create_router, AppState, Config, NatsEngine, SessionRegistry};

#[derive(Parser, Debug)]
#[command(name = "workmate-relay", about = "Transcription relay gateway")]
struct Args {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/workmate-relay")]
    config: String,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<String>,

    /// Override the port from the config
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Workmate Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let registry = Arc::new(SessionRegistry::new(Duration::from_secs(
        cfg.gateway.retention_secs,
    )));
    registry.spawn_sweeper(Duration::from_secs(cfg.gateway.sweep_interval_secs));

    let engine = NatsEngine::connect(&cfg.engine.nats_url).await?;

    let identity: Arc<dyn IdentityProvider> = if let Some(url) = &cfg.identity.verify_url {
        info!("Delegating token verification to {}", url);
        Arc::new(HttpIdentityProvider::new(url))
    } else if !cfg.identity.tokens.is_empty() {
        info!(
            "Using a static token list ({} tokens); not for production",
            cfg.identity.tokens.len()
        );
        Arc::new(StaticIdentityProvider::new(cfg.identity.tokens.clone()))
    } else {
        bail!("identity config needs either verify_url or a token list");
    };

    let state = AppState::new(
        registry,
        Arc::new(engine),
        identity,
        Duration::from_secs(cfg.gateway.processing_timeout_secs),
    );
    let app = create_router(state);

    let bind = args.bind.unwrap_or(cfg.service.http.bind);
    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", bind, port);
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
