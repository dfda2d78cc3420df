use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use shoutbox::{cli::Config, router, AppState, ShoutRepository};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::parse();
    info!(%config, "starting shoutbox");

    let repo = ShoutRepository::open(&config.db).with_context(|| {
        format!("error while opening/creating db at {}", config.db.display())
    })?;
    let repo = Arc::new(repo);

    let app = router(AppState::new(Arc::clone(&repo), config.api.clone()));
    let listener = TcpListener::bind(&config.listener)
        .await
        .with_context(|| format!("failed to bind {}", config.listener))?;
    info!("listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    repo.close();

    served.context("server exited with error")
}
