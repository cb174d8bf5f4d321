//! keyward API server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use keyward_api::{create_router, state::AppState};
use keyward_core::{AppConfig, LoggingConfig, SystemClock};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("KEYWARD_CONFIG").ok().map(PathBuf::from);
    let config = AppConfig::load(config_path).context("Failed to load configuration")?;

    init_tracing(&config.logging);

    if config.tokens.uses_development_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development signing key");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::build(config, Arc::new(SystemClock))
        .await
        .context("Failed to initialize application state")?;
    tracing::info!(backend = state.db.backend_name(), "Storage ready");

    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("keyward API server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", logging.level)));

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
