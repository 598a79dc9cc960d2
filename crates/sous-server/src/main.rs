use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sous_core::ServiceConfig;
use sous_server::routes;
use sous_server::state::AppState;
use sous_server::sweeper::spawn_cache_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sous=info".parse()?))
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let service = sous_client::build_service(&config).context("cannot build recipe service")?;
    let state = Arc::new(AppState::new(service));

    let cancel = CancellationToken::new();
    let sweeper = spawn_cache_sweeper(
        Arc::clone(&state.service),
        config.cache_sweep_interval,
        cancel.clone(),
    );

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_address();
    tracing::info!(provider = %config.provider, "Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    sweeper.await?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
