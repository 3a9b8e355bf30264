use anyhow::Context;
use axum::{debug_handler, routing::get, Router};
use roomrelay::{rooms, AppState, Config, Hub, MessageStore};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,roomrelay=debug")),
        )
        .init();

    let config = Config::from_env()?;

    let store = MessageStore::connect(&config.database_url)
        .await
        .with_context(|| format!("could not open message store at {}", config.database_url))?;

    let bind = config.bind;
    let hub = Hub::new(store, config);
    let app_state = AppState::new(hub.clone());

    let app = Router::new()
        .route("/health", get(health))

        .nest("/r", rooms::router())

        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hub.shutdown().await;
    Ok(())
}

#[debug_handler]
async fn health() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
