use planner_backend::config::AppConfig;
use planner_backend::{create_router, initialize_backend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded .env from {:?}", path),
        Err(e) => warn!("Could not load .env file: {}", e),
    }

    let config = AppConfig::from_env()?;
    let app_state = initialize_backend(&config).await?;

    // Resolve the startup identity before the summary loads
    app_state.auth_service.restore().await;
    let _summary_refresh = app_state.finance_overview.spawn_refresh_loop();

    let app = create_router(app_state);

    info!("Starting server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
