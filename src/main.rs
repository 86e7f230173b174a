use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tablesplit::{
    build_router, payment::LoggingPosClient, AppConfig, AppState, Repositories,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablesplit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(addr = %config.listen_addr, "Starting tablesplit server");

    let repositories = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Using PostgreSQL storage");
            Repositories::postgres(pool)
        }
        None => {
            warn!("DATABASE_URL not set, state will not survive a restart");
            Repositories::in_memory()
        }
    };

    let app_state = AppState::new(&config, repositories, Arc::new(LoggingPosClient));

    // Expired sessions are rejected on use; this only keeps storage small
    let authenticator = app_state.authenticator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = authenticator.cleanup_expired_sessions().await {
                warn!(error = %e, "Session cleanup failed");
            }
        }
    });

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Server running on http://{}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
