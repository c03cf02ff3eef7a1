use anyhow::Context;
use convene_api::{app, AppState, AuthConfig};
use convene_core::ReservationManager;
use convene_store::app_config::Config;
use convene_store::{DbClient, PostgresEventRepository, PostgresReservationStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convene_api=debug,convene_store=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Convene API on port {}", config.server.port);

    // Database Connection
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let db = Arc::new(db);

    // Redis Connection (rate limiting only)
    let redis = match &config.redis {
        Some(redis_config) => {
            let client = RedisClient::new(&redis_config.url).context("Invalid Redis URL")?;
            Some(Arc::new(client))
        }
        None => {
            tracing::info!("Redis not configured, rate limiting disabled");
            None
        }
    };

    let policy = config.reservations.clone();
    let store = PostgresReservationStore::new(db.pool.clone(), policy.transaction_timeout());

    let app_state = AppState {
        reservations: ReservationManager::new(Arc::new(store), policy),
        events: Arc::new(PostgresEventRepository::new(db.pool.clone())),
        db: Some(db),
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        rate_limit: config.rate_limit.clone(),
        cors_origin: config.cors.allowed_origin.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
