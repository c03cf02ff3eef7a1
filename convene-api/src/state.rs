use std::sync::Arc;
use convene_core::{EventRepository, ReservationManager};
use convene_store::app_config::RateLimitConfig;
use convene_store::{DbClient, RedisClient};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: ReservationManager,
    pub events: Arc<dyn EventRepository>,
    /// `None` when running on the in-memory store.
    pub db: Option<Arc<DbClient>>,
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub cors_origin: Option<String>,
}
