use convene_core::ReservationPolicy;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Rate limiting is disabled when no Redis is configured.
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub reservations: ReservationPolicy,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout_secs() -> u64 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub max_requests: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    // 100 requests per 15 minutes per client address
    fn default() -> Self {
        Self { max_requests: 100, window_seconds: 900 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allowed_origin: Option<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origin: Some("http://localhost:3000".to_string()) }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `CONVENE_DATABASE__URL=postgres://...` overrides `database.url`
            .add_source(config::Environment::with_prefix("CONVENE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/convene"
            [auth]
            jwt_secret = "secret"
            "#,
        )
        .unwrap();

        assert!(config.redis.is_none());
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_seconds, 900);
        assert_eq!(config.reservations, ReservationPolicy::default());
    }

    #[test]
    fn test_reservation_policy_overrides() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/convene"
            [auth]
            jwt_secret = "secret"
            [reservations]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.reservations.max_attempts, 5);
        assert_eq!(config.reservations.retry_backoff_ms, 25);
    }

    #[test]
    fn test_missing_section_is_an_error() {
        assert!(parse("[server]\nport = 1").is_err());
    }
}
