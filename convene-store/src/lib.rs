pub mod app_config;
pub mod database;
pub mod event_repo;
pub mod redis_repo;
pub mod reservation_repo;

pub use database::DbClient;
pub use event_repo::PostgresEventRepository;
pub use redis_repo::RedisClient;
pub use reservation_repo::PostgresReservationStore;
