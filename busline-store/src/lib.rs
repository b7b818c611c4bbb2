pub mod app_config;
pub mod database;
pub mod memory;
pub mod trip_repo;
pub mod booking_repo;
pub mod redis_repo;
pub mod seed;

pub use app_config::Config;
pub use database::DbClient;
pub use memory::InMemoryStore;
pub use trip_repo::PgTripRepository;
pub use booking_repo::PgBookingRepository;
pub use redis_repo::RedisClient;
