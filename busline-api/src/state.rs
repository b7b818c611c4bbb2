use busline_core::{CatalogService, ReservationCoordinator};
use busline_shared::models::ReservationEvent;
use busline_store::RedisClient;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct RateLimit {
    pub redis: Arc<RedisClient>,
    pub per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationCoordinator>,
    pub catalog: CatalogService,
    pub events: broadcast::Sender<ReservationEvent>,
    pub rate_limit: Option<RateLimit>,
    pub auth: AuthConfig,
}
