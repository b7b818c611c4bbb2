use anyhow::Context;
use busline_api::{
    app,
    state::{AppState, AuthConfig, RateLimit},
    worker::run_expiry_sweeper,
};
use busline_core::clock::SystemClock;
use busline_core::payment::MockPaymentAdapter;
use busline_core::repository::{BookingStore, TripCatalog};
use busline_core::{CatalogService, ReservationCoordinator, ReservationPolicy};
use busline_store::app_config::{Config, StorageBackend};
use busline_store::{seed, DbClient, InMemoryStore, PgBookingRepository, PgTripRepository, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline_api=debug,busline_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    let (catalog, bookings): (Arc<dyn TripCatalog>, Arc<dyn BookingStore>) = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            let store = Arc::new(InMemoryStore::new());
            (store.clone() as Arc<dyn TripCatalog>, store as Arc<dyn BookingStore>)
        }
        StorageBackend::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .context("storage.backend is postgres but [database] is missing")?;
            let db = DbClient::new(&db_config.url, db_config.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            (
                Arc::new(PgTripRepository::new(db.pool.clone())) as Arc<dyn TripCatalog>,
                Arc::new(PgBookingRepository::new(db.pool.clone())) as Arc<dyn BookingStore>,
            )
        }
    };

    if config.seed.demo_trips {
        seed::seed_demo_trips(catalog.as_ref(), chrono::Utc::now())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to seed demo trips: {}", e))?;
    }

    let rate_limit = match &config.redis {
        Some(redis) => Some(RateLimit {
            redis: Arc::new(
                RedisClient::new(&redis.url)
                    .await
                    .context("Failed to connect to Redis")?,
            ),
            per_minute: redis.rate_limit_per_minute,
        }),
        None => None,
    };

    // Seat events for SSE subscribers
    let (events, _) = broadcast::channel(256);

    let policy = ReservationPolicy {
        hold_duration: chrono::Duration::seconds(config.reservation.hold_seconds as i64),
        max_seats_per_booking: config.reservation.max_seats_per_booking,
        currency: config.reservation.currency.clone(),
    };
    let reservations = Arc::new(
        ReservationCoordinator::new(
            catalog.clone(),
            bookings,
            Arc::new(MockPaymentAdapter::new()),
            Arc::new(SystemClock),
            policy,
        )
        .with_events(events.clone()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_expiry_sweeper(
        reservations.clone(),
        std::time::Duration::from_secs(config.reservation.sweep_interval_seconds),
        config.reservation.sweep_batch_size,
        shutdown_rx,
    ));

    let app_state = AppState {
        reservations,
        catalog: CatalogService::new(catalog),
        events,
        rate_limit,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    Ok(())
}
