use busline_core::ReservationCoordinator;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Periodically returns seats of lapsed holds to the pool until `shutdown` flips.
pub async fn run_expiry_sweeper(
    reservations: Arc<ReservationCoordinator>,
    every: Duration,
    batch_size: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Expiry sweeper started, interval {:?}", every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match reservations.sweep_expired_holds(batch_size).await {
                    Ok(0) => debug!("Expiry sweep found nothing to release"),
                    Ok(n) => info!("Expiry sweep expired {} booking(s)", n),
                    Err(e) => error!("Expiry sweep failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Expiry sweeper stopped");
}
