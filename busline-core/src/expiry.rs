use busline_order::{Booking, BookingStatus};
use tracing::{error, info, warn};

use crate::reservation::ReservationCoordinator;
use crate::{CoreError, CoreResult};

impl ReservationCoordinator {
    /// Expire one booking whose hold has lapsed, returning its seats.
    /// `Ok(false)` when the hold is still live or the booking already moved on.
    pub async fn expire_booking(&self, booking: &Booking) -> CoreResult<bool> {
        if !booking.is_hold_lapsed(self.clock.now()) {
            return Ok(false);
        }
        self.release_and_close(booking, BookingStatus::Expired).await
    }

    /// One pass of the background sweep, reading stale holds `page_size`
    /// at a time. Bookings that cannot be expired (their seats are already
    /// booked) are stepped over, so they never starve later holds. Failures
    /// on a single booking are logged and do not stop the pass.
    pub async fn sweep_expired_holds(&self, page_size: usize) -> CoreResult<usize> {
        let now = self.clock.now();
        let page_size = page_size.max(1);
        let mut cursor = None;
        let mut expired = 0;
        let mut skipped = 0;

        loop {
            let page = self
                .bookings
                .list_stale_holds(now, cursor, page_size)
                .await
                .map_err(|e| {
                    error!("Failed to list stale holds: {}", e);
                    CoreError::InternalError("failed to list stale holds".to_string())
                })?;

            for booking in &page {
                match self.expire_booking(booking).await {
                    Ok(true) => expired += 1,
                    Ok(false) => skipped += 1,
                    Err(e) => {
                        skipped += 1;
                        error!("Failed to expire booking {}: {}", booking.id, e)
                    }
                }
            }

            if page.len() < page_size {
                break;
            }
            cursor = page.last().and_then(|b| Some((b.hold_expires_at?, b.id)));
            if cursor.is_none() {
                break;
            }
        }

        if expired > 0 {
            info!("Expiry sweep released {} stale booking(s)", expired);
        }
        if skipped > 0 {
            warn!("Expiry sweep left {} stale booking(s) open", skipped);
        }
        Ok(expired)
    }
}
