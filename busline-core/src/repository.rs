use async_trait::async_trait;
use busline_catalog::{ClaimOutcome, ReleaseOutcome, SeatClaim, Trip};
use busline_order::{Booking, BookingStatus, BookingUpdate};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Position in the stale-hold ordering: `(hold_expires_at, booking id)`.
pub type HoldCursor = (DateTime<Utc>, Uuid);

/// Trip documents and their seat inventory.
///
/// Seat mutations are conditional: an implementation must apply a claim only
/// if every targeted seat still satisfies the claim's precondition at the
/// moment of the write, with no other writer interleaving.
#[async_trait]
pub trait TripCatalog: Send + Sync {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError>;

    async fn search_trips(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Trip>, StoreError>;

    async fn create_trip(&self, trip: &Trip) -> Result<(), StoreError>;

    /// Single-seat compare-and-swap. `Ok(false)` if the precondition failed.
    async fn try_claim_seat(
        &self,
        trip_id: Uuid,
        seat_number: &str,
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// All-or-nothing claim over a booking's seats.
    async fn claim_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Return the booking's held seats to `available`. Reports `Committed`
    /// without touching anything if any of them is already booked.
    async fn release_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
    ) -> Result<ReleaseOutcome, StoreError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn get_booking_by_ticket_code(&self, code: &str) -> Result<Option<Booking>, StoreError>;

    /// Newest first.
    async fn list_bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// Applies `update` only while the booking's status is one of `expected`.
    /// Returns false if the booking is missing or has moved on.
    async fn update_booking_status(
        &self,
        id: Uuid,
        expected: &[BookingStatus],
        update: &BookingUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Open bookings whose hold window ended at or before `now`, ordered by
    /// `(hold_expires_at, id)` and starting strictly after `after`.
    async fn list_stale_holds(
        &self,
        now: DateTime<Utc>,
        after: Option<HoldCursor>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError>;
}
