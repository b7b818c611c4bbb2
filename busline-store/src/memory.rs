use async_trait::async_trait;
use busline_catalog::{ClaimOutcome, ReleaseOutcome, SeatClaim, Trip};
use busline_core::repository::{BookingStore, HoldCursor, StoreError, TripCatalog};
use busline_order::{Booking, BookingStatus, BookingUpdate};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store for both trips and bookings.
///
/// Every conditional write runs under a single write guard on the owning
/// map, which is what makes the seat and booking compare-and-swaps atomic.
#[derive(Default)]
pub struct InMemoryStore {
    trips: RwLock<HashMap<Uuid, Trip>>,
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_trip(id: Uuid) -> StoreError {
    format!("trip {} does not exist", id).into()
}

#[async_trait]
impl TripCatalog for InMemoryStore {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError> {
        Ok(self.trips.read().await.get(&id).cloned())
    }

    async fn search_trips(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Trip>, StoreError> {
        let trips = self.trips.read().await;
        let mut found: Vec<Trip> = trips
            .values()
            .filter(|t| t.matches_search(origin, destination, date))
            .cloned()
            .collect();
        found.sort_by_key(|t| t.departure_time);
        Ok(found)
    }

    async fn create_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut trips = self.trips.write().await;
        if trips.contains_key(&trip.id) {
            return Err(format!("trip {} already exists", trip.id).into());
        }
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn try_claim_seat(
        &self,
        trip_id: Uuid,
        seat_number: &str,
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut trips = self.trips.write().await;
        let trip = trips.get_mut(&trip_id).ok_or_else(|| missing_trip(trip_id))?;
        let claimed = trip.seats.try_claim(seat_number, claim, now)?;
        if claimed {
            trip.updated_at = now;
        }
        Ok(claimed)
    }

    async fn claim_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut trips = self.trips.write().await;
        let trip = trips.get_mut(&trip_id).ok_or_else(|| missing_trip(trip_id))?;
        let outcome = trip.seats.claim_all(seat_numbers, claim, now)?;
        if outcome == ClaimOutcome::Claimed {
            trip.updated_at = now;
        }
        Ok(outcome)
    }

    async fn release_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
    ) -> Result<ReleaseOutcome, StoreError> {
        let mut trips = self.trips.write().await;
        let trip = trips.get_mut(&trip_id).ok_or_else(|| missing_trip(trip_id))?;
        Ok(trip.seats.release_all(seat_numbers, booking_id))
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(format!("booking {} already exists", booking.id).into());
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn get_booking_by_ticket_code(&self, code: &str) -> Result<Option<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .find(|b| b.ticket_code.as_deref() == Some(code))
            .cloned())
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        let mut mine: Vec<Booking> = bookings
            .values()
            .filter(|b| b.is_owned_by(user_id))
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        expected: &[BookingStatus],
        update: &BookingUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut bookings = self.bookings.write().await;

        if let Some(code) = update.ticket_code.as_deref() {
            let taken = bookings
                .values()
                .any(|b| b.id != id && b.ticket_code.as_deref() == Some(code));
            if taken {
                return Err(format!("ticket code {} already issued", code).into());
            }
        }

        let Some(booking) = bookings.get_mut(&id) else {
            return Ok(false);
        };
        if !expected.contains(&booking.status) {
            return Ok(false);
        }
        booking.apply_update(update, now)?;
        Ok(true)
    }

    async fn list_stale_holds(
        &self,
        now: DateTime<Utc>,
        after: Option<HoldCursor>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        let mut stale: Vec<(HoldCursor, Booking)> = bookings
            .values()
            .filter(|b| b.is_hold_lapsed(now))
            .filter_map(|b| Some(((b.hold_expires_at?, b.id), b.clone())))
            .filter(|(key, _)| after.map_or(true, |cursor| *key > cursor))
            .collect();
        stale.sort_by_key(|(key, _)| *key);
        stale.truncate(limit);
        Ok(stale.into_iter().map(|(_, b)| b).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_catalog::{NewTrip, Route, SeatStatus};
    use busline_order::PassengerSeat;
    use busline_shared::Masked;
    use chrono::{Duration, TimeZone};

    fn trip(seats: &[&str]) -> Trip {
        let departure = Utc.with_ymd_and_hms(2026, 5, 1, 22, 0, 0).unwrap();
        Trip::create(NewTrip {
            company_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            route: Route::direct("Hà Nội", "Sa Pa"),
            departure_time: departure,
            arrival_time: departure + Duration::hours(6),
            price: 350_000,
            seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    fn booking(user: &str, trip_id: Uuid, seat: &str, now: DateTime<Utc>) -> Booking {
        let passenger = PassengerSeat {
            name: "Trần Thị B".to_string(),
            phone: Masked::new("0912345678".to_string()),
            seat_number: seat.to_string(),
        };
        Booking::new(
            user.to_string(),
            trip_id,
            vec![passenger],
            350_000,
            "VND".to_string(),
            now,
            Duration::minutes(15),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_seat_claims_are_conditional() {
        let store = InMemoryStore::new();
        let trip = trip(&["A01", "A02"]);
        store.create_trip(&trip).await.unwrap();
        let now = Utc::now();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let hold = SeatClaim::hold(first, now + Duration::minutes(15));
        assert!(store.try_claim_seat(trip.id, "A01", &hold, now).await.unwrap());

        let hold = SeatClaim::hold(second, now + Duration::minutes(15));
        assert!(!store.try_claim_seat(trip.id, "A01", &hold, now).await.unwrap());

        let seats = vec!["A01".to_string(), "A02".to_string()];
        let outcome = store.claim_seats(trip.id, &seats, &hold, now).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Rejected { seat_number: "A01".to_string() });

        let stored = store.get_trip(trip.id).await.unwrap().unwrap();
        assert_eq!(stored.seats.get("A02").unwrap().status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn test_unknown_trip_is_an_error() {
        let store = InMemoryStore::new();
        let claim = SeatClaim::book(Uuid::new_v4());
        assert!(store
            .try_claim_seat(Uuid::new_v4(), "A01", &claim, Utc::now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_booking_status_compare_and_swap() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let b = booking("user-1", Uuid::new_v4(), "A01", now);
        store.create_booking(&b).await.unwrap();

        let held = BookingUpdate::status(BookingStatus::Held);
        assert!(store
            .update_booking_status(b.id, &[BookingStatus::Pending], &held, now)
            .await
            .unwrap());
        // Already moved past pending.
        assert!(!store
            .update_booking_status(b.id, &[BookingStatus::Pending], &held, now)
            .await
            .unwrap());
        assert!(!store
            .update_booking_status(Uuid::new_v4(), &[BookingStatus::Pending], &held, now)
            .await
            .unwrap());

        let stored = store.get_booking(b.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Held);
    }

    #[tokio::test]
    async fn test_ticket_codes_are_unique() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let first = booking("user-1", Uuid::new_v4(), "A01", now);
        let second = booking("user-2", Uuid::new_v4(), "A01", now);
        store.create_booking(&first).await.unwrap();
        store.create_booking(&second).await.unwrap();

        let confirm = BookingUpdate::confirmed("mock".into(), "tx-1".into(), "ABCD1234".into());
        assert!(store
            .update_booking_status(first.id, &[BookingStatus::Pending], &confirm, now)
            .await
            .unwrap());
        assert!(store
            .update_booking_status(second.id, &[BookingStatus::Pending], &confirm, now)
            .await
            .is_err());

        let found = store.get_booking_by_ticket_code("ABCD1234").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_stale_holds_and_history() {
        let store = InMemoryStore::new();
        let start = Utc::now();
        let older = booking("user-1", Uuid::new_v4(), "A01", start);
        let newer = booking("user-1", Uuid::new_v4(), "A02", start + Duration::minutes(5));
        let other = booking("user-2", Uuid::new_v4(), "A03", start + Duration::minutes(1));
        for b in [&older, &newer, &other] {
            store.create_booking(b).await.unwrap();
        }

        let history = store.list_bookings_for_user("user-1").await.unwrap();
        assert_eq!(history.iter().map(|b| b.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

        let stale = store
            .list_stale_holds(start + Duration::minutes(16), None, 10)
            .await
            .unwrap();
        assert_eq!(stale.iter().map(|b| b.id).collect::<Vec<_>>(), vec![older.id, other.id]);

        let limited = store
            .list_stale_holds(start + Duration::hours(1), None, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, older.id);

        let cursor = (older.hold_expires_at.unwrap(), older.id);
        let next = store
            .list_stale_holds(start + Duration::hours(1), Some(cursor), 10)
            .await
            .unwrap();
        assert_eq!(next.iter().map(|b| b.id).collect::<Vec<_>>(), vec![other.id, newer.id]);
    }
}
