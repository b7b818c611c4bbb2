#![allow(dead_code)]

use busline_api::state::{AppState, AuthConfig};
use busline_catalog::{NewTrip, Route, SeatStatus, Trip, TripStatus};
use busline_core::clock::{Clock, ManualClock};
use busline_core::payment::{MockPaymentAdapter, PaymentAdapter};
use busline_core::repository::{BookingStore, TripCatalog};
use busline_core::{CatalogService, PassengerInput, ReservationCoordinator, ReservationPolicy};
use busline_order::{Booking, BookingStatus};
use busline_shared::models::ReservationEvent;
use busline_store::InMemoryStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret";

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub reservations: Arc<ReservationCoordinator>,
    pub catalog: CatalogService,
    pub events: broadcast::Sender<ReservationEvent>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

pub fn fixture() -> Fixture {
    fixture_with(Arc::new(MockPaymentAdapter::new()))
}

pub fn fixture_with(payments: Arc<dyn PaymentAdapter>) -> Fixture {
    fixture_with_bookings(payments, |store| store as Arc<dyn BookingStore>)
}

/// Lets a test put its own `BookingStore` in front of the shared in-memory store.
pub fn fixture_with_bookings(
    payments: Arc<dyn PaymentAdapter>,
    bookings: impl FnOnce(Arc<InMemoryStore>) -> Arc<dyn BookingStore>,
) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let (events, _) = broadcast::channel(64);
    let reservations = ReservationCoordinator::new(
        store.clone(),
        bookings(store.clone()),
        payments,
        clock.clone(),
        ReservationPolicy::default(),
    )
    .with_events(events.clone());

    Fixture {
        catalog: CatalogService::new(store.clone()),
        store,
        clock,
        reservations: Arc::new(reservations),
        events,
    }
}

impl Fixture {
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn add_trip(&self, seats: &[&str]) -> Trip {
        self.add_trip_with_status(seats, TripStatus::Scheduled).await
    }

    pub async fn add_trip_with_status(&self, seats: &[&str], status: TripStatus) -> Trip {
        let departure = start_time() + Duration::days(2);
        let mut trip = Trip::create(NewTrip {
            company_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            route: Route::direct("Sài Gòn", "Đà Lạt"),
            departure_time: departure,
            arrival_time: departure + Duration::hours(7),
            price: 250_000,
            seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap();
        trip.status = status;
        self.store.create_trip(&trip).await.unwrap();
        trip
    }

    pub async fn trip(&self, id: Uuid) -> Trip {
        self.store.get_trip(id).await.unwrap().unwrap()
    }

    pub async fn booking(&self, id: Uuid) -> Booking {
        self.store.get_booking(id).await.unwrap().unwrap()
    }

    pub async fn seat_status(&self, trip_id: Uuid, seat: &str) -> (SeatStatus, Option<Uuid>) {
        let trip = self.trip(trip_id).await;
        let seat = trip.seats.get(seat).unwrap();
        (seat.status, seat.booking_id)
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            reservations: self.reservations.clone(),
            catalog: self.catalog.clone(),
            events: self.events.clone(),
            rate_limit: None,
            auth: AuthConfig {
                secret: JWT_SECRET.to_string(),
                expiration: 3600,
            },
        }
    }

    /// Confirmed bookings own every seat as `booked`; closed bookings own
    /// nothing; no seat is owned by a booking that does not list it.
    pub async fn assert_consistent(&self, trip_id: Uuid, users: &[String]) {
        let trip = self.trip(trip_id).await;
        let mut bookings = Vec::new();
        for user in users {
            bookings.extend(self.store.list_bookings_for_user(user).await.unwrap());
        }

        for booking in bookings.iter().filter(|b| b.trip_id == trip_id) {
            let seats = booking.seat_numbers();
            match booking.status {
                BookingStatus::Confirmed => {
                    assert!(
                        trip.seats.all_in_state(&seats, SeatStatus::Booked, booking.id),
                        "confirmed booking {} does not own its seats",
                        booking.id
                    );
                    assert!(booking.ticket_code.is_some());
                }
                BookingStatus::Cancelled | BookingStatus::Expired => {
                    assert!(
                        trip.seats.seats_owned_by(booking.id).is_empty(),
                        "closed booking {} still owns seats",
                        booking.id
                    );
                }
                BookingStatus::Held => {
                    assert!(trip.seats.all_in_state(&seats, SeatStatus::Held, booking.id));
                }
                BookingStatus::Pending => {}
            }
        }

        for seat in trip.seats.iter() {
            assert!(seat.is_consistent(), "seat {} is inconsistent", seat.seat_number);
            if let Some(owner) = seat.booking_id {
                let booking = bookings
                    .iter()
                    .find(|b| b.id == owner)
                    .expect("seat owned by an unknown booking");
                assert!(booking.seat_numbers().contains(&seat.seat_number));
            }
        }
    }
}

pub fn passenger(seat: &str) -> PassengerInput {
    PassengerInput {
        name: "Lê Văn C".to_string(),
        phone: "0987654321".to_string(),
        seat_number: seat.to_string(),
    }
}

pub fn passengers(seats: &[&str]) -> Vec<PassengerInput> {
    seats.iter().map(|s| passenger(s)).collect()
}
