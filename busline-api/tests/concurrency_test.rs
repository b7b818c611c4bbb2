mod common;

use busline_catalog::SeatStatus;
use busline_core::{ConflictReason, CoreError, StateReason};
use busline_order::BookingStatus;
use chrono::Duration;
use common::{fixture, passenger, passengers};
use std::sync::Arc;

const CONTENDERS: usize = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_one_winner_per_seat() {
    let fx = fixture();
    let trip = fx.add_trip(&["A01"]).await;
    let trip_id = Arc::new(trip.id.to_string());
    let users: Vec<String> = (0..CONTENDERS).map(|i| format!("user-{}", i)).collect();

    let mut handles = Vec::new();
    for user in users.clone() {
        let reservations = fx.reservations.clone();
        let trip_id = trip_id.clone();
        handles.push(tokio::spawn(async move {
            reservations
                .create_reservation(&user, &trip_id, vec![passenger("A01")])
                .await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => winners.push(receipt.booking),
            Err(CoreError::Conflict(ConflictReason::SeatUnavailable(seat))) => assert_eq!(seat, "A01"),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(
        fx.seat_status(trip.id, "A01").await,
        (SeatStatus::Held, Some(winners[0].id))
    );
    fx.assert_consistent(trip.id, &users).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_overlapping_multi_seat_requests_never_split() {
    let fx = fixture();
    let trip = fx.add_trip(&["A01", "A02", "A03", "A04"]).await;
    let trip_id = Arc::new(trip.id.to_string());
    let requests: [&[&str]; 4] = [&["A01", "A02"], &["A02", "A03"], &["A03", "A04"], &["A04", "A01"]];
    let users: Vec<String> = (0..CONTENDERS).map(|i| format!("user-{}", i)).collect();

    let mut handles = Vec::new();
    for (i, user) in users.iter().cloned().enumerate() {
        let reservations = fx.reservations.clone();
        let trip_id = trip_id.clone();
        let seats = passengers(requests[i % requests.len()]);
        handles.push(tokio::spawn(async move {
            reservations.create_reservation(&user, &trip_id, seats).await
        }));
    }

    let mut held = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                assert_eq!(receipt.booking.status, BookingStatus::Held);
                held += receipt.seat_count;
            }
            Err(CoreError::Conflict(ConflictReason::SeatUnavailable(_))) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    // Two disjoint pairs at most.
    assert!(held == 2 || held == 4, "held {} seats", held);
    let trip_now = fx.trip(trip.id).await;
    let occupied = trip_now
        .seats
        .iter()
        .filter(|s| s.status == SeatStatus::Held)
        .count();
    assert_eq!(occupied, held);
    fx.assert_consistent(trip.id, &users).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_confirmations_issue_one_ticket() {
    let fx = fixture();
    let trip = fx.add_trip(&["A01", "A02"]).await;
    let receipt = fx
        .reservations
        .create_reservation("user-a", &trip.id.to_string(), passengers(&["A01", "A02"]))
        .await
        .unwrap();
    let booking_id = Arc::new(receipt.booking.id.to_string());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let reservations = fx.reservations.clone();
        let booking_id = booking_id.clone();
        handles.push(tokio::spawn(async move {
            reservations.confirm_payment(&booking_id, "user-a").await
        }));
    }

    let mut confirmed = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(booking) => confirmed.push(booking),
            Err(CoreError::InvalidState(StateReason::AlreadyPaid)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(confirmed.len(), 1);
    let stored = fx.booking(receipt.booking.id).await;
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(stored.ticket_code, confirmed[0].ticket_code);
    fx.assert_consistent(trip.id, &["user-a".to_string()]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirmation_racing_expiry_stays_consistent() {
    let fx = fixture();
    let seats: Vec<String> = (1..=20).map(|i| format!("B{:02}", i)).collect();
    let seat_refs: Vec<&str> = seats.iter().map(String::as_str).collect();
    let trip = fx.add_trip(&seat_refs).await;
    let trip_id = trip.id.to_string();

    let mut bookings = Vec::new();
    for seat in &seats {
        let receipt = fx
            .reservations
            .create_reservation("user-a", &trip_id, vec![passenger(seat)])
            .await
            .unwrap();
        bookings.push(receipt.booking.id.to_string());
    }

    fx.clock.advance(Duration::minutes(15) - Duration::milliseconds(1));

    let mut confirms = Vec::new();
    for id in bookings {
        let reservations = fx.reservations.clone();
        confirms.push(tokio::spawn(async move {
            reservations.confirm_payment(&id, "user-a").await
        }));
    }
    fx.clock.advance(Duration::milliseconds(1));
    let reservations = fx.reservations.clone();
    let sweep = tokio::spawn(async move { reservations.sweep_expired_holds(100).await });

    for handle in confirms {
        match handle.await.unwrap() {
            Ok(booking) => assert_eq!(booking.status, BookingStatus::Confirmed),
            Err(CoreError::InvalidState(StateReason::HoldExpired)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    sweep.await.unwrap().unwrap();

    // Whatever interleaving happened, nothing is left open and every
    // confirmed booking owns its seat.
    for booking in fx.reservations.list_bookings("user-a").await.unwrap() {
        assert!(matches!(
            booking.status,
            BookingStatus::Confirmed | BookingStatus::Expired
        ));
    }
    fx.assert_consistent(trip.id, &["user-a".to_string()]).await;
}
