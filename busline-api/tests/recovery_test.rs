mod common;

use async_trait::async_trait;
use busline_catalog::SeatStatus;
use busline_core::payment::{ChargeReceipt, ChargeRequest, MockPaymentAdapter, PaymentAdapter};
use busline_core::repository::{BookingStore, HoldCursor, StoreError};
use busline_core::CoreError;
use busline_order::{Booking, BookingStatus, BookingUpdate, PaymentStatus};
use busline_store::InMemoryStore;
use chrono::{DateTime, Duration, Utc};
use common::{fixture_with_bookings, passenger, Fixture};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

type GatewayError = Box<dyn std::error::Error + Send + Sync>;

/// Booking store whose first write to `confirmed` fails.
struct FailFirstConfirm {
    inner: Arc<InMemoryStore>,
    armed: AtomicBool,
}

#[async_trait]
impl BookingStore for FailFirstConfirm {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.inner.create_booking(booking).await
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.inner.get_booking(id).await
    }

    async fn get_booking_by_ticket_code(&self, code: &str) -> Result<Option<Booking>, StoreError> {
        self.inner.get_booking_by_ticket_code(code).await
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_bookings_for_user(user_id).await
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        expected: &[BookingStatus],
        update: &BookingUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if update.status == BookingStatus::Confirmed && self.armed.swap(false, Ordering::SeqCst) {
            return Err("connection reset by peer".into());
        }
        self.inner.update_booking_status(id, expected, update, now).await
    }

    async fn list_stale_holds(
        &self,
        now: DateTime<Utc>,
        after: Option<HoldCursor>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_stale_holds(now, after, limit).await
    }
}

#[derive(Default)]
struct CountingGateway {
    inner: MockPaymentAdapter,
    charges: AtomicUsize,
    refunds: AtomicUsize,
}

impl CountingGateway {
    fn charges(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    fn refunds(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentAdapter for CountingGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        self.inner.charge(request).await
    }

    async fn refund(&self, transaction_id: &str) -> Result<(), GatewayError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        self.inner.refund(transaction_id).await
    }
}

fn flaky_fixture() -> (Fixture, Arc<CountingGateway>) {
    let gateway = Arc::new(CountingGateway::default());
    let fx = fixture_with_bookings(gateway.clone(), |store| {
        Arc::new(FailFirstConfirm {
            inner: store,
            armed: AtomicBool::new(true),
        }) as Arc<dyn BookingStore>
    });
    (fx, gateway)
}

#[tokio::test]
async fn test_failed_confirmation_is_refunded_and_retry_completes() {
    let (fx, gateway) = flaky_fixture();
    let trip = fx.add_trip(&["A01", "A02"]).await;
    let receipt = fx
        .reservations
        .create_reservation("user-a", &trip.id.to_string(), vec![passenger("A01")])
        .await
        .unwrap();
    let booking_id = receipt.booking.id.to_string();

    let err = fx
        .reservations
        .confirm_payment(&booking_id, "user-a")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InternalError(_)));
    assert_eq!(gateway.charges(), 1);
    assert_eq!(gateway.refunds(), 1);
    assert_eq!(fx.booking(receipt.booking.id).await.status, BookingStatus::Held);
    assert_eq!(
        fx.seat_status(trip.id, "A01").await,
        (SeatStatus::Booked, Some(receipt.booking.id))
    );

    let confirmed = fx
        .reservations
        .confirm_payment(&booking_id, "user-a")
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
    assert!(confirmed.ticket_code.is_some());
    assert_eq!(gateway.charges(), 2);
    assert_eq!(gateway.refunds(), 1);
    fx.assert_consistent(trip.id, &["user-a".to_string()]).await;
}

#[tokio::test]
async fn test_sweep_steps_over_committed_booking() {
    let (fx, gateway) = flaky_fixture();
    let trip = fx.add_trip(&["A01", "A02"]).await;
    let trip_id = trip.id.to_string();

    let stuck = fx
        .reservations
        .create_reservation("user-a", &trip_id, vec![passenger("A01")])
        .await
        .unwrap();
    assert!(fx
        .reservations
        .confirm_payment(&stuck.booking.id.to_string(), "user-a")
        .await
        .is_err());

    fx.clock.advance(Duration::minutes(1));
    let later = fx
        .reservations
        .create_reservation("user-b", &trip_id, vec![passenger("A02")])
        .await
        .unwrap();

    fx.clock.advance(Duration::minutes(16));
    assert_eq!(fx.reservations.sweep_expired_holds(1).await.unwrap(), 1);
    assert_eq!(fx.booking(later.booking.id).await.status, BookingStatus::Expired);
    assert_eq!(fx.seat_status(trip.id, "A02").await, (SeatStatus::Available, None));
    assert_eq!(fx.booking(stuck.booking.id).await.status, BookingStatus::Held);
    assert_eq!(fx.reservations.sweep_expired_holds(1).await.unwrap(), 0);

    // The seats were committed before the hold lapsed, so payment still completes.
    let confirmed = fx
        .reservations
        .confirm_payment(&stuck.booking.id.to_string(), "user-a")
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(gateway.charges(), 2);
    assert_eq!(gateway.refunds(), 1);
    fx.assert_consistent(trip.id, &["user-a".to_string(), "user-b".to_string()])
        .await;
}
