use busline_shared::Masked;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::lifecycle::BookingError;

/// Booking status in the reservation lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Held,
    Confirmed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Held => "held",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "held" => Ok(BookingStatus::Held),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "expired" => Ok(BookingStatus::Expired),
            other => Err(BookingError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(BookingError::InvalidStatus(other.to_string())),
        }
    }
}

/// One passenger and the seat assigned to them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassengerSeat {
    pub name: String,
    pub phone: Masked<String>,
    pub seat_number: String,
}

/// A reservation attempt by one user on one trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub trip_id: Uuid,
    pub status: BookingStatus,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub payment_transaction_id: Option<String>,
    /// Unit price times seat count, in minor currency units.
    pub total_amount: i64,
    pub currency: String,
    pub passengers: Vec<PassengerSeat>,
    pub ticket_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Build a `pending` booking from validated passenger assignments.
    pub fn new(
        user_id: String,
        trip_id: Uuid,
        passengers: Vec<PassengerSeat>,
        unit_price: i64,
        currency: String,
        now: DateTime<Utc>,
        hold: Duration,
    ) -> Result<Self, BookingError> {
        validate_passengers(&passengers)?;
        let total_amount = unit_price
            .checked_mul(passengers.len() as i64)
            .ok_or(BookingError::AmountOverflow)?;

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            trip_id,
            status: BookingStatus::Pending,
            hold_expires_at: Some(now + hold),
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            payment_transaction_id: None,
            total_amount,
            currency,
            passengers,
            ticket_code: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn seat_numbers(&self) -> Vec<String> {
        self.passengers.iter().map(|p| p.seat_number.clone()).collect()
    }

    pub fn seat_count(&self) -> usize {
        self.passengers.len()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// An open booking whose hold window has passed.
    pub fn is_hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.hold_expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

/// Passenger list rules: non-empty, every seat and name present, no seat twice.
pub fn validate_passengers(passengers: &[PassengerSeat]) -> Result<(), BookingError> {
    if passengers.is_empty() {
        return Err(BookingError::NoPassengers);
    }
    let mut seen = HashSet::new();
    for p in passengers {
        if p.seat_number.trim().is_empty() {
            return Err(BookingError::EmptySeatNumber);
        }
        if p.name.trim().is_empty() {
            return Err(BookingError::EmptyPassengerName(p.seat_number.clone()));
        }
        if !seen.insert(p.seat_number.as_str()) {
            return Err(BookingError::DuplicateSeat(p.seat_number.clone()));
        }
    }
    Ok(())
}

/// Field changes written together with a status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingUpdate {
    pub status: BookingStatus,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub ticket_code: Option<String>,
}

impl BookingUpdate {
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status,
            payment_status: None,
            payment_method: None,
            payment_transaction_id: None,
            ticket_code: None,
        }
    }

    pub fn confirmed(payment_method: String, transaction_id: String, ticket_code: String) -> Self {
        Self {
            status: BookingStatus::Confirmed,
            payment_status: Some(PaymentStatus::Paid),
            payment_method: Some(payment_method),
            payment_transaction_id: Some(transaction_id),
            ticket_code: Some(ticket_code),
        }
    }

    /// Keeps the hold in place and records the declined charge.
    pub fn payment_failed(current: BookingStatus, payment_method: String) -> Self {
        Self {
            status: current,
            payment_status: Some(PaymentStatus::Failed),
            payment_method: Some(payment_method),
            payment_transaction_id: None,
            ticket_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passenger(seat: &str) -> PassengerSeat {
        PassengerSeat {
            name: "Nguyễn Văn A".to_string(),
            phone: Masked::new("0901234567".to_string()),
            seat_number: seat.to_string(),
        }
    }

    #[test]
    fn test_new_booking_is_pending_with_total() {
        let now = Utc::now();
        let booking = Booking::new(
            "user-1".to_string(),
            Uuid::new_v4(),
            vec![passenger("A1"), passenger("A2")],
            250_000,
            "VND".to_string(),
            now,
            Duration::minutes(15),
        )
        .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.total_amount, 500_000);
        assert_eq!(booking.seat_numbers(), vec!["A1".to_string(), "A2".to_string()]);
        assert_eq!(booking.hold_expires_at, Some(now + Duration::minutes(15)));
        assert!(booking.ticket_code.is_none());
    }

    #[test]
    fn test_passenger_validation() {
        assert_eq!(validate_passengers(&[]), Err(BookingError::NoPassengers));
        assert_eq!(validate_passengers(&[passenger(" ")]), Err(BookingError::EmptySeatNumber));
        assert_eq!(
            validate_passengers(&[passenger("A1"), passenger("A1")]),
            Err(BookingError::DuplicateSeat("A1".to_string()))
        );

        let mut nameless = passenger("A1");
        nameless.name.clear();
        assert_eq!(
            validate_passengers(&[nameless]),
            Err(BookingError::EmptyPassengerName("A1".to_string()))
        );
    }

    #[test]
    fn test_total_overflow() {
        let result = Booking::new(
            "user-1".to_string(),
            Uuid::new_v4(),
            vec![passenger("A1"), passenger("A2")],
            i64::MAX,
            "VND".to_string(),
            Utc::now(),
            Duration::minutes(15),
        );
        assert_eq!(result.err(), Some(BookingError::AmountOverflow));
    }

    #[test]
    fn test_hold_lapse() {
        let now = Utc::now();
        let booking = Booking::new(
            "user-1".to_string(),
            Uuid::new_v4(),
            vec![passenger("A1")],
            100,
            "VND".to_string(),
            now,
            Duration::minutes(15),
        )
        .unwrap();

        assert!(!booking.is_hold_lapsed(now + Duration::minutes(14)));
        assert!(booking.is_hold_lapsed(now + Duration::minutes(15)));
    }
}
