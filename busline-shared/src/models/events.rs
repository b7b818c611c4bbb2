use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why seats went back to `available`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseReason {
    Cancelled,
    Expired,
    ClaimRejected,
}

/// Seat-level changes published after each successful reservation step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationEvent {
    SeatsHeld {
        trip_id: Uuid,
        booking_id: Uuid,
        seat_numbers: Vec<String>,
        hold_expires_at: DateTime<Utc>,
    },
    BookingConfirmed {
        trip_id: Uuid,
        booking_id: Uuid,
        seat_numbers: Vec<String>,
        ticket_code: String,
    },
    SeatsReleased {
        trip_id: Uuid,
        booking_id: Uuid,
        seat_numbers: Vec<String>,
        reason: ReleaseReason,
    },
}

impl ReservationEvent {
    pub fn trip_id(&self) -> Uuid {
        match self {
            ReservationEvent::SeatsHeld { trip_id, .. }
            | ReservationEvent::BookingConfirmed { trip_id, .. }
            | ReservationEvent::SeatsReleased { trip_id, .. } => *trip_id,
        }
    }

    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            ReservationEvent::SeatsHeld { .. } => "seats_held",
            ReservationEvent::BookingConfirmed { .. } => "booking_confirmed",
            ReservationEvent::SeatsReleased { .. } => "seats_released",
        }
    }
}
