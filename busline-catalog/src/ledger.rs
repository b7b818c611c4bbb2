use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::trip::{Seat, SeatStatus};

/// Authoritative seat collection of a single trip.
///
/// Every status change goes through a [`SeatClaim`], a compare-and-swap on
/// the seat's current status and owner. Storage backends hold whatever lock
/// or transaction they need around these calls; the ledger itself only
/// guarantees that a multi-seat claim checks every seat before touching any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SeatLedger {
    seats: Vec<Seat>,
}

/// A conditional transition `from -> to` on behalf of one booking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeatClaim {
    pub from: SeatStatus,
    pub to: SeatStatus,
    pub booking_id: Uuid,
    pub hold_until: Option<DateTime<Utc>>,
}

impl SeatClaim {
    /// available -> held
    pub fn hold(booking_id: Uuid, hold_until: DateTime<Utc>) -> Self {
        Self {
            from: SeatStatus::Available,
            to: SeatStatus::Held,
            booking_id,
            hold_until: Some(hold_until),
        }
    }

    /// held -> booked
    pub fn book(booking_id: Uuid) -> Self {
        Self {
            from: SeatStatus::Held,
            to: SeatStatus::Booked,
            booking_id,
            hold_until: None,
        }
    }

    /// held -> available
    pub fn release(booking_id: Uuid) -> Self {
        Self {
            from: SeatStatus::Held,
            to: SeatStatus::Available,
            booking_id,
            hold_until: None,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        match (self.from, self.to) {
            (SeatStatus::Available, SeatStatus::Held) => {
                if self.hold_until.is_none() {
                    return Err(LedgerError::MissingHoldExpiry);
                }
                Ok(())
            }
            (SeatStatus::Held, SeatStatus::Booked) | (SeatStatus::Held, SeatStatus::Available) => Ok(()),
            (from, to) => Err(LedgerError::IllegalTransition { from, to }),
        }
    }

    /// Whether `seat` currently satisfies this claim's precondition.
    pub fn matches(&self, seat: &Seat, now: DateTime<Utc>) -> bool {
        match self.from {
            SeatStatus::Available => seat.is_claimable(now),
            SeatStatus::Held => seat.status == SeatStatus::Held && seat.is_owned_by(self.booking_id),
            SeatStatus::Booked => false,
        }
    }

    fn apply(&self, seat: &mut Seat) {
        seat.status = self.to;
        match self.to {
            SeatStatus::Available => {
                seat.booking_id = None;
                seat.hold_expires_at = None;
            }
            SeatStatus::Held => {
                seat.booking_id = Some(self.booking_id);
                seat.hold_expires_at = self.hold_until;
            }
            SeatStatus::Booked => {
                seat.booking_id = Some(self.booking_id);
                seat.hold_expires_at = None;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// First seat whose precondition did not hold. Nothing was mutated.
    Rejected { seat_number: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { count: usize },
    /// At least one seat is already `booked` by the booking; nothing was mutated.
    Committed,
}

impl SeatLedger {
    pub fn new(seats: Vec<Seat>) -> Result<Self, LedgerError> {
        if seats.is_empty() {
            return Err(LedgerError::NoSeats);
        }
        let mut seen = HashSet::new();
        for seat in &seats {
            if seat.seat_number.trim().is_empty() {
                return Err(LedgerError::EmptySeatNumber);
            }
            if !seen.insert(seat.seat_number.as_str()) {
                return Err(LedgerError::DuplicateSeat(seat.seat_number.clone()));
            }
        }
        Ok(Self { seats })
    }

    pub fn get(&self, seat_number: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.seat_number == seat_number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn available_count(&self, now: DateTime<Utc>) -> usize {
        self.seats.iter().filter(|s| s.is_claimable(now)).count()
    }

    pub fn seats_owned_by(&self, booking_id: Uuid) -> Vec<&Seat> {
        self.seats.iter().filter(|s| s.is_owned_by(booking_id)).collect()
    }

    /// True when every listed seat has `status` and belongs to the booking.
    pub fn all_in_state(&self, seat_numbers: &[String], status: SeatStatus, booking_id: Uuid) -> bool {
        seat_numbers.iter().all(|n| {
            self.get(n)
                .map(|s| s.status == status && s.is_owned_by(booking_id))
                .unwrap_or(false)
        })
    }

    /// Single-seat compare-and-swap. `Ok(false)` means the precondition did not hold.
    pub fn try_claim(
        &mut self,
        seat_number: &str,
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        claim.validate()?;
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.seat_number == seat_number)
            .ok_or_else(|| LedgerError::UnknownSeat(seat_number.to_string()))?;

        if !claim.matches(seat, now) {
            return Ok(false);
        }
        claim.apply(seat);
        Ok(true)
    }

    /// All-or-nothing claim over several seats.
    pub fn claim_all(
        &mut self,
        seat_numbers: &[String],
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, LedgerError> {
        claim.validate()?;
        if seat_numbers.is_empty() {
            return Err(LedgerError::NoSeats);
        }

        let mut indices = Vec::with_capacity(seat_numbers.len());
        let mut seen = HashSet::new();
        for number in seat_numbers {
            if !seen.insert(number.as_str()) {
                return Err(LedgerError::DuplicateSeat(number.clone()));
            }
            let idx = self
                .seats
                .iter()
                .position(|s| &s.seat_number == number)
                .ok_or_else(|| LedgerError::UnknownSeat(number.clone()))?;
            indices.push(idx);
        }

        if let Some(&idx) = indices.iter().find(|&&idx| !claim.matches(&self.seats[idx], now)) {
            return Ok(ClaimOutcome::Rejected {
                seat_number: self.seats[idx].seat_number.clone(),
            });
        }

        for idx in indices {
            claim.apply(&mut self.seats[idx]);
        }
        Ok(ClaimOutcome::Claimed)
    }

    /// Returns the booking's held seats among `seat_numbers` to `available`.
    /// Seats owned by someone else (a lapsed hold that was re-claimed) are left alone.
    pub fn release_all(&mut self, seat_numbers: &[String], booking_id: Uuid) -> ReleaseOutcome {
        let listed = |number: &str| seat_numbers.iter().any(|n| n == number);

        let committed = self.seats.iter().any(|s| {
            listed(s.seat_number.as_str()) && s.status == SeatStatus::Booked && s.is_owned_by(booking_id)
        });
        if committed {
            return ReleaseOutcome::Committed;
        }

        let release = SeatClaim::release(booking_id);
        let mut count = 0;
        for seat in self.seats.iter_mut() {
            if listed(seat.seat_number.as_str())
                && seat.status == SeatStatus::Held
                && seat.is_owned_by(booking_id)
            {
                release.apply(seat);
                count += 1;
            }
        }
        ReleaseOutcome::Released { count }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LedgerError {
    #[error("Seat not found on trip: {0}")]
    UnknownSeat(String),

    #[error("Seat listed more than once: {0}")]
    DuplicateSeat(String),

    #[error("Seat number must not be empty")]
    EmptySeatNumber,

    #[error("No seats given")]
    NoSeats,

    #[error("Illegal seat transition from {from:?} to {to:?}")]
    IllegalTransition { from: SeatStatus, to: SeatStatus },

    #[error("A hold needs an expiry time")]
    MissingHoldExpiry,

    #[error("Unknown status value: {0}")]
    InvalidStatus(String),

    #[error("Invalid trip: {0}")]
    InvalidTrip(String),
}
