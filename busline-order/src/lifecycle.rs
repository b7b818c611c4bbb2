use chrono::{DateTime, Utc};

use crate::models::{Booking, BookingStatus, BookingUpdate};

// pending -> held -> confirmed
//         \        \-> cancelled | expired
//          \-> confirmed | cancelled | expired
// confirmed, cancelled and expired are terminal.
impl BookingStatus {
    /// `pending` and `held` still own (or are about to own) seats.
    pub fn is_open(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Held)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Held)
                | (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Held, Confirmed)
                | (Held, Cancelled)
                | (Held, Expired)
        )
    }
}

impl Booking {
    /// Apply an update after checking the status machine. Re-writing the same
    /// open status is allowed so payment fields can change on a live hold.
    pub fn apply_update(&mut self, update: &BookingUpdate, now: DateTime<Utc>) -> Result<(), BookingError> {
        let same_open = update.status == self.status && self.status.is_open();
        if !same_open && !self.status.can_transition_to(update.status) {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                to: update.status,
            });
        }

        self.status = update.status;
        if let Some(payment_status) = update.payment_status {
            self.payment_status = payment_status;
        }
        if let Some(method) = &update.payment_method {
            self.payment_method = Some(method.clone());
        }
        if let Some(tx_id) = &update.payment_transaction_id {
            self.payment_transaction_id = Some(tx_id.clone());
        }
        if let Some(code) = &update.ticket_code {
            self.ticket_code = Some(code.clone());
        }
        if self.status.is_terminal() {
            self.hold_expires_at = None;
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BookingError {
    #[error("Invalid booking transition from {from:?} to {to:?}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("At least one passenger is required")]
    NoPassengers,

    #[error("Seat number must not be empty")]
    EmptySeatNumber,

    #[error("Passenger name missing for seat {0}")]
    EmptyPassengerName(String),

    #[error("Seat {0} assigned to more than one passenger")]
    DuplicateSeat(String),

    #[error("Total amount overflows")]
    AmountOverflow,

    #[error("Unknown status value: {0}")]
    InvalidStatus(String),

    #[error("Malformed ticket code: {0}")]
    InvalidTicketCode(String),
}
