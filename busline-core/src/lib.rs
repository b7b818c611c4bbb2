pub mod clock;
pub mod identity;
pub mod repository;
pub mod payment;
pub mod catalog;
pub mod reservation;
pub mod expiry;

use busline_catalog::LedgerError;
use busline_order::BookingError;

pub use catalog::CatalogService;
pub use reservation::{
    BookingDetails, PassengerInput, ReservationCoordinator, ReservationPolicy, ReservationReceipt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Entity {
    #[error("trip")]
    Trip,
    #[error("booking")]
    Booking,
    #[error("ticket")]
    Ticket,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictReason {
    #[error("trip is no longer open for booking")]
    TripNotBookable,
    #[error("seat {0} is not available")]
    SeatUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateReason {
    #[error("booking is already paid")]
    AlreadyPaid,
    #[error("booking was cancelled or has expired")]
    BookingClosed,
    #[error("seat hold has expired")]
    HoldExpired,
    #[error("payment was declined")]
    PaymentDeclined,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(ConflictReason),
    #[error("Invalid state: {0}")]
    InvalidState(StateReason),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<BookingError> for CoreError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::InvalidTransition { .. } | BookingError::InvalidStatus(_) => {
                CoreError::InternalError(err.to_string())
            }
            other => CoreError::InvalidInput(other.to_string()),
        }
    }
}

impl From<LedgerError> for CoreError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownSeat(seat) => CoreError::Conflict(ConflictReason::SeatUnavailable(seat)),
            LedgerError::IllegalTransition { .. }
            | LedgerError::MissingHoldExpiry
            | LedgerError::InvalidStatus(_) => CoreError::InternalError(err.to_string()),
            other => CoreError::InvalidInput(other.to_string()),
        }
    }
}
