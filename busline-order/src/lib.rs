pub mod models;
pub mod lifecycle;
pub mod ticket;

pub use models::{Booking, BookingStatus, BookingUpdate, PassengerSeat, PaymentStatus};
pub use lifecycle::BookingError;
pub use ticket::TicketCode;
