pub mod events;

pub use events::{ReleaseReason, ReservationEvent};
