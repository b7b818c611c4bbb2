pub mod trip;
pub mod ledger;

pub use trip::{
    Company, GeoPoint, NewTrip, Route, Seat, SeatStatus, StopPoint, Trip, TripStatus, TripStop,
    TripSummary, Vehicle,
};
pub use ledger::{ClaimOutcome, LedgerError, ReleaseOutcome, SeatClaim, SeatLedger};
