use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::ledger::{LedgerError, SeatLedger};

/// Operational status of a scheduled departure. Advanced by operations,
/// never by the reservation flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Scheduled,
    Departed,
    Arrived,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::Departed => "departed",
            TripStatus::Arrived => "arrived",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TripStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TripStatus::Scheduled),
            "departed" => Ok(TripStatus::Departed),
            "arrived" => Ok(TripStatus::Arrived),
            "cancelled" => Ok(TripStatus::Cancelled),
            other => Err(LedgerError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Held => "held",
            SeatStatus::Booked => "booked",
        }
    }
}

impl FromStr for SeatStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "held" => Ok(SeatStatus::Held),
            "booked" => Ok(SeatStatus::Booked),
            other => Err(LedgerError::InvalidStatus(other.to_string())),
        }
    }
}

/// One seat of one trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub seat_number: String,
    pub status: SeatStatus,
    pub booking_id: Option<Uuid>,
    /// Only set while `held`.
    pub hold_expires_at: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn available(seat_number: impl Into<String>) -> Self {
        Self {
            seat_number: seat_number.into(),
            status: SeatStatus::Available,
            booking_id: None,
            hold_expires_at: None,
        }
    }

    /// A held seat whose hold has lapsed counts as free for new claims.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SeatStatus::Available => true,
            SeatStatus::Held => self.hold_expires_at.map(|t| t <= now).unwrap_or(false),
            SeatStatus::Booked => false,
        }
    }

    pub fn is_owned_by(&self, booking_id: Uuid) -> bool {
        self.booking_id == Some(booking_id)
    }

    /// `held`/`booked` carry an owner, `available` does not.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            SeatStatus::Available => self.booking_id.is_none() && self.hold_expires_at.is_none(),
            SeatStatus::Held => self.booking_id.is_some() && self.hold_expires_at.is_some(),
            SeatStatus::Booked => self.booking_id.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopPoint {
    pub name: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl StopPoint {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), location: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripStop {
    pub name: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    pub expected_arrival_time: Option<DateTime<Utc>>,
    pub expected_departure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub from: StopPoint,
    pub to: StopPoint,
    #[serde(default)]
    pub stops: Vec<TripStop>,
}

impl Route {
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: StopPoint::named(from),
            to: StopPoint::named(to),
            stops: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub company_id: Uuid,
    pub vehicle_type: String,
    pub rows: u32,
    pub cols: u32,
}

impl Vehicle {
    /// Seat numbers laid out row-major: `A01, A02, .. B01, ..`. Rows past
    /// `Z` continue as `AA, AB, ..`.
    pub fn seat_numbers(&self) -> Vec<String> {
        (0..self.rows)
            .flat_map(|row| {
                let label = row_label(row);
                (1..=self.cols).map(move |col| format!("{}{:02}", label, col))
            })
            .collect()
    }
}

/// Spreadsheet-style label for a zero-based row index.
fn row_label(row: u32) -> String {
    let mut n = row + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Input for creating a trip; every seat starts `available`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub company_id: Uuid,
    pub vehicle_id: Uuid,
    pub route: Route,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price: i64,
    pub seat_numbers: Vec<String>,
}

/// One scheduled departure with its own seat inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub company_id: Uuid,
    pub vehicle_id: Uuid,
    pub route: Route,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Per-seat price in minor currency units.
    pub price: i64,
    pub status: TripStatus,
    pub seats: SeatLedger,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn create(input: NewTrip) -> Result<Self, LedgerError> {
        if input.price < 0 {
            return Err(LedgerError::InvalidTrip("price must not be negative".to_string()));
        }
        if input.arrival_time < input.departure_time {
            return Err(LedgerError::InvalidTrip("arrival precedes departure".to_string()));
        }
        let seats = SeatLedger::new(input.seat_numbers.into_iter().map(Seat::available).collect())?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            company_id: input.company_id,
            vehicle_id: input.vehicle_id,
            route: input.route,
            departure_time: input.departure_time,
            arrival_time: input.arrival_time,
            price: input.price,
            status: TripStatus::Scheduled,
            seats,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_bookable(&self) -> bool {
        self.status == TripStatus::Scheduled
    }

    /// Case-insensitive substring match on the terminal stop names and a
    /// departure on the given UTC calendar day.
    pub fn matches_search(&self, origin: &str, destination: &str, date: NaiveDate) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.trim().to_lowercase())
        };
        self.status == TripStatus::Scheduled
            && contains(&self.route.from.name, origin)
            && contains(&self.route.to.name, destination)
            && self.departure_time.date_naive() == date
    }

    pub fn summary(&self) -> TripSummary {
        TripSummary {
            trip_id: self.id,
            origin: self.route.from.name.clone(),
            destination: self.route.to.name.clone(),
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            status: self.status,
        }
    }
}

/// Trip fields shown alongside a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripSummary {
    pub trip_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub status: TripStatus,
}
