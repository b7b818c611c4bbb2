use async_trait::async_trait;
use busline_catalog::{
    ClaimOutcome, LedgerError, ReleaseOutcome, Route, Seat, SeatClaim, SeatLedger, SeatStatus, Trip,
};
use busline_core::repository::{StoreError, TripCatalog};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error};
use uuid::Uuid;

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    company_id: Uuid,
    vehicle_id: Uuid,
    route: Json<Route>,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    price: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    trip_id: Uuid,
    seat_number: String,
    status: String,
    booking_id: Option<Uuid>,
    hold_expires_at: Option<DateTime<Utc>>,
}

impl SeatRow {
    fn into_seat(self) -> Result<Seat, StoreError> {
        Ok(Seat {
            seat_number: self.seat_number,
            status: self.status.parse()?,
            booking_id: self.booking_id,
            hold_expires_at: self.hold_expires_at,
        })
    }
}

impl TripRow {
    fn into_trip(self, seats: Vec<Seat>) -> Result<Trip, StoreError> {
        Ok(Trip {
            id: self.id,
            company_id: self.company_id,
            vehicle_id: self.vehicle_id,
            route: self.route.0,
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            price: self.price,
            status: self.status.parse()?,
            seats: SeatLedger::new(seats)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_TRIP: &str = r#"
    SELECT id, company_id, vehicle_id, route, departure_time, arrival_time, price, status, created_at, updated_at
    FROM trips WHERE id = $1
"#;

const SEARCH_TRIPS: &str = r#"
    SELECT id, company_id, vehicle_id, route, departure_time, arrival_time, price, status, created_at, updated_at
    FROM trips
    WHERE status = 'scheduled'
      AND origin ILIKE $1
      AND destination ILIKE $2
      AND departure_time >= $3 AND departure_time < $4
    ORDER BY departure_time
"#;

const SELECT_SEATS: &str = r#"
    SELECT trip_id, seat_number, status, booking_id, hold_expires_at
    FROM trip_seats WHERE trip_id = ANY($1)
    ORDER BY trip_id, position
"#;

// Row locks are taken in seat-number order so concurrent multi-seat claims
// cannot deadlock each other.
const LOCK_SEATS: &str = r#"
    SELECT trip_id, seat_number, status, booking_id, hold_expires_at
    FROM trip_seats WHERE trip_id = $1 AND seat_number = ANY($2)
    ORDER BY seat_number
    FOR UPDATE
"#;

const SEAT_EXISTS: &str = r#"
    SELECT EXISTS(SELECT 1 FROM trip_seats WHERE trip_id = $1 AND seat_number = $2)
"#;

const HOLD_SEAT: &str = r#"
    UPDATE trip_seats SET status = 'held', booking_id = $3, hold_expires_at = $4
    WHERE trip_id = $1 AND seat_number = $2
      AND (status = 'available' OR (status = 'held' AND hold_expires_at <= $5))
"#;

const BOOK_SEAT: &str = r#"
    UPDATE trip_seats SET status = 'booked', hold_expires_at = NULL
    WHERE trip_id = $1 AND seat_number = $2 AND status = 'held' AND booking_id = $3
"#;

const RELEASE_SEAT: &str = r#"
    UPDATE trip_seats SET status = 'available', booking_id = NULL, hold_expires_at = NULL
    WHERE trip_id = $1 AND seat_number = $2 AND status = 'held' AND booking_id = $3
"#;

const RELEASE_HELD_SEATS: &str = r#"
    UPDATE trip_seats SET status = 'available', booking_id = NULL, hold_expires_at = NULL
    WHERE trip_id = $1 AND seat_number = ANY($2) AND status = 'held' AND booking_id = $3
"#;

/// Runs the conditional UPDATE for one seat and returns the affected row count.
async fn apply_claim<'e, E>(
    executor: E,
    trip_id: Uuid,
    seat_number: &str,
    claim: &SeatClaim,
    now: DateTime<Utc>,
) -> Result<u64, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    claim.validate()?;
    let query = match (claim.from, claim.to) {
        (SeatStatus::Available, SeatStatus::Held) => sqlx::query(HOLD_SEAT)
            .bind(trip_id)
            .bind(seat_number)
            .bind(claim.booking_id)
            .bind(claim.hold_until)
            .bind(now),
        (SeatStatus::Held, SeatStatus::Booked) => sqlx::query(BOOK_SEAT)
            .bind(trip_id)
            .bind(seat_number)
            .bind(claim.booking_id),
        (SeatStatus::Held, SeatStatus::Available) => sqlx::query(RELEASE_SEAT)
            .bind(trip_id)
            .bind(seat_number)
            .bind(claim.booking_id),
        (from, to) => return Err(LedgerError::IllegalTransition { from, to }.into()),
    };
    Ok(query.execute(executor).await?.rows_affected())
}

/// `%needle%` with LIKE metacharacters escaped.
fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl PgTripRepository {
    async fn load_seats(&self, trip_ids: Vec<Uuid>) -> Result<HashMap<Uuid, Vec<Seat>>, StoreError> {
        let rows: Vec<SeatRow> = sqlx::query_as(SELECT_SEATS)
            .bind(trip_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_trip: HashMap<Uuid, Vec<Seat>> = HashMap::new();
        for row in rows {
            let trip_id = row.trip_id;
            by_trip.entry(trip_id).or_default().push(row.into_seat()?);
        }
        Ok(by_trip)
    }
}

#[async_trait]
impl TripCatalog for PgTripRepository {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError> {
        let row: Option<TripRow> = sqlx::query_as(SELECT_TRIP)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut seats = self.load_seats(vec![id]).await?;
        let trip = row.into_trip(seats.remove(&id).unwrap_or_default())?;
        Ok(Some(trip))
    }

    async fn search_trips(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Trip>, StoreError> {
        let day_start = date.and_hms_opt(0, 0, 0).ok_or("invalid search date")?.and_utc();
        let day_end = day_start + Duration::days(1);

        let rows: Vec<TripRow> = sqlx::query_as(SEARCH_TRIPS)
            .bind(contains_pattern(origin))
            .bind(contains_pattern(destination))
            .bind(day_start)
            .bind(day_end)
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut seats = self.load_seats(rows.iter().map(|r| r.id).collect()).await?;
        rows.into_iter()
            .map(|row| {
                let trip_seats = seats.remove(&row.id).unwrap_or_default();
                row.into_trip(trip_seats)
            })
            .collect()
    }

    async fn create_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO trips (id, company_id, vehicle_id, origin, destination, route, departure_time, arrival_time, price, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(trip.id)
        .bind(trip.company_id)
        .bind(trip.vehicle_id)
        .bind(&trip.route.from.name)
        .bind(&trip.route.to.name)
        .bind(Json(trip.route.clone()))
        .bind(trip.departure_time)
        .bind(trip.arrival_time)
        .bind(trip.price)
        .bind(trip.status.as_str())
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, seat) in trip.seats.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO trip_seats (trip_id, seat_number, position, status, booking_id, hold_expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(trip.id)
            .bind(&seat.seat_number)
            .bind(position as i32)
            .bind(seat.status.as_str())
            .bind(seat.booking_id)
            .bind(seat.hold_expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn try_claim_seat(
        &self,
        trip_id: Uuid,
        seat_number: &str,
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let affected = apply_claim(&self.pool, trip_id, seat_number, claim, now).await?;
        if affected == 1 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar(SEAT_EXISTS)
            .bind(trip_id)
            .bind(seat_number)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(LedgerError::UnknownSeat(seat_number.to_string()).into());
        }
        Ok(false)
    }

    async fn claim_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        claim: &SeatClaim,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        claim.validate()?;
        if seat_numbers.is_empty() {
            return Err(LedgerError::NoSeats.into());
        }
        let mut seen = HashSet::new();
        for number in seat_numbers {
            if !seen.insert(number.as_str()) {
                return Err(LedgerError::DuplicateSeat(number.clone()).into());
            }
        }

        let mut tx = self.pool.begin().await?;
        let rows: Vec<SeatRow> = sqlx::query_as(LOCK_SEATS)
            .bind(trip_id)
            .bind(seat_numbers.to_vec())
            .fetch_all(&mut *tx)
            .await?;

        let mut locked = HashMap::with_capacity(rows.len());
        for row in rows {
            let seat = row.into_seat()?;
            locked.insert(seat.seat_number.clone(), seat);
        }

        for number in seat_numbers {
            let Some(seat) = locked.get(number) else {
                tx.rollback().await?;
                return Err(LedgerError::UnknownSeat(number.clone()).into());
            };
            if !claim.matches(seat, now) {
                tx.rollback().await?;
                debug!("Claim on trip {} rejected at seat {}", trip_id, number);
                return Ok(ClaimOutcome::Rejected {
                    seat_number: number.clone(),
                });
            }
        }

        for number in seat_numbers {
            let affected = apply_claim(&mut *tx, trip_id, number, claim, now).await?;
            if affected != 1 {
                error!("Seat {} on trip {} changed while locked", number, trip_id);
                tx.rollback().await?;
                return Err(format!("seat {} changed while locked", number).into());
            }
        }

        tx.commit().await?;
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
    ) -> Result<ReleaseOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<SeatRow> = sqlx::query_as(LOCK_SEATS)
            .bind(trip_id)
            .bind(seat_numbers.to_vec())
            .fetch_all(&mut *tx)
            .await?;

        let committed = rows
            .iter()
            .any(|r| r.status == SeatStatus::Booked.as_str() && r.booking_id == Some(booking_id));
        if committed {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::Committed);
        }

        let result = sqlx::query(RELEASE_HELD_SEATS)
            .bind(trip_id)
            .bind(seat_numbers.to_vec())
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(ReleaseOutcome::Released {
            count: result.rows_affected() as usize,
        })
    }
}
