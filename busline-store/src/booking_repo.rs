use async_trait::async_trait;
use busline_core::repository::{BookingStore, HoldCursor, StoreError};
use busline_order::{Booking, BookingError, BookingStatus, BookingUpdate, PassengerSeat};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    trip_id: Uuid,
    status: String,
    hold_expires_at: Option<DateTime<Utc>>,
    payment_status: String,
    payment_method: Option<String>,
    payment_transaction_id: Option<String>,
    total_amount: i64,
    currency: String,
    passengers: Json<Vec<PassengerSeat>>,
    ticket_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = BookingError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            trip_id: row.trip_id,
            status: row.status.parse()?,
            hold_expires_at: row.hold_expires_at,
            payment_status: row.payment_status.parse()?,
            payment_method: row.payment_method,
            payment_transaction_id: row.payment_transaction_id,
            total_amount: row.total_amount,
            currency: row.currency,
            passengers: row.passengers.0,
            ticket_code: row.ticket_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, user_id, trip_id, status, hold_expires_at, payment_status, payment_method, \
     payment_transaction_id, total_amount, currency, passengers, ticket_code, created_at, updated_at";

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, StoreError> {
    rows.into_iter()
        .map(|row| Booking::try_from(row).map_err(StoreError::from))
        .collect()
}

/// Keeps only the expected statuses from which `update` is a legal move.
fn legal_sources(expected: &[BookingStatus], update: &BookingUpdate) -> Vec<String> {
    expected
        .iter()
        .filter(|s| (**s == update.status && s.is_open()) || s.can_transition_to(update.status))
        .map(|s| s.as_str().to_string())
        .collect()
}

#[async_trait]
impl BookingStore for PgBookingRepository {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, trip_id, status, hold_expires_at, payment_status, payment_method,
                                  payment_transaction_id, total_amount, currency, passengers, ticket_code, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(booking.trip_id)
        .bind(booking.status.as_str())
        .bind(booking.hold_expires_at)
        .bind(booking.payment_status.as_str())
        .bind(&booking.payment_method)
        .bind(&booking.payment_transaction_id)
        .bind(booking.total_amount)
        .bind(&booking.currency)
        .bind(Json(booking.passengers.clone()))
        .bind(&booking.ticket_code)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Booking::try_from).transpose()?)
    }

    async fn get_booking_by_ticket_code(&self, code: &str) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE ticket_code = $1", BOOKING_COLUMNS))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Booking::try_from).transpose()?)
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_bookings(rows)
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        expected: &[BookingStatus],
        update: &BookingUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let sources = legal_sources(expected, update);
        if sources.is_empty() {
            return Err(format!("no legal transition to {}", update.status.as_str()).into());
        }

        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $2,
                payment_status = COALESCE($3, payment_status),
                payment_method = COALESCE($4, payment_method),
                payment_transaction_id = COALESCE($5, payment_transaction_id),
                ticket_code = COALESCE($6, ticket_code),
                hold_expires_at = CASE WHEN $7 THEN NULL ELSE hold_expires_at END,
                updated_at = $8
            WHERE id = $1 AND status = ANY($9)
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.payment_status.map(|p| p.as_str()))
        .bind(update.payment_method.as_deref())
        .bind(update.payment_transaction_id.as_deref())
        .bind(update.ticket_code.as_deref())
        .bind(update.status.is_terminal())
        .bind(now)
        .bind(sources)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_stale_holds(
        &self,
        now: DateTime<Utc>,
        after: Option<HoldCursor>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        let (after_expiry, after_id) = after.unzip();
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings \
             WHERE status IN ('pending', 'held') AND hold_expires_at <= $1 \
               AND ($2::timestamptz IS NULL OR (hold_expires_at, id) > ($2, $3)) \
             ORDER BY hold_expires_at, id LIMIT $4",
            BOOKING_COLUMNS
        ))
        .bind(now)
        .bind(after_expiry)
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        into_bookings(rows)
    }
}
