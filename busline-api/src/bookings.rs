use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use busline_core::{BookingDetails, PassengerInput, ReservationReceipt};
use busline_order::Booking;
use serde::{Deserialize, Serialize};

use crate::middleware::Claims;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trip_id: String,
    pub passengers: Vec<PassengerInput>,
}

#[derive(Debug, Deserialize)]
pub struct MockPaymentRequest {
    pub booking_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub message: String,
    pub booking: Booking,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/payment/mock", post(mock_payment))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/tickets/{code}", get(get_ticket))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ReservationReceipt>), AppError> {
    let receipt = state
        .reservations
        .create_reservation(&claims.sub, &req.trip_id, req.passengers)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.reservations.list_bookings(&claims.sub).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.reservations.get_booking_details(&id, &claims.sub).await?))
}

async fn mock_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MockPaymentRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let booking = state
        .reservations
        .confirm_payment(&req.booking_id, &claims.sub)
        .await?;
    Ok(Json(PaymentResponse {
        message: "Payment successful".to_string(),
        booking,
    }))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.reservations.cancel_reservation(&id, &claims.sub).await?))
}

async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.reservations.get_ticket(&code, &claims.sub).await?))
}
