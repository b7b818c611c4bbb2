use axum::{extract::State, http::StatusCode, routing::post, Extension, Json, Router};
use busline_catalog::NewTrip;

use crate::middleware::Claims;
use crate::trips::TripResponse;
use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/trips", post(create_trip))
}

async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewTrip>,
) -> Result<(StatusCode, Json<TripResponse>), AppError> {
    let trip = state.catalog.create_trip(req).await?;
    tracing::info!("Admin {} created trip {}", claims.sub, trip.id);
    Ok((StatusCode::CREATED, Json(TripResponse::new(trip, state.reservations.now()))))
}
