use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use busline_catalog::{Route, SeatStatus, Trip, TripStatus};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub from: String,
    pub to: String,
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct SeatView {
    pub seat_number: String,
    pub status: SeatStatus,
}

/// Public trip view. Seat owners are never exposed and lapsed holds show as free.
#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub vehicle_id: Uuid,
    pub route: Route,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price: i64,
    pub status: TripStatus,
    pub available_seats: usize,
    pub seats: Vec<SeatView>,
}

impl TripResponse {
    pub fn new(trip: Trip, now: DateTime<Utc>) -> Self {
        let seats = trip
            .seats
            .iter()
            .map(|s| SeatView {
                seat_number: s.seat_number.clone(),
                status: if s.is_claimable(now) { SeatStatus::Available } else { s.status },
            })
            .collect();
        Self {
            id: trip.id,
            company_id: trip.company_id,
            vehicle_id: trip.vehicle_id,
            available_seats: trip.seats.available_count(now),
            route: trip.route,
            departure_time: trip.departure_time,
            arrival_time: trip.arrival_time,
            price: trip.price,
            status: trip.status,
            seats,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/search", get(search_trips))
        .route("/v1/trips/{id}", get(get_trip))
        .route("/v1/trips/{id}/seats/stream", get(seat_stream))
}

async fn search_trips(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<TripResponse>>, AppError> {
    let trips = state
        .catalog
        .search_trips(&query.from, &query.to, &query.date)
        .await?;
    let now = state.reservations.now();
    Ok(Json(trips.into_iter().map(|t| TripResponse::new(t, now)).collect()))
}

async fn get_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TripResponse>, AppError> {
    let trip = state.catalog.get_trip(&id).await?;
    Ok(Json(TripResponse::new(trip, state.reservations.now())))
}

/// Server-sent seat events for one trip.
async fn seat_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let trip_id = state.catalog.get_trip(&id).await?.id;
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |msg| async move {
        match msg {
            Ok(event) if event.trip_id() == trip_id => {
                Event::default().event(event.kind()).json_data(&event).ok().map(Ok)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Seat stream for trip {} lagged: {}", trip_id, e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
