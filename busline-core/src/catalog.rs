use busline_catalog::{NewTrip, Trip};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

use crate::identity::parse_id;
use crate::repository::TripCatalog;
use crate::{CoreError, CoreResult, Entity};

/// Read and administrative access to trips.
#[derive(Clone)]
pub struct CatalogService {
    trips: Arc<dyn TripCatalog>,
}

impl CatalogService {
    pub fn new(trips: Arc<dyn TripCatalog>) -> Self {
        Self { trips }
    }

    pub async fn get_trip(&self, trip_id: &str) -> CoreResult<Trip> {
        let id = parse_id(Entity::Trip, trip_id)?;
        self.trips
            .get_trip(id)
            .await
            .map_err(|e| CoreError::InternalError(format!("failed to load trip: {}", e)))?
            .ok_or(CoreError::NotFound(Entity::Trip))
    }

    /// `date` is a `YYYY-MM-DD` calendar day in UTC.
    pub async fn search_trips(&self, origin: &str, destination: &str, date: &str) -> CoreResult<Vec<Trip>> {
        if origin.trim().is_empty() || destination.trim().is_empty() {
            return Err(CoreError::InvalidInput("origin and destination are required".to_string()));
        }
        let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| CoreError::InvalidInput(format!("invalid date, expected YYYY-MM-DD: {}", date)))?;

        let mut trips = self
            .trips
            .search_trips(origin.trim(), destination.trim(), day)
            .await
            .map_err(|e| CoreError::InternalError(format!("trip search failed: {}", e)))?;
        trips.sort_by_key(|t| t.departure_time);
        Ok(trips)
    }

    pub async fn create_trip(&self, input: NewTrip) -> CoreResult<Trip> {
        let trip = Trip::create(input).map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        self.trips
            .create_trip(&trip)
            .await
            .map_err(|e| CoreError::InternalError(format!("failed to save trip: {}", e)))?;
        info!(
            "Trip {} created: {} -> {} with {} seats",
            trip.id,
            trip.route.from.name,
            trip.route.to.name,
            trip.seats.len()
        );
        Ok(trip)
    }
}
