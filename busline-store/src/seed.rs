use busline_catalog::{Company, GeoPoint, NewTrip, Route, StopPoint, Trip, TripStop, Vehicle};
use busline_core::repository::{StoreError, TripCatalog};
use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

struct DemoRoute {
    from: (&'static str, f64, f64),
    to: (&'static str, f64, f64),
    via: Option<&'static str>,
    hours: i64,
    price: i64,
}

const ROUTES: [DemoRoute; 4] = [
    DemoRoute { from: ("Sài Gòn", 10.8231, 106.6297), to: ("Đà Lạt", 11.9404, 108.4583), via: Some("Bảo Lộc"), hours: 7, price: 300_000 },
    DemoRoute { from: ("Sài Gòn", 10.8231, 106.6297), to: ("Nha Trang", 12.2388, 109.1967), via: None, hours: 8, price: 320_000 },
    DemoRoute { from: ("Hà Nội", 21.0285, 105.8542), to: ("Sa Pa", 22.3364, 103.8438), via: Some("Lào Cai"), hours: 6, price: 350_000 },
    DemoRoute { from: ("Hà Nội", 21.0285, 105.8542), to: ("Hải Phòng", 20.8449, 106.6881), via: None, hours: 2, price: 120_000 },
];

fn stop(name: &str, lat: f64, lng: f64) -> StopPoint {
    StopPoint {
        name: name.to_string(),
        location: Some(GeoPoint { lat, lng }),
    }
}

/// One operator with a sleeper coach and a limousine van.
pub fn demo_fleet() -> (Company, Vec<Vehicle>) {
    let company = Company {
        id: Uuid::new_v4(),
        name: "Busline Demo Coaches".to_string(),
        code: "DEMO".to_string(),
        is_active: true,
    };
    let vehicles = vec![
        Vehicle {
            id: Uuid::new_v4(),
            company_id: company.id,
            vehicle_type: "Sleeper 40".to_string(),
            rows: 10,
            cols: 4,
        },
        Vehicle {
            id: Uuid::new_v4(),
            company_id: company.id,
            vehicle_type: "Limousine 9".to_string(),
            rows: 3,
            cols: 3,
        },
    ];
    (company, vehicles)
}

/// Morning and evening departures on every demo route for the day after `now`.
pub fn demo_trips(now: DateTime<Utc>) -> Vec<NewTrip> {
    let (company, vehicles) = demo_fleet();
    let day = (now + Duration::days(1)).date_naive();

    let mut trips = Vec::new();
    for (i, route) in ROUTES.iter().enumerate() {
        for (slot, hour) in [1u32, 13].into_iter().enumerate() {
            let Some(departure) = day.and_hms_opt(hour, 0, 0).map(|t| t.and_utc()) else {
                continue;
            };
            let arrival = departure + Duration::hours(route.hours);
            let vehicle = &vehicles[(i + slot) % vehicles.len()];

            let stops = route
                .via
                .map(|name| {
                    let midpoint = departure + Duration::minutes(route.hours * 30);
                    vec![TripStop {
                        name: name.to_string(),
                        location: None,
                        expected_arrival_time: Some(midpoint),
                        expected_departure_time: Some(midpoint + Duration::minutes(15)),
                    }]
                })
                .unwrap_or_default();

            trips.push(NewTrip {
                company_id: company.id,
                vehicle_id: vehicle.id,
                route: Route {
                    from: stop(route.from.0, route.from.1, route.from.2),
                    to: stop(route.to.0, route.to.1, route.to.2),
                    stops,
                },
                departure_time: departure,
                arrival_time: arrival,
                price: route.price,
                seat_numbers: vehicle.seat_numbers(),
            });
        }
    }
    trips
}

pub async fn seed_demo_trips(catalog: &dyn TripCatalog, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let mut created = 0;
    for input in demo_trips(now) {
        let trip = Trip::create(input)?;
        catalog.create_trip(&trip).await?;
        created += 1;
    }
    info!("Seeded {} demo trips", created);
    Ok(created)
}
