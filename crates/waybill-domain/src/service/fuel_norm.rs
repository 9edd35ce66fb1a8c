//! Fuel norm calculation

use crate::model::VehicleProfile;

/// Flat surcharge applied to the norm on days below freezing
pub const COLD_WEATHER_PENALTY: f64 = 0.05;

/// Fuel a vehicle is expected to burn over one day.
///
/// `km_norm = distance / 100 × consumption_per_100km`, plus
/// `trip_count × trip_fuel_consumption`. With `weather_enabled` and a known
/// temperature below zero the total grows by [`COLD_WEATHER_PENALTY`].
/// An unknown temperature never applies the penalty.
pub fn compute_norm(
    distance_km: u32,
    trip_count: u32,
    temperature: Option<f64>,
    vehicle: &VehicleProfile,
    weather_enabled: bool,
) -> f64 {
    let per_100km = vehicle.fuel_consumption_per_100km.max(0.0);
    let per_trip = vehicle.trip_fuel_consumption.max(0.0);

    let km_norm = f64::from(distance_km) * per_100km / 100.0;
    let trip_norm = f64::from(trip_count) * per_trip;
    let mut total = km_norm + trip_norm;

    if weather_enabled && is_freezing(temperature) {
        total += total * COLD_WEATHER_PENALTY;
    }

    if total.is_finite() {
        total.max(0.0)
    } else {
        0.0
    }
}

fn is_freezing(temperature: Option<f64>) -> bool {
    matches!(temperature, Some(t) if t < 0.0)
}
