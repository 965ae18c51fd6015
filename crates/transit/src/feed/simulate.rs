//! Synthetic vehicle positions for offline mode.
//!
//! When no live feed is available the map still needs vehicles: every trip
//! is materialized as one simulated vehicle per scheduled stop, placed at
//! the stop's coordinates. Vehicle ids are prefixed `SIM-` so downstream
//! consumers can tell simulated traffic from live traffic.

use std::collections::HashMap;
use std::sync::Arc;

use crate::identifiers::{StopIdentifier, VehicleIdentifier};
use crate::models::{Stop, StopTime, Trip, VehiclePosition};

pub fn simulate_all_trips(
    trips: &[Arc<Trip>],
    stop_times: &[StopTime],
    stops: &HashMap<StopIdentifier, Arc<Stop>>,
) -> Vec<VehiclePosition> {
    let mut by_trip: HashMap<&str, Vec<&StopTime>> = HashMap::new();
    for st in stop_times {
        by_trip.entry(st.trip_id.as_str()).or_default().push(st);
    }
    for calls in by_trip.values_mut() {
        calls.sort_by_key(|st| st.stop_sequence);
    }

    let mut vehicles = Vec::new();
    for trip in trips {
        let Some(calls) = by_trip.get(trip.id.as_str()) else {
            continue;
        };
        for st in calls {
            let Some(stop) = stops.get(&st.stop_id).filter(|s| s.has_location()) else {
                continue;
            };
            vehicles.push(VehiclePosition {
                trip_id: Some(trip.id.clone()),
                vehicle_id: Some(VehicleIdentifier::new(format!("SIM-{}", trip.id))),
                position: stop.location,
                stop_sequence: st.stop_sequence as i32,
            });
        }
    }
    vehicles
}
