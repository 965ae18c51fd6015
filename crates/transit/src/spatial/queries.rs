//! Spatial query utilities for distance calculations.
//!
//! Uses Haversine formula for accurate distances on Earth's surface.

use geo::{HaversineDistance, Point};

/// Calculate Haversine distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

/// Convert meters to degrees at equator (for bounding box pre-filters)
pub fn meters_to_degrees_approx(meters: f64) -> f64 {
    meters / 111_320.0
}
