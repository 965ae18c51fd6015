//! Core data types for the static schedule and the real-time feed.

use std::sync::Arc;

use geo::Point;

use crate::identifiers::*;

// ============================================================================
// Enums
// ============================================================================

/// Trip direction (0 = outbound, 1 = inbound per GTFS)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DirectionId {
    Outbound = 0,
    Inbound = 1,
}

impl DirectionId {
    pub fn from_gtfs(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Outbound),
            1 => Some(Self::Inbound),
            _ => None,
        }
    }
}

/// Whether arrivals are served from the live feed or from the static
/// schedule alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    Online,
    Offline,
}

// ============================================================================
// Static schedule records
// ============================================================================

/// A boarding location, or a synthetic "line" entry used for search.
///
/// Line entries carry a route+headsign label instead of a place: they have
/// zero coordinates, a `line-` prefixed identifier, and must never take part
/// in spatial indexing or distance computations.
#[derive(Clone, Debug)]
pub struct Stop {
    pub id: StopIdentifier,
    pub name: Arc<str>,
    pub location: Point,
    line_entry: bool,
}

impl Stop {
    pub fn new(id: impl Into<StopIdentifier>, name: impl AsRef<str>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            name: name.as_ref().into(),
            location: Point::new(lon, lat),
            line_entry: false,
        }
    }

    /// Synthetic search entry for a route+headsign pair.
    pub fn line_entry(label: impl AsRef<str>) -> Self {
        let label = label.as_ref();
        Self {
            id: StopIdentifier::new(format!("line-{}", label.replace(' ', ""))),
            name: label.into(),
            location: Point::new(0.0, 0.0),
            line_entry: true,
        }
    }

    pub fn is_line_entry(&self) -> bool {
        self.line_entry
    }

    /// True when the stop carries real coordinates.
    pub fn has_location(&self) -> bool {
        !self.line_entry && (self.location.x() != 0.0 || self.location.y() != 0.0)
    }

    pub fn lat(&self) -> f64 {
        self.location.y()
    }

    pub fn lon(&self) -> f64 {
        self.location.x()
    }
}

/// A single vehicle run in the static schedule. Immutable once loaded;
/// identity is the trip id.
#[derive(Clone, Debug)]
pub struct Trip {
    pub id: TripIdentifier,
    pub route_id: RouteIdentifier,
    pub service_id: ServiceIdentifier,
    pub headsign: Arc<str>,
    pub short_name: Arc<str>,
    pub direction: DirectionId,
    pub shape_id: Option<Arc<str>>,
}

/// A scheduled call of a trip at a stop.
///
/// The arrival is stored as seconds since midnight of the service day and,
/// per GTFS, may exceed 24 hours for trips running past midnight. It may be
/// absent for timepoint-less rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopTime {
    pub trip_id: TripIdentifier,
    pub stop_id: StopIdentifier,
    pub stop_sequence: u32,
    pub arrival: Option<u32>,
}

impl StopTime {
    pub fn new(
        trip_id: impl Into<TripIdentifier>,
        stop_id: impl Into<StopIdentifier>,
        stop_sequence: u32,
        arrival: Option<u32>,
    ) -> Self {
        Self {
            trip_id: trip_id.into(),
            stop_id: stop_id.into(),
            stop_sequence,
            arrival,
        }
    }
}

/// Parse a GTFS `HH:MM:SS` (or `H:MM:SS`) field into seconds since midnight.
///
/// Hours may exceed 23 for past-midnight service. Returns `None` for empty
/// or garbled fields; a malformed row is skipped upstream, never fatal.
pub fn parse_gtfs_time(field: &str) -> Option<u32> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }

    let mut parts = field.splitn(3, ':');
    let h: u32 = parts.next()?.trim().parse().ok()?;
    let m: u32 = parts.next()?.trim().parse().ok()?;
    let s: u32 = parts.next().unwrap_or("0").trim().parse().ok()?;

    if m > 59 || s > 59 {
        return None;
    }
    Some(h * 3600 + m * 60 + s)
}

// ============================================================================
// Real-time feed records
// ============================================================================

/// One decoded per-stop prediction from the trip-update feed.
///
/// The trip id is kept exactly as it appeared in the feed; matching against
/// the static schedule happens later through `matching::identity` variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TripUpdateRecord {
    pub trip_id: TripIdentifier,
    pub stop_id: StopIdentifier,
    /// Predicted arrival, seconds since the Unix epoch (UTC), always > 0.
    pub arrival_epoch: i64,
}

/// A decoded vehicle position from the vehicle-positions feed.
#[derive(Clone, Debug)]
pub struct VehiclePosition {
    pub trip_id: Option<TripIdentifier>,
    pub vehicle_id: Option<VehicleIdentifier>,
    pub position: Point,
    /// Current stop sequence, -1 when the feed did not report one.
    pub stop_sequence: i32,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("feed decode failed: {0}")]
    FeedDecode(#[from] prost::DecodeError),

    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gtfs_time() {
        assert_eq!(parse_gtfs_time("08:00:00"), Some(8 * 3600));
        assert_eq!(parse_gtfs_time("8:05:30"), Some(8 * 3600 + 5 * 60 + 30));
        // Past-midnight service keeps counting
        assert_eq!(parse_gtfs_time("25:30:00"), Some(91_800));
        assert_eq!(parse_gtfs_time(""), None);
        assert_eq!(parse_gtfs_time("  "), None);
        assert_eq!(parse_gtfs_time("8:61:00"), None);
        assert_eq!(parse_gtfs_time("abc"), None);
    }

    #[test]
    fn test_line_entry_is_not_geographic() {
        let line = Stop::line_entry("64 - Termini");
        assert!(line.is_line_entry());
        assert!(!line.has_location());
        assert_eq!(line.id.as_str(), "line-64-Termini");
        assert_eq!(&*line.name, "64 - Termini");

        let stop = Stop::new("70115", "Piazza Venezia", 41.8958, 12.4823);
        assert!(!stop.is_line_entry());
        assert!(stop.has_location());
        assert!((stop.lat() - 41.8958).abs() < 1e-9);
    }
}
