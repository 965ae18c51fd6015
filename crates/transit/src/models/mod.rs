//! Transit data models and types.

pub mod calendar;
pub mod types;

// Re-exports for convenience
pub use calendar::{parse_gtfs_date, CalendarException, ExceptionKind, ServiceCalendar};
pub use types::{
    parse_gtfs_time, ConnectionMode, DirectionId, Result, Stop, StopTime, TransitError, Trip,
    TripUpdateRecord, VehiclePosition,
};
