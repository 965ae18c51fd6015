//! # roma-transit
//!
//! Real-time transit matching and arrival prediction over a static GTFS
//! schedule and a GTFS-RT feed.
//!
//! ## Features
//!
//! - **Identifier reconciliation**: permissive variant matching bridges the
//!   naming drift between static tables and real-time feeds; strict
//!   resolution keeps user-facing route labels honest
//! - **Defensive feed decoding**: epoch-unit detection, micro-degree
//!   coordinates and skipped-stop handling stay behind one boundary
//! - **Snapshot semantics**: predictions are replaced wholesale every
//!   refresh cycle, so vanished trips never leak stale data
//! - **Per-route aggregation**: one most-imminent arrival per route, live
//!   predictions bounded by plausibility windows, schedule fallback
//!   otherwise
//! - **Spatial queries**: R-tree radius and nearest-stop lookups
//!
//! ## Example
//!
//! ```
//! use roma_transit::prelude::*;
//! use chrono::TimeZone;
//!
//! let stops = vec![Stop::new("S1", "Piazza Venezia", 41.8958, 12.4823)];
//! let trips = vec![Trip {
//!     id: TripIdentifier::new("T1"),
//!     route_id: RouteIdentifier::new("64"),
//!     service_id: ServiceIdentifier::new(""),
//!     headsign: "Termini".into(),
//!     short_name: "".into(),
//!     direction: DirectionId::Outbound,
//!     shape_id: None,
//! }];
//! let stop_times = vec![StopTime::new("T1", "S1", 1, parse_gtfs_time("08:00:00"))];
//!
//! let engine = TransitEngine::with_config(
//!     stops,
//!     trips,
//!     stop_times,
//!     Vec::new(),
//!     ArrivalConfig { timezone: chrono_tz::UTC, ..Default::default() },
//! );
//!
//! let reference = chrono::Utc
//!     .with_ymd_and_hms(2026, 3, 2, 7, 55, 0)
//!     .unwrap()
//!     .timestamp();
//! let arrivals = engine.compute_arrivals_at(
//!     &StopIdentifier::new("S1"),
//!     ConnectionMode::Offline,
//!     reference,
//!     reference,
//! );
//! assert_eq!(arrivals, vec!["64 - 5 min (statico)".to_string()]);
//! ```

pub mod arrivals;
pub mod engine;
pub mod feed;
pub mod identifiers;
pub mod matching;
pub mod models;
pub mod realtime;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::arrivals::{ArrivalAggregator, ArrivalConfig, NO_UPCOMING_ARRIVALS};
    pub use crate::engine::TransitEngine;
    pub use crate::identifiers::*;
    pub use crate::matching::{StopTripIndex, TripRegistry};
    pub use crate::models::*;
    pub use crate::realtime::{FeedSource, RefreshConfig, RefreshTask, RealtimeSnapshotStore};
}

pub use prelude::*;
