//! Trip-identifier reconciliation between static and real-time data.

pub mod identity;
pub mod registry;
pub mod stop_index;

pub use registry::TripRegistry;
pub use stop_index::StopTripIndex;
