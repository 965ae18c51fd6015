//! Spatial indexing and query utilities.

pub mod index;
pub mod queries;

pub use index::StopSpatialIndex;
pub use queries::haversine_distance;
