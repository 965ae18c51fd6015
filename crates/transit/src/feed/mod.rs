//! Real-time feed decoding and offline simulation.

pub mod decode;
pub mod simulate;

pub use decode::{
    decode_trip_updates, decode_trip_updates_bytes, decode_vehicle_positions,
    decode_vehicle_positions_bytes, feed_timestamp,
};
pub use simulate::simulate_all_trips;
