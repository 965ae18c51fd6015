//! Defensive decoding of GTFS-RT feed messages.
//!
//! Everything that knows about wire-format quirks lives here: skipped/no-data
//! relationships, millisecond-vs-second epochs, micro-degree coordinates,
//! stop ids recovered from stop sequences. Matching and aggregation code
//! downstream only ever sees clean `TripUpdateRecord`s and
//! `VehiclePosition`s.

use geo::Point;
use gtfs_realtime::trip_update::stop_time_update::ScheduleRelationship;
use gtfs_realtime::FeedMessage;
use prost::Message;
use tracing::debug;

use crate::identifiers::{StopIdentifier, TripIdentifier, VehicleIdentifier};
use crate::matching::StopTripIndex;
use crate::models::{Result, TripUpdateRecord, VehiclePosition};

/// Feed header timestamp, if the feed reported one, in epoch seconds.
pub fn feed_timestamp(feed: &FeedMessage) -> Option<i64> {
    feed.header.timestamp.map(|ts| ts as i64)
}

/// Normalize a raw feed time into epoch seconds.
///
/// Values that look like milliseconds (>= 10^12) are scaled down; values in
/// [10^9, 10^12) are taken as seconds; anything smaller is implausible and
/// rejected.
fn normalize_epoch(raw: i64) -> Option<i64> {
    if raw >= 1_000_000_000_000 {
        Some(raw / 1000)
    } else if raw >= 1_000_000_000 {
        Some(raw)
    } else {
        None
    }
}

/// Decode trip-update entities into per-stop prediction records.
///
/// Per stop-time update: skipped/no-data entries are excluded; an explicit
/// stop id is used when the static table knows it, otherwise the stop is
/// recovered from the stop sequence through `index`; arrival time is
/// preferred over departure. A record is emitted only when both a stop id
/// and a positive normalized epoch are available.
pub fn decode_trip_updates(feed: &FeedMessage, index: &StopTripIndex) -> Vec<TripUpdateRecord> {
    let mut records = Vec::new();

    for entity in &feed.entity {
        let Some(tu) = &entity.trip_update else {
            continue;
        };
        let Some(raw_trip_id) = tu.trip.trip_id.as_deref().map(str::trim) else {
            continue;
        };
        if raw_trip_id.is_empty() {
            continue;
        }

        for stu in &tu.stop_time_update {
            if matches!(
                stu.schedule_relationship(),
                ScheduleRelationship::Skipped | ScheduleRelationship::NoData
            ) {
                continue;
            }

            let mut stop_id = stu
                .stop_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(StopIdentifier::new);

            // Feed omitted the stop id (or sent one the schedule has never
            // heard of): recover it from the stop sequence.
            let unknown = stop_id
                .as_ref()
                .map(|id| !index.is_known_stop(id))
                .unwrap_or(true);
            if unknown {
                if let Some(seq) = stu.stop_sequence {
                    if let Some(mapped) = index.stop_id_for(raw_trip_id, seq) {
                        stop_id = Some(mapped);
                    }
                }
            }

            let raw_time = stu
                .arrival
                .as_ref()
                .and_then(|ev| ev.time)
                .or_else(|| stu.departure.as_ref().and_then(|ev| ev.time));

            let (Some(stop_id), Some(arrival_epoch)) =
                (stop_id, raw_time.and_then(normalize_epoch))
            else {
                continue;
            };

            records.push(TripUpdateRecord {
                trip_id: TripIdentifier::new(raw_trip_id),
                stop_id,
                arrival_epoch,
            });
        }
    }

    debug!(records = records.len(), "decoded trip updates");
    records
}

/// Decode raw protobuf bytes, then delegate to [`decode_trip_updates`].
pub fn decode_trip_updates_bytes(
    bytes: &[u8],
    index: &StopTripIndex,
) -> Result<Vec<TripUpdateRecord>> {
    let feed = FeedMessage::decode(bytes)?;
    Ok(decode_trip_updates(&feed, index))
}

/// Decode vehicle-position entities.
///
/// Coordinates outside the valid range are retried at micro-degree scale
/// (divided by 10^6); records that are still out of range, or that carry no
/// position at all, are dropped.
pub fn decode_vehicle_positions(feed: &FeedMessage) -> Vec<VehiclePosition> {
    let mut positions = Vec::new();

    for entity in &feed.entity {
        let Some(vp) = &entity.vehicle else {
            continue;
        };
        let Some(pos) = &vp.position else {
            continue;
        };

        let Some((lat, lon)) = normalize_coordinates(pos.latitude as f64, pos.longitude as f64)
        else {
            debug!(
                lat = pos.latitude,
                lon = pos.longitude,
                "vehicle position out of range, dropped"
            );
            continue;
        };

        let trip_id = vp
            .trip
            .as_ref()
            .and_then(|t| t.trip_id.as_deref())
            .filter(|s| !s.trim().is_empty())
            .map(TripIdentifier::new);
        let vehicle_id = vp
            .vehicle
            .as_ref()
            .and_then(|v| v.id.as_deref())
            .filter(|s| !s.trim().is_empty())
            .map(VehicleIdentifier::new);

        positions.push(VehiclePosition {
            trip_id,
            vehicle_id,
            position: Point::new(lon, lat),
            stop_sequence: vp.current_stop_sequence.map(|s| s as i32).unwrap_or(-1),
        });
    }

    debug!(positions = positions.len(), "decoded vehicle positions");
    positions
}

/// Decode raw protobuf bytes, then delegate to [`decode_vehicle_positions`].
pub fn decode_vehicle_positions_bytes(bytes: &[u8]) -> Result<Vec<VehiclePosition>> {
    let feed = FeedMessage::decode(bytes)?;
    Ok(decode_vehicle_positions(&feed))
}

fn coordinates_valid(lat: f64, lon: f64) -> bool {
    lat.abs() <= 90.0 && lon.abs() <= 180.0
}

fn normalize_coordinates(lat: f64, lon: f64) -> Option<(f64, f64)> {
    if coordinates_valid(lat, lon) {
        return Some((lat, lon));
    }
    // Some feeds encode micro-degrees
    let (lat, lon) = (lat / 1_000_000.0, lon / 1_000_000.0);
    coordinates_valid(lat, lon).then_some((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_realtime::trip_update::{StopTimeEvent, StopTimeUpdate};
    use gtfs_realtime::{
        FeedEntity, FeedHeader, Position, TripDescriptor, TripUpdate, VehicleDescriptor,
        VehiclePosition as FeedVehiclePosition,
    };

    use crate::models::StopTime;

    fn index() -> StopTripIndex {
        StopTripIndex::new([
            StopTime::new("0#4930-11", "S1", 1, Some(8 * 3600)),
            StopTime::new("0#4930-11", "S2", 2, Some(8 * 3600 + 300)),
        ])
    }

    fn feed(entities: Vec<FeedEntity>) -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".into(),
                timestamp: Some(1_750_000_000),
                ..Default::default()
            },
            entity: entities,
        }
    }

    fn trip_update(trip_id: &str, updates: Vec<StopTimeUpdate>) -> FeedEntity {
        FeedEntity {
            id: "e".into(),
            trip_update: Some(TripUpdate {
                trip: TripDescriptor {
                    trip_id: Some(trip_id.into()),
                    ..Default::default()
                },
                stop_time_update: updates,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn arrival_at(epoch: i64) -> Option<StopTimeEvent> {
        Some(StopTimeEvent {
            time: Some(epoch),
            ..Default::default()
        })
    }

    #[test]
    fn test_explicit_stop_id_and_arrival_preference() {
        let msg = feed(vec![trip_update(
            "0#4930-11",
            vec![StopTimeUpdate {
                stop_id: Some("S1".into()),
                arrival: arrival_at(1_750_000_060),
                departure: arrival_at(1_750_000_120),
                ..Default::default()
            }],
        )]);

        let records = decode_trip_updates(&msg, &index());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stop_id, StopIdentifier::new("S1"));
        // Arrival beats departure
        assert_eq!(records[0].arrival_epoch, 1_750_000_060);
        // Raw feed spelling preserved
        assert_eq!(records[0].trip_id.as_str(), "0#4930-11");
    }

    #[test]
    fn test_departure_fallback() {
        let msg = feed(vec![trip_update(
            "0#4930-11",
            vec![StopTimeUpdate {
                stop_id: Some("S1".into()),
                departure: arrival_at(1_750_000_120),
                ..Default::default()
            }],
        )]);

        let records = decode_trip_updates(&msg, &index());
        assert_eq!(records[0].arrival_epoch, 1_750_000_120);
    }

    #[test]
    fn test_stop_recovered_from_sequence() {
        // No stop id at all; the sequence plus a variant spelling resolves it
        let msg = feed(vec![trip_update(
            "4930_11",
            vec![StopTimeUpdate {
                stop_sequence: Some(2),
                arrival: arrival_at(1_750_000_060),
                ..Default::default()
            }],
        )]);

        let records = decode_trip_updates(&msg, &index());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stop_id, StopIdentifier::new("S2"));
    }

    #[test]
    fn test_unknown_explicit_stop_overridden_by_sequence() {
        let msg = feed(vec![trip_update(
            "0#4930-11",
            vec![StopTimeUpdate {
                stop_id: Some("garbage".into()),
                stop_sequence: Some(1),
                arrival: arrival_at(1_750_000_060),
                ..Default::default()
            }],
        )]);

        let records = decode_trip_updates(&msg, &index());
        assert_eq!(records[0].stop_id, StopIdentifier::new("S1"));
    }

    #[test]
    fn test_skipped_and_no_data_excluded() {
        let skipped = StopTimeUpdate {
            stop_id: Some("S1".into()),
            arrival: arrival_at(1_750_000_060),
            schedule_relationship: Some(ScheduleRelationship::Skipped as i32),
            ..Default::default()
        };
        let no_data = StopTimeUpdate {
            stop_id: Some("S2".into()),
            arrival: arrival_at(1_750_000_060),
            schedule_relationship: Some(ScheduleRelationship::NoData as i32),
            ..Default::default()
        };
        let msg = feed(vec![trip_update("0#4930-11", vec![skipped, no_data])]);

        assert!(decode_trip_updates(&msg, &index()).is_empty());
    }

    #[test]
    fn test_epoch_unit_normalization() {
        assert_eq!(normalize_epoch(1_750_000_000_000), Some(1_750_000_000));
        assert_eq!(normalize_epoch(1_750_000_000), Some(1_750_000_000));
        // Too small to be a live epoch
        assert_eq!(normalize_epoch(123_456), None);
        assert_eq!(normalize_epoch(0), None);
        assert_eq!(normalize_epoch(-5), None);

        // A millisecond timestamp in the feed comes out as seconds
        let msg = feed(vec![trip_update(
            "0#4930-11",
            vec![StopTimeUpdate {
                stop_id: Some("S1".into()),
                arrival: arrival_at(1_750_000_000_000),
                ..Default::default()
            }],
        )]);
        let records = decode_trip_updates(&msg, &index());
        assert_eq!(records[0].arrival_epoch, 1_750_000_000);

        // An implausible timestamp drops the record
        let msg = feed(vec![trip_update(
            "0#4930-11",
            vec![StopTimeUpdate {
                stop_id: Some("S1".into()),
                arrival: arrival_at(12),
                ..Default::default()
            }],
        )]);
        assert!(decode_trip_updates(&msg, &index()).is_empty());
    }

    fn vehicle(trip_id: Option<&str>, lat: f32, lon: f32) -> FeedEntity {
        FeedEntity {
            id: "v".into(),
            vehicle: Some(FeedVehiclePosition {
                trip: trip_id.map(|t| TripDescriptor {
                    trip_id: Some(t.into()),
                    ..Default::default()
                }),
                vehicle: Some(VehicleDescriptor {
                    id: Some("V42".into()),
                    ..Default::default()
                }),
                position: Some(Position {
                    latitude: lat,
                    longitude: lon,
                    ..Default::default()
                }),
                current_stop_sequence: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_vehicle_positions_decoded() {
        let msg = feed(vec![vehicle(Some("0#4930-11"), 41.9, 12.5)]);
        let positions = decode_vehicle_positions(&msg);
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.trip_id.as_ref().unwrap().as_str(), "0#4930-11");
        assert_eq!(p.vehicle_id.as_ref().unwrap().as_str(), "V42");
        assert_eq!(p.stop_sequence, 3);
        assert!((p.position.y() - 41.9).abs() < 1e-6);
    }

    #[test]
    fn test_micro_degree_correction() {
        let msg = feed(vec![vehicle(None, 41_900_000.0, 12_500_000.0)]);
        let positions = decode_vehicle_positions(&msg);
        assert_eq!(positions.len(), 1);
        assert!((positions[0].position.y() - 41.9).abs() < 1e-3);
        assert!((positions[0].position.x() - 12.5).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_coordinates_dropped() {
        // Out of range even after micro-degree retry
        let msg = feed(vec![vehicle(None, 4.2e9, 1.0)]);
        assert!(decode_vehicle_positions(&msg).is_empty());
    }

    #[test]
    fn test_byte_overloads() {
        let msg = feed(vec![trip_update(
            "0#4930-11",
            vec![StopTimeUpdate {
                stop_id: Some("S1".into()),
                arrival: arrival_at(1_750_000_060),
                ..Default::default()
            }],
        )]);
        let bytes = msg.encode_to_vec();

        let records = decode_trip_updates_bytes(&bytes, &index()).unwrap();
        assert_eq!(records.len(), 1);

        assert!(decode_trip_updates_bytes(&[0xff, 0xff, 0xff], &index()).is_err());
        assert!(decode_vehicle_positions_bytes(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_feed_timestamp() {
        let msg = feed(vec![]);
        assert_eq!(feed_timestamp(&msg), Some(1_750_000_000));
    }
}
