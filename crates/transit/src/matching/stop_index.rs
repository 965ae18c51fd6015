//! Index over the static stop-time table.
//!
//! Built once at load time. Serves two lookups: the ordered static arrivals
//! at a stop, and the recovery of a stop id from a (trip, stop sequence)
//! pair when the real-time feed omits the stop id. The sequence index is
//! keyed by every spelling variant of each trip id seen in the static table,
//! so a later feed lookup resolves regardless of the feed's format.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::identifiers::StopIdentifier;
use crate::matching::identity;
use crate::models::StopTime;

pub struct StopTripIndex {
    stop_to_times: HashMap<StopIdentifier, Vec<StopTime>>,
    trip_seq_to_stop: HashMap<String, HashMap<u32, StopIdentifier>>,
    known_stops: HashSet<StopIdentifier>,
}

impl StopTripIndex {
    pub fn new(stop_times: impl IntoIterator<Item = StopTime>) -> Self {
        let mut stop_to_times: HashMap<StopIdentifier, Vec<StopTime>> = HashMap::new();
        let mut trip_seq_to_stop: HashMap<String, HashMap<u32, StopIdentifier>> = HashMap::new();
        let mut known_stops = HashSet::new();

        for st in stop_times {
            known_stops.insert(st.stop_id.clone());

            for key in identity::variants(st.trip_id.as_str()) {
                trip_seq_to_stop
                    .entry(key)
                    .or_default()
                    .insert(st.stop_sequence, st.stop_id.clone());
            }

            stop_to_times.entry(st.stop_id.clone()).or_default().push(st);
        }

        for times in stop_to_times.values_mut() {
            // Absent scheduled times sort last
            times.sort_by_key(|st| (st.arrival.is_none(), st.arrival));
        }

        debug!(
            stops = stop_to_times.len(),
            trip_keys = trip_seq_to_stop.len(),
            "stop/trip index built"
        );

        Self {
            stop_to_times,
            trip_seq_to_stop,
            known_stops,
        }
    }

    /// Static arrivals at a stop, ordered by scheduled arrival time-of-day.
    /// Empty for unknown stops.
    pub fn stop_times_for(&self, stop_id: &StopIdentifier) -> &[StopTime] {
        self.stop_to_times
            .get(stop_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Recover a stop id from a trip id and a stop sequence, trying the
    /// normalized key first and then every generated variant.
    pub fn stop_id_for(&self, trip_id: &str, sequence: u32) -> Option<StopIdentifier> {
        for key in identity::variants(trip_id) {
            if let Some(stop) = self
                .trip_seq_to_stop
                .get(&key)
                .and_then(|by_seq| by_seq.get(&sequence))
            {
                return Some(stop.clone());
            }
        }
        None
    }

    pub fn is_known_stop(&self, stop_id: &StopIdentifier) -> bool {
        self.known_stops.contains(stop_id)
    }

    pub fn stop_count(&self) -> usize {
        self.stop_to_times.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> StopTripIndex {
        StopTripIndex::new([
            StopTime::new("0#4930-11", "S1", 1, Some(8 * 3600)),
            StopTime::new("0#4930-11", "S2", 2, Some(8 * 3600 + 300)),
            StopTime::new("77-B", "S1", 1, Some(7 * 3600)),
            StopTime::new("77-B", "S1", 9, None),
        ])
    }

    #[test]
    fn test_stop_times_sorted_with_absent_last() {
        let idx = index();
        let times = idx.stop_times_for(&StopIdentifier::new("S1"));
        assert_eq!(times.len(), 3);
        assert_eq!(times[0].arrival, Some(7 * 3600));
        assert_eq!(times[1].arrival, Some(8 * 3600));
        assert_eq!(times[2].arrival, None);
    }

    #[test]
    fn test_unknown_stop_is_empty() {
        let idx = index();
        assert!(idx.stop_times_for(&StopIdentifier::new("nope")).is_empty());
        assert!(!idx.is_known_stop(&StopIdentifier::new("nope")));
        assert!(idx.is_known_stop(&StopIdentifier::new("S2")));
    }

    #[test]
    fn test_stop_id_recovery_across_spellings() {
        let idx = index();

        // Same spelling as the static table
        assert_eq!(
            idx.stop_id_for("0#4930-11", 2),
            Some(StopIdentifier::new("S2"))
        );
        // Feed drops the tag and swaps the separator
        assert_eq!(
            idx.stop_id_for("4930_11", 2),
            Some(StopIdentifier::new("S2"))
        );
        // Separator-free spelling
        assert_eq!(idx.stop_id_for("493011", 1), Some(StopIdentifier::new("S1")));

        assert_eq!(idx.stop_id_for("4930-11", 99), None);
        assert_eq!(idx.stop_id_for("unknown-trip", 1), None);
    }
}
