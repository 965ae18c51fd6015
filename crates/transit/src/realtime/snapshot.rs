//! Latest real-time trip-update predictions.
//!
//! One snapshot per refresh cycle, replaced wholesale: a trip missing from
//! the new feed must stop showing its old predictions immediately, so the
//! store never merges incrementally. Readers take a consistent point-in-time
//! view and never observe a half-built snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::identifiers::StopIdentifier;
use crate::matching::identity;
use crate::models::TripUpdateRecord;

type Snapshot = HashMap<String, HashMap<StopIdentifier, i64>>;

#[derive(Default)]
pub struct RealtimeSnapshotStore {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RealtimeSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the previous snapshot and rebuild from `records`.
    ///
    /// Every record is indexed under all spelling variants of its trip id,
    /// so later lookups succeed regardless of which convention the static
    /// table used.
    pub fn replace(&self, records: &[TripUpdateRecord]) {
        let mut next: Snapshot = HashMap::new();
        for record in records {
            for key in identity::variants(record.trip_id.as_str()) {
                next.entry(key)
                    .or_default()
                    .insert(record.stop_id.clone(), record.arrival_epoch);
            }
        }

        debug!(trip_keys = next.len(), records = records.len(), "realtime snapshot replaced");

        if let Ok(mut guard) = self.snapshot.write() {
            *guard = Arc::new(next);
        }
    }

    /// Predicted arrival epoch for a trip at a stop.
    ///
    /// Tries an exact variant+stop match first; failing that, a fuzzy pass
    /// accepts any stored key containing one of the query's variants. The
    /// fuzzy pass is deliberately permissive; callers guard the result with
    /// plausibility windows.
    pub fn lookup(&self, trip_id: &str, stop_id: &StopIdentifier) -> Option<i64> {
        let snapshot = self.view();
        let variants = identity::variants(trip_id);

        for v in &variants {
            if let Some(epoch) = snapshot.get(v).and_then(|by_stop| by_stop.get(stop_id)) {
                return Some(*epoch);
            }
        }

        for (key, by_stop) in snapshot.iter() {
            for v in &variants {
                if key.contains(v.as_str()) {
                    if let Some(epoch) = by_stop.get(stop_id) {
                        return Some(*epoch);
                    }
                }
            }
        }

        None
    }

    /// Number of indexed trip keys (variants included).
    pub fn len(&self) -> usize {
        self.view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view().is_empty()
    }

    fn view(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}
