//! Lookup from trip identifiers to static trip records.
//!
//! Resolution here is strict on purpose: an exact match, then one retry with
//! the numeric feed tag stripped. Anything else stays unresolved and the
//! caller must treat the corresponding prediction as unattributable. Route
//! labels shown to users come only through this path; the permissive variant
//! matching in `identity` is reserved for arrival-time lookups.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::identifiers::RouteIdentifier;
use crate::matching::identity;
use crate::models::Trip;

pub struct TripRegistry {
    trips: Vec<Arc<Trip>>,
    by_id: HashMap<String, Arc<Trip>>,
    // Route resolution memo, negative results included. Keyed by the raw
    // feed spelling so repeated refresh cycles do not re-resolve.
    route_cache: RwLock<HashMap<String, Option<RouteIdentifier>>>,
}

impl TripRegistry {
    pub fn new(trips: impl IntoIterator<Item = Trip>) -> Self {
        let trips: Vec<Arc<Trip>> = trips.into_iter().map(Arc::new).collect();
        let by_id = trips
            .iter()
            .map(|t| (t.id.as_str().to_string(), t.clone()))
            .collect();

        Self {
            trips,
            by_id,
            route_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn trips(&self) -> &[Arc<Trip>] {
        &self.trips
    }

    /// Resolve a trip id to its static record: exact match, then a single
    /// retry with the numeric feed tag stripped.
    pub fn match_by_trip_id(&self, trip_id: &str) -> Option<&Arc<Trip>> {
        if let Some(t) = self.by_id.get(trip_id) {
            return Some(t);
        }
        let stripped = identity::strip_feed_prefix(trip_id);
        if stripped != trip_id {
            return self.by_id.get(stripped);
        }
        None
    }

    /// Resolve the route label for a feed trip id, strictly.
    ///
    /// Returns `None` when no static trip (exact or tag-stripped) carries a
    /// non-empty route id; such predictions are excluded from per-route
    /// output rather than guessed at. Results are memoized, misses included.
    pub fn resolve_route_strict(&self, feed_trip_id: &str) -> Option<RouteIdentifier> {
        if let Ok(cache) = self.route_cache.read() {
            if let Some(cached) = cache.get(feed_trip_id) {
                return cached.clone();
            }
        }

        let resolved = self
            .match_by_trip_id(feed_trip_id)
            .map(|t| t.route_id.clone())
            .filter(|r| !r.as_str().is_empty());

        if resolved.is_none() {
            debug!(trip_id = feed_trip_id, "feed trip unattributable to a route");
        }

        if let Ok(mut cache) = self.route_cache.write() {
            cache.insert(feed_trip_id.to_string(), resolved.clone());
        }
        resolved
    }
}
