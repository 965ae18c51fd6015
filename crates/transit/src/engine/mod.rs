//! The assembled engine: static indices, real-time state, query surface.
//!
//! Built once from already-parsed static records; the loaders that produce
//! those records (CSV, zip, HTTP) are external collaborators. After
//! construction the static side is immutable and safe for unsynchronized
//! concurrent reads; the snapshot store and the vehicle list are the only
//! structures the refresh path mutates.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use geo::Point;
use gtfs_realtime::FeedMessage;
use prost::Message;
use tracing::{debug, info, warn};

use crate::arrivals::{ArrivalAggregator, ArrivalConfig};
use crate::feed;
use crate::identifiers::{RouteIdentifier, StopIdentifier};
use crate::matching::{StopTripIndex, TripRegistry};
use crate::models::{
    CalendarException, ConnectionMode, Result, ServiceCalendar, Stop, StopTime, Trip,
    TripUpdateRecord, VehiclePosition,
};
use crate::realtime::{FeedSource, RealtimeSnapshotStore};
use crate::spatial::StopSpatialIndex;

pub struct TransitEngine {
    stops: HashMap<StopIdentifier, Arc<Stop>>,
    stop_list: Vec<Arc<Stop>>,
    stop_times_by_trip: HashMap<String, Vec<StopTime>>,
    stop_times: Vec<StopTime>,

    registry: Arc<TripRegistry>,
    index: Arc<StopTripIndex>,
    aggregator: ArrivalAggregator,
    spatial: StopSpatialIndex,

    snapshot: Arc<RealtimeSnapshotStore>,
    vehicles: RwLock<Arc<Vec<VehiclePosition>>>,
    mode: RwLock<ConnectionMode>,
    // Last feed header timestamp; 0 until a feed has been seen.
    feed_ts: AtomicI64,
}

impl TransitEngine {
    pub fn from_static_data(
        stops: Vec<Stop>,
        trips: Vec<Trip>,
        stop_times: Vec<StopTime>,
        exceptions: Vec<CalendarException>,
    ) -> Self {
        Self::with_config(stops, trips, stop_times, exceptions, ArrivalConfig::default())
    }

    pub fn with_config(
        stops: Vec<Stop>,
        trips: Vec<Trip>,
        stop_times: Vec<StopTime>,
        exceptions: Vec<CalendarException>,
        config: ArrivalConfig,
    ) -> Self {
        let stop_list: Vec<Arc<Stop>> = stops.into_iter().map(Arc::new).collect();
        let stops: HashMap<StopIdentifier, Arc<Stop>> = stop_list
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();

        let mut stop_times_by_trip: HashMap<String, Vec<StopTime>> = HashMap::new();
        for st in &stop_times {
            stop_times_by_trip
                .entry(st.trip_id.as_str().to_string())
                .or_default()
                .push(st.clone());
        }
        for calls in stop_times_by_trip.values_mut() {
            calls.sort_by_key(|st| st.stop_sequence);
        }

        let registry = Arc::new(TripRegistry::new(trips));
        let index = Arc::new(StopTripIndex::new(stop_times.iter().cloned()));
        let calendar = Arc::new(ServiceCalendar::from_exceptions(exceptions));
        let snapshot = Arc::new(RealtimeSnapshotStore::new());
        let spatial = StopSpatialIndex::new(&stop_list);

        let aggregator = ArrivalAggregator::new(
            registry.clone(),
            index.clone(),
            calendar.clone(),
            snapshot.clone(),
            config,
        );

        info!(
            stops = stop_list.len(),
            trips = registry.trips().len(),
            stop_times = stop_times.len(),
            services = calendar.service_count(),
            "transit engine built"
        );

        Self {
            stops,
            stop_list,
            stop_times_by_trip,
            stop_times,
            registry,
            index,
            aggregator,
            spatial,
            snapshot,
            vehicles: RwLock::new(Arc::new(Vec::new())),
            mode: RwLock::new(ConnectionMode::Online),
            feed_ts: AtomicI64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Arrivals
    // ------------------------------------------------------------------

    /// Ordered per-route arrivals for a stop. Never fails; unknown stops
    /// yield the sentinel entry.
    pub fn compute_arrivals(
        &self,
        stop_id: &StopIdentifier,
        mode: ConnectionMode,
        reference_epoch: i64,
    ) -> Vec<String> {
        self.aggregator.compute_arrivals(stop_id, mode, reference_epoch)
    }

    /// [`compute_arrivals`](Self::compute_arrivals) under an explicit clock.
    pub fn compute_arrivals_at(
        &self,
        stop_id: &StopIdentifier,
        mode: ConnectionMode,
        reference_epoch: i64,
        now_epoch: i64,
    ) -> Vec<String> {
        self.aggregator
            .compute_arrivals_at(stop_id, mode, reference_epoch, now_epoch)
    }

    /// Arrivals using the engine's own mode and the last seen feed
    /// timestamp (wall clock until a feed has arrived).
    pub fn arrivals_for_stop(&self, stop_id: &StopIdentifier) -> Vec<String> {
        let reference = self
            .feed_timestamp()
            .unwrap_or_else(|| Utc::now().timestamp());
        self.compute_arrivals(stop_id, self.mode(), reference)
    }

    // ------------------------------------------------------------------
    // Real-time state
    // ------------------------------------------------------------------

    /// Replace the snapshot with already-decoded prediction records.
    pub fn update_realtime_arrivals(&self, records: &[TripUpdateRecord]) {
        self.snapshot.replace(records);
    }

    /// Decode and apply a trip-update feed. Returns the number of usable
    /// records. The feed's header timestamp becomes the new reference.
    pub fn apply_trip_updates(&self, msg: &FeedMessage) -> usize {
        if let Some(ts) = feed::feed_timestamp(msg) {
            self.feed_ts.store(ts, Ordering::Relaxed);
        }
        let records = feed::decode_trip_updates(msg, &self.index);
        let count = records.len();
        self.snapshot.replace(&records);
        count
    }

    /// Byte-level overload of [`apply_trip_updates`](Self::apply_trip_updates).
    /// Malformed bytes return an error and leave the snapshot untouched.
    pub fn apply_trip_update_bytes(&self, bytes: &[u8]) -> Result<usize> {
        let msg = FeedMessage::decode(bytes)?;
        Ok(self.apply_trip_updates(&msg))
    }

    /// Decode and store the latest vehicle positions.
    pub fn apply_vehicle_positions(&self, msg: &FeedMessage) -> usize {
        let positions = feed::decode_vehicle_positions(msg);
        let count = positions.len();
        self.set_vehicle_positions(positions);
        count
    }

    /// Byte-level overload of [`apply_vehicle_positions`](Self::apply_vehicle_positions).
    pub fn apply_vehicle_position_bytes(&self, bytes: &[u8]) -> Result<usize> {
        let msg = FeedMessage::decode(bytes)?;
        Ok(self.apply_vehicle_positions(&msg))
    }

    pub fn set_vehicle_positions(&self, positions: Vec<VehiclePosition>) {
        if let Ok(mut guard) = self.vehicles.write() {
            *guard = Arc::new(positions);
        }
    }

    /// Consistent view of the latest vehicle positions.
    pub fn vehicle_positions(&self) -> Arc<Vec<VehiclePosition>> {
        self.vehicles
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Synthetic positions derived from the static schedule, for offline
    /// mode.
    pub fn simulate_vehicle_positions(&self) -> Vec<VehiclePosition> {
        feed::simulate_all_trips(self.registry.trips(), &self.stop_times, &self.stops)
    }

    /// One refresh cycle: pull both feeds from `source` and apply them.
    ///
    /// Any fetch or decode failure leaves the prior snapshot in place; a
    /// vehicle-feed failure additionally drops the engine to offline mode
    /// and substitutes simulated positions.
    pub fn refresh_cycle(&self, source: &dyn FeedSource) {
        if self.mode() == ConnectionMode::Online {
            match source
                .fetch_trip_updates()
                .and_then(|bytes| self.apply_trip_update_bytes(&bytes))
            {
                Ok(count) => debug!(records = count, "trip updates applied"),
                Err(e) => {
                    warn!(error = %e, "trip updates unavailable, keeping previous snapshot")
                }
            }

            match source
                .fetch_vehicle_positions()
                .and_then(|bytes| self.apply_vehicle_position_bytes(&bytes))
            {
                Ok(count) => debug!(vehicles = count, "vehicle positions applied"),
                Err(e) => {
                    warn!(error = %e, "vehicle positions unavailable, falling back to simulation");
                    self.set_mode(ConnectionMode::Offline);
                    let simulated = self.simulate_vehicle_positions();
                    self.set_vehicle_positions(simulated);
                }
            }
        } else {
            let simulated = self.simulate_vehicle_positions();
            self.set_vehicle_positions(simulated);
        }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
            .read()
            .map(|guard| *guard)
            .unwrap_or(ConnectionMode::Offline)
    }

    pub fn set_mode(&self, mode: ConnectionMode) {
        if let Ok(mut guard) = self.mode.write() {
            *guard = mode;
        }
    }

    /// Header timestamp of the last applied trip-update feed.
    pub fn feed_timestamp(&self) -> Option<i64> {
        match self.feed_ts.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    // ------------------------------------------------------------------
    // Stops, routes and search
    // ------------------------------------------------------------------

    pub fn stop(&self, id: &StopIdentifier) -> Option<Arc<Stop>> {
        self.stops.get(id).cloned()
    }

    pub fn all_stops(&self) -> &[Arc<Stop>] {
        &self.stop_list
    }

    /// Distinct (route, headsign) pairs serving a stop, in timetable order.
    pub fn lines_for_stop(&self, stop_id: &StopIdentifier) -> Vec<(RouteIdentifier, Arc<str>)> {
        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for st in self.index.stop_times_for(stop_id) {
            let Some(trip) = self.registry.match_by_trip_id(st.trip_id.as_str()) else {
                continue;
            };
            let entry = (trip.route_id.clone(), trip.headsign.clone());
            if seen.insert(entry.clone()) {
                lines.push(entry);
            }
        }
        lines
    }

    /// Ordered stops of a route, following its longest trip; optionally
    /// restricted to trips with a matching headsign.
    pub fn stops_for_route(
        &self,
        route_id: &RouteIdentifier,
        headsign: Option<&str>,
    ) -> Vec<Arc<Stop>> {
        let best_trip = self
            .registry
            .trips()
            .iter()
            .filter(|t| &t.route_id == route_id)
            .filter(|t| headsign.map(|h| &*t.headsign == h).unwrap_or(true))
            .max_by_key(|t| {
                self.stop_times_by_trip
                    .get(t.id.as_str())
                    .map(Vec::len)
                    .unwrap_or(0)
            });

        let Some(trip) = best_trip else {
            return Vec::new();
        };
        let Some(calls) = self.stop_times_by_trip.get(trip.id.as_str()) else {
            return Vec::new();
        };

        calls
            .iter()
            .filter_map(|st| self.stops.get(&st.stop_id).cloned())
            .collect()
    }

    /// Case-insensitive substring search over stop names and ids.
    pub fn search_stops(&self, query: &str, limit: usize) -> Vec<Arc<Stop>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        self.stop_list
            .iter()
            .filter(|s| !s.is_line_entry())
            .filter(|s| {
                s.name.to_lowercase().contains(&query)
                    || s.id.as_str().to_lowercase().contains(&query)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Synthetic line entries (route + headsign) matching a route query.
    pub fn line_entries(&self, query: &str) -> Vec<Stop> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for trip in self.registry.trips() {
            if !trip.route_id.as_str().to_lowercase().contains(&query) {
                continue;
            }
            let label = format!("{} - {}", trip.route_id, trip.headsign);
            if seen.insert(label.clone()) {
                entries.push(Stop::line_entry(label));
            }
        }
        entries
    }

    /// Geographic stops within `radius_m` meters. Line entries are never in
    /// the spatial index, so they can never appear here.
    pub fn stops_near(&self, point: Point, radius_m: f64) -> Vec<Arc<Stop>> {
        self.spatial.stops_within(point, radius_m)
    }

    /// The N geographically nearest stops.
    pub fn nearest_stops(&self, point: Point, n: usize) -> Vec<Arc<Stop>> {
        self.spatial.nearest_stops(point, n)
    }
}
