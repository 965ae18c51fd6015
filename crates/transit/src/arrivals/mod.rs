//! Per-stop arrival aggregation and presentation.
//!
//! Merges the static schedule with the live snapshot into one ordered entry
//! per route. The feed's own header timestamp fixes the service date (the
//! feed may lag the wall clock, and test harnesses run on their own clock);
//! the wall clock bounds what is plausible to show. Every per-record failure
//! is absorbed silently: an unmatched trip, a missing schedule or an
//! implausible time excludes that record, never the whole query.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::identifiers::{RouteIdentifier, StopIdentifier};
use crate::matching::{StopTripIndex, TripRegistry};
use crate::models::{ConnectionMode, ServiceCalendar};
use crate::realtime::RealtimeSnapshotStore;

/// Shown when a stop has no usable upcoming arrival.
pub const NO_UPCOMING_ARRIVALS: &str = "Nessun arrivo imminente";

/// Tunable thresholds for arrival aggregation.
///
/// The literal values mirror the bounds the service was operated with; they
/// are configuration, not invariants, and the boundary tests below pin down
/// their inclusive/exclusive behavior.
#[derive(Clone, Copy, Debug)]
pub struct ArrivalConfig {
    /// At or under this many minutes out, show "In arrivo" instead of a count.
    pub imminent_threshold_min: i64,
    /// Arrivals further in the past than this are gone, not late.
    pub past_tolerance_min: i64,
    /// Look-ahead for schedule-only candidates.
    pub static_window_min: i64,
    /// Look-ahead for live predictions; tighter, as stale feeds lie.
    pub rt_window_min: i64,
    /// A prediction may displace a schedule-only impression of the same
    /// route only within this gap.
    pub rt_override_gap_min: i64,
    /// Timezone the schedule's times-of-day are expressed in.
    pub timezone: Tz,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            imminent_threshold_min: 2,
            past_tolerance_min: 2,
            static_window_min: 120,
            rt_window_min: 90,
            rt_override_gap_min: 30,
            timezone: chrono_tz::Europe::Rome,
        }
    }
}

/// The winning candidate for one route.
struct RouteArrival {
    route_id: RouteIdentifier,
    scheduled_epoch: i64,
    predicted_epoch: Option<i64>,
}

impl RouteArrival {
    fn sort_key(&self) -> i64 {
        self.predicted_epoch.unwrap_or(self.scheduled_epoch)
    }
}

pub struct ArrivalAggregator {
    registry: Arc<TripRegistry>,
    index: Arc<StopTripIndex>,
    calendar: Arc<ServiceCalendar>,
    snapshot: Arc<RealtimeSnapshotStore>,
    config: ArrivalConfig,
}

impl ArrivalAggregator {
    pub fn new(
        registry: Arc<TripRegistry>,
        index: Arc<StopTripIndex>,
        calendar: Arc<ServiceCalendar>,
        snapshot: Arc<RealtimeSnapshotStore>,
        config: ArrivalConfig,
    ) -> Self {
        Self {
            registry,
            index,
            calendar,
            snapshot,
            config,
        }
    }

    pub fn config(&self) -> &ArrivalConfig {
        &self.config
    }

    /// Ordered, one-entry-per-route arrival descriptions for a stop.
    ///
    /// `reference_epoch` is the feed header timestamp; the wall clock is
    /// taken internally. Never fails: an unknown stop or an empty result
    /// yields the sentinel entry.
    pub fn compute_arrivals(
        &self,
        stop_id: &StopIdentifier,
        mode: ConnectionMode,
        reference_epoch: i64,
    ) -> Vec<String> {
        self.compute_arrivals_at(stop_id, mode, reference_epoch, Utc::now().timestamp())
    }

    /// [`compute_arrivals`](Self::compute_arrivals) with an explicit "true
    /// current time", for callers running under a controlled clock.
    pub fn compute_arrivals_at(
        &self,
        stop_id: &StopIdentifier,
        mode: ConnectionMode,
        reference_epoch: i64,
        now_epoch: i64,
    ) -> Vec<String> {
        let times = self.index.stop_times_for(stop_id);
        if times.is_empty() {
            return vec![NO_UPCOMING_ARRIVALS.to_string()];
        }

        // A garbage reference timestamp degrades to the wall clock.
        let reference = DateTime::from_timestamp(reference_epoch, 0)
            .or_else(|| DateTime::from_timestamp(now_epoch, 0));
        let Some(reference) = reference else {
            return vec![NO_UPCOMING_ARRIVALS.to_string()];
        };
        let reference_epoch = reference.timestamp();
        let feed_date = reference.with_timezone(&self.config.timezone).date_naive();

        let mut per_route: HashMap<RouteIdentifier, RouteArrival> = HashMap::new();

        for st in times {
            let Some(trip) = self.registry.match_by_trip_id(st.trip_id.as_str()) else {
                continue;
            };

            if !trip.service_id.as_str().is_empty()
                && !self.calendar.runs_on(&trip.service_id, feed_date)
            {
                continue;
            }

            let Some(time_of_day) = st.arrival else {
                continue;
            };
            let Some(scheduled_epoch) =
                self.resolve_scheduled_epoch(time_of_day, feed_date, reference_epoch)
            else {
                continue;
            };

            let static_diff_min = (scheduled_epoch - now_epoch) / 60;
            if static_diff_min < -self.config.past_tolerance_min
                || static_diff_min > self.config.static_window_min
            {
                continue;
            }

            // Prediction anchored strictly to this stop id; the permissive
            // matching already happened inside the snapshot store.
            let mut predicted_epoch = match mode {
                ConnectionMode::Online => self.snapshot.lookup(st.trip_id.as_str(), stop_id),
                ConnectionMode::Offline => None,
            };

            if let Some(predicted) = predicted_epoch {
                let rt_diff_min = (predicted - now_epoch) / 60;
                if rt_diff_min < -self.config.past_tolerance_min
                    || rt_diff_min > self.config.rt_window_min
                {
                    debug!(
                        trip_id = st.trip_id.as_str(),
                        predicted, "prediction outside plausibility window, discarded"
                    );
                    predicted_epoch = None;
                }
            }

            let candidate = RouteArrival {
                route_id: trip.route_id.clone(),
                scheduled_epoch,
                predicted_epoch,
            };

            // Keep the most imminent per route; a prediction may displace a
            // schedule-only impression only when it does not contradict it
            // by more than the override gap.
            let displaces = match per_route.get(&candidate.route_id) {
                None => true,
                Some(current) => {
                    let (cand_key, cur_key) = (candidate.sort_key(), current.sort_key());
                    cand_key < cur_key
                        || (candidate.predicted_epoch.is_some()
                            && current.predicted_epoch.is_none()
                            && cand_key - cur_key < self.config.rt_override_gap_min * 60)
                }
            };
            if displaces {
                per_route.insert(candidate.route_id.clone(), candidate);
            }
        }

        let mut winners: Vec<RouteArrival> = per_route.into_values().collect();
        winners.sort_by_key(RouteArrival::sort_key);

        let arrivals: Vec<String> = winners
            .iter()
            .map(|w| self.format_arrival(w, now_epoch))
            .collect();

        if arrivals.is_empty() {
            vec![NO_UPCOMING_ARRIVALS.to_string()]
        } else {
            arrivals
        }
    }

    /// Resolve a schedule time-of-day against the feed date, choosing among
    /// the previous, same and next calendar day whichever lands closest to
    /// the reference instant. Handles services crossing midnight and clock
    /// skew near day boundaries.
    fn resolve_scheduled_epoch(
        &self,
        time_of_day: u32,
        feed_date: chrono::NaiveDate,
        reference_epoch: i64,
    ) -> Option<i64> {
        let mut best: Option<(i64, i64)> = None;

        for delta in -1..=1 {
            let Some(date) = feed_date.checked_add_signed(Duration::days(delta)) else {
                continue;
            };
            let naive = date.and_time(NaiveTime::MIN) + Duration::seconds(time_of_day as i64);
            let Some(instant) = self.config.timezone.from_local_datetime(&naive).earliest()
            else {
                continue;
            };
            let epoch = instant.timestamp();
            let diff = (epoch - reference_epoch).abs();
            if best.map(|(_, d)| diff < d).unwrap_or(true) {
                best = Some((epoch, diff));
            }
        }

        best.map(|(epoch, _)| epoch)
    }

    fn format_arrival(&self, info: &RouteArrival, now_epoch: i64) -> String {
        if let Some(predicted) = info.predicted_epoch {
            let minutes_out = ((predicted - now_epoch) / 60).max(0);
            let delay_min = (predicted - info.scheduled_epoch) / 60;

            let status = if delay_min > 0 {
                format!("ritardo di {} min", delay_min)
            } else if delay_min < 0 {
                format!("anticipo di {} min", -delay_min)
            } else {
                "in orario".to_string()
            };

            if minutes_out <= self.config.imminent_threshold_min {
                format!("{} - In arrivo ({})", info.route_id, status)
            } else {
                format!("{} - {} min ({})", info.route_id, minutes_out, status)
            }
        } else {
            let minutes_out = ((info.scheduled_epoch - now_epoch) / 60).max(0);
            format!("{} - {} min (statico)", info.route_id, minutes_out)
        }
    }
}
