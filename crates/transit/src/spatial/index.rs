//! R-tree index over geographic stops.
//!
//! ## Two-Stage Filtering
//!
//! Radius queries filter twice: a fast Euclidean pre-filter in the R-tree
//! (degree space, widened bounding radius), then an exact Haversine check on
//! the survivors. Synthetic line entries and stops without coordinates are
//! never inserted, so no distance computation can ever touch them.

use std::sync::Arc;

use geo::Point;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::models::Stop;
use crate::spatial::queries::{haversine_distance, meters_to_degrees_approx};

#[derive(Clone)]
pub struct StopNode {
    pub stop: Arc<Stop>,
    point: [f64; 2],
}

impl StopNode {
    fn new(stop: Arc<Stop>) -> Self {
        let point = [stop.location.x(), stop.location.y()];
        Self { stop, point }
    }
}

impl RTreeObject for StopNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StopNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Spatial index over every geographic stop.
pub struct StopSpatialIndex {
    tree: RTree<StopNode>,
}

impl StopSpatialIndex {
    pub fn new<'a>(stops: impl IntoIterator<Item = &'a Arc<Stop>>) -> Self {
        let nodes: Vec<StopNode> = stops
            .into_iter()
            .filter(|s| s.has_location())
            .map(|s| StopNode::new(s.clone()))
            .collect();

        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    /// Stops within `radius_m` meters of a point.
    pub fn stops_within(&self, point: Point, radius_m: f64) -> Vec<Arc<Stop>> {
        if radius_m <= 0.0 || !radius_m.is_finite() {
            return Vec::new();
        }

        // Widened degree-space radius; latitude shrink makes longitude
        // degrees shorter than the equator approximation, so 1.5x is safe
        // well past any transit network's latitudes.
        let deg = meters_to_degrees_approx(radius_m) * 1.5;

        self.tree
            .locate_within_distance([point.x(), point.y()], deg * deg)
            .filter(|node| haversine_distance(point, node.stop.location) <= radius_m)
            .map(|node| node.stop.clone())
            .collect()
    }

    /// The N nearest stops to a point.
    pub fn nearest_stops(&self, point: Point, n: usize) -> Vec<Arc<Stop>> {
        self.tree
            .nearest_neighbor_iter(&[point.x(), point.y()])
            .take(n)
            .map(|node| node.stop.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
