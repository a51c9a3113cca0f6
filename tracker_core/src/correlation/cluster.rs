//! Cluster correlation: periodic complete-linkage re-clustering of all raw
//! tracks, greedily paired with local tracks.
//!
//! # Pass
//! 1. Cluster every fusible 3-D raw track (extrapolated to the pass time)
//!    with complete linkage and the current distance limit.
//! 2. Fill a proximity matrix of cluster mean vs local track position.
//! 3. Repeatedly take the global minimum. Below 3× the limit the cluster is
//!    assigned to that local track: the local's other contributors are
//!    decorrelated, the cluster's members are (re)correlated, the row is
//!    removed and the column blanked.
//! 4. Every cluster left over initiates a new local track, seeded from its
//!    first member.
//!
//! A pass runs when a never-seen raw track arrives and every
//! `update_interval`.
//!
//! # Distance limit
//! Starts at 100 m and only grows: to 3× the largest 3σ position error
//! observed, where σ comes from the state covariance diagonal or from the
//! spherical error terms at the largest range seen for that sensor.

use super::{CorrelationCommand, CorrelationContext, CorrelationStrategy};
use crate::{
    clustering::{mean_location, ClusterEngine, ClusterMethod, Clusterable, ProximityMatrix},
    config::{positive, ConfigError},
    track::RawTrack,
    types::{SensorId, TrackId, Vec3},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

const INITIAL_DISTANCE_LIMIT: f64 = 100.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Period of the re-clustering pass (s)
    pub update_interval: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { update_interval: 5.0 }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("update_interval", self.update_interval)
    }
}

/// A raw track as seen by one clustering pass.
#[derive(Clone, Debug)]
struct ClusterPoint {
    id: TrackId,
    location: Vec3,
    velocity: Option<Vec3>,
}

impl Clusterable for ClusterPoint {
    fn cluster_location(&self) -> Vec3 {
        self.location
    }

    fn cluster_velocity(&self) -> Option<Vec3> {
        self.velocity
    }
}

#[derive(Clone, Debug)]
pub struct ClusterCorrelation {
    pub config: ClusterConfig,
    distance_limit: f64,
    sensor_ranges: HashMap<SensorId, f64>,
    raw_local: HashMap<TrackId, TrackId>,
    seen: HashSet<TrackId>,
}

impl Default for ClusterCorrelation {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}

impl ClusterCorrelation {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            distance_limit: INITIAL_DISTANCE_LIMIT,
            sensor_ranges: HashMap::new(),
            raw_local: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn distance_limit(&self) -> f64 {
        self.distance_limit
    }

    pub fn largest_range(&self, sensor: SensorId) -> Option<f64> {
        self.sensor_ranges.get(&sensor).copied()
    }

    /// True if any bookkeeping entry is keyed by `raw_id`.
    pub fn has_entries_for(&self, raw_id: TrackId) -> bool {
        self.raw_local.contains_key(&raw_id) || self.seen.contains(&raw_id)
    }

    /// Grow the distance limit from the report's error model.
    fn observe_errors(&mut self, raw: &RawTrack) {
        if let Some(range) = raw.range() {
            let largest = self.sensor_ranges.entry(raw.sensor_id).or_insert(range);
            *largest = largest.max(range);
        }
        let sigma = match raw.state_covariance {
            Some(cov) => Some(cov.max_variance().max(0.0).sqrt()),
            None => self
                .largest_range(raw.sensor_id)
                .and_then(|range| raw.spherical_error_at(range)),
        };
        if let Some(sigma) = sigma {
            let grown = 3.0 * (3.0 * sigma);
            if grown > self.distance_limit {
                debug!(
                    sensor = %raw.sensor_id,
                    from = self.distance_limit,
                    to = grown,
                    "cluster distance limit grows"
                );
                self.distance_limit = grown;
            }
        }
    }

    fn valid_local(&mut self, raw_id: TrackId, ctx: &CorrelationContext<'_>) -> Option<TrackId> {
        let local_id = *self.raw_local.get(&raw_id)?;
        if ctx.local_tracks.contains(local_id) {
            Some(local_id)
        } else {
            self.raw_local.remove(&raw_id);
            None
        }
    }

    /// Move `members` into `local_id`, releasing the local's other clustered
    /// contributors.
    fn assign(&mut self, members: &[TrackId], clustered: &HashSet<TrackId>, local_id: TrackId, ctx: &mut CorrelationContext<'_>) {
        let mut released: Vec<TrackId> = self
            .raw_local
            .iter()
            .filter(|(raw, local)| **local == local_id && clustered.contains(raw) && !members.contains(raw))
            .map(|(raw, _)| *raw)
            .collect();
        released.sort_unstable();
        for raw in released {
            self.raw_local.remove(&raw);
            ctx.push(CorrelationCommand::Decorrelate { raw, local: local_id });
        }

        for &raw in members {
            match self.raw_local.insert(raw, local_id) {
                Some(old) if old == local_id => {}
                Some(old) => {
                    ctx.push(CorrelationCommand::Decorrelate { raw, local: old });
                    ctx.push(CorrelationCommand::Correlate { raw, local: local_id });
                }
                None => ctx.push(CorrelationCommand::Correlate { raw, local: local_id }),
            }
        }
    }

    fn recluster(&mut self, sim_time: f64, trigger: Option<TrackId>, ctx: &mut CorrelationContext<'_>) {
        let points: Vec<ClusterPoint> = ctx
            .raw_tracks
            .iter()
            .filter(|r| r.fusible)
            .filter_map(|r| {
                Some(ClusterPoint {
                    id: r.id,
                    location: r.extrapolated_position_at(sim_time)?,
                    velocity: r.velocity,
                })
            })
            .collect();
        if points.is_empty() {
            return;
        }
        let clustered: HashSet<TrackId> = points.iter().map(|p| p.id).collect();

        let engine = ClusterEngine::with_limit(ClusterMethod::HierarchicalComplete, self.distance_limit);
        let mut clusters = engine.cluster(&points);
        for cluster in clusters.iter_mut() {
            cluster.sort_unstable();
        }
        clusters.sort_by_key(|c| c.first().copied());

        let locals: Vec<(TrackId, Vec3)> = ctx
            .local_tracks
            .iter()
            .filter(|l| l.fusible)
            .filter_map(|l| Some((l.id, l.extrapolated_position_at(sim_time)?)))
            .collect();
        let means: Vec<Vec3> = clusters
            .iter()
            .map(|c| mean_location(&points, c).unwrap_or_else(Vec3::zeros))
            .collect();
        let rows: Vec<Vec<f64>> = means
            .par_iter()
            .map(|mean| locals.iter().map(|(_, p)| (mean - p).norm()).collect())
            .collect();
        let mut matrix = ProximityMatrix::from_rows(rows, locals.len());
        let mut row_cluster: Vec<usize> = (0..clusters.len()).collect();

        debug!(
            sim_time,
            raw_tracks = points.len(),
            clusters = clusters.len(),
            local_tracks = locals.len(),
            distance_limit = self.distance_limit,
            "cluster pass"
        );

        let accept = 3.0 * self.distance_limit;
        while let Some((r, c, distance)) = matrix.min_entry() {
            if !(distance < accept) {
                break;
            }
            let members: Vec<TrackId> = clusters[row_cluster[r]].iter().map(|&i| points[i].id).collect();
            let local_id = locals[c].0;
            trace!(local = %local_id, members = members.len(), distance, "cluster assigned");
            self.assign(&members, &clustered, local_id, ctx);
            matrix.delete_row(r);
            row_cluster.remove(r);
            matrix.fill_column(c, f64::INFINITY);
        }

        for ci in row_cluster {
            let mut members: Vec<TrackId> = clusters[ci].iter().map(|&i| points[i].id).collect();
            if let Some(pos) = trigger.and_then(|t| members.iter().position(|&m| m == t)) {
                members[..=pos].rotate_right(1);
            }
            for &raw in &members {
                if let Some(old) = self.raw_local.remove(&raw) {
                    ctx.push(CorrelationCommand::Decorrelate { raw, local: old });
                }
            }
            trace!(members = members.len(), "cluster unmatched");
            ctx.push(CorrelationCommand::Initiate { members });
        }
    }
}

impl CorrelationStrategy for ClusterCorrelation {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn initialize(&mut self, sim_time: f64) -> Option<f64> {
        Some(sim_time + self.config.update_interval)
    }

    fn correlate(&mut self, sim_time: f64, raw: &RawTrack, ctx: &mut CorrelationContext<'_>) -> Option<TrackId> {
        self.observe_errors(raw);
        if raw.is_3d() && self.seen.insert(raw.id) {
            debug!(raw = %raw.id, sim_time, "new raw track triggers re-clustering");
            self.recluster(sim_time, Some(raw.id), ctx);
        }
        self.valid_local(raw.id, ctx)
    }

    fn decorrelate(&mut self, raw_id: TrackId) {
        self.raw_local.remove(&raw_id);
        self.seen.remove(&raw_id);
    }

    fn new_track_correlation(&mut self, raw_id: TrackId, local_id: TrackId) {
        self.seen.insert(raw_id);
        self.raw_local.insert(raw_id, local_id);
    }

    fn correlated_track_id(&self, raw_id: TrackId) -> Option<TrackId> {
        self.raw_local.get(&raw_id).copied()
    }

    fn local_track_dropped(&mut self, local_id: TrackId) {
        self.raw_local.retain(|_, l| *l != local_id);
    }

    fn scheduled_update(&mut self, sim_time: f64, ctx: &mut CorrelationContext<'_>) -> Option<f64> {
        self.recluster(sim_time, None, ctx);
        Some(sim_time + self.config.update_interval)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
