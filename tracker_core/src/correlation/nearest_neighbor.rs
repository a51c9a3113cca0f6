//! Nearest-neighbour correlation with covariance gating, turning hysteresis
//! and coasting.
//!
//! # Gating statistic
//! For the closest local track (squared distance, first minimum in list
//! order) the confidence sigma is
//!
//! ```text
//! sigma = (sqrt(P_local,xx) + sqrt(P_report,xx)) / |d|
//! ```
//!
//! where both covariances are rotated into the frame whose x-axis is the
//! separation `d`. Large sigma means the separation is small relative to the
//! combined uncertainty. Without covariances the statistic degrades to the
//! sum of the two scalar expected location errors, undivided; the configured
//! thresholds are calibrated against exactly this value.
//!
//! # Decision
//! - `sigma >= tracking_sigma`: accept, clear the local's turning flag.
//! - `sigma >= turning_sigma`: accept, flag the local as turning.
//! - otherwise reject and clear the turning flag; a report correlated within
//!   the last `coast_time` keeps its previous local track.

use super::{CorrelationContext, CorrelationStrategy};
use crate::{
    config::{non_negative, ConfigError},
    geometry::Covariance,
    track::{LocalTrack, RawTrack},
    types::{TrackId, Vec3},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{trace, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearestNeighborConfig {
    pub tracking_sigma: f64,
    pub turning_sigma: f64,
    /// Time a rejected report keeps its previous correlation (s)
    pub coast_time: f64,
    /// Gate on rotated covariances; when false always use the scalar errors
    pub precise_mode: bool,
}

impl Default for NearestNeighborConfig {
    fn default() -> Self {
        Self {
            tracking_sigma: 1.0,
            turning_sigma: 0.3,
            coast_time: 5.0,
            precise_mode: true,
        }
    }
}

impl NearestNeighborConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("tracking_sigma", self.tracking_sigma)?;
        non_negative("turning_sigma", self.turning_sigma)?;
        non_negative("coast_time", self.coast_time)?;
        if self.turning_sigma > self.tracking_sigma {
            warn!(
                tracking_sigma = self.tracking_sigma,
                turning_sigma = self.turning_sigma,
                "turning_sigma above tracking_sigma; turning band is empty"
            );
        }
        Ok(())
    }
}

/// Confidence sigma for two tracks separated by `separation`.
///
/// Zero separation with covariances available yields `f64::MAX`.
pub fn confidence_sigma(
    separation: &Vec3,
    local_cov: Option<&Covariance>,
    raw_cov: Option<&Covariance>,
    local_error: f64,
    raw_error: f64,
) -> f64 {
    match (local_cov, raw_cov) {
        (Some(local_cov), Some(raw_cov)) => {
            let distance = separation.norm();
            if distance <= 0.0 {
                return f64::MAX;
            }
            let local_xx = local_cov.in_separation_frame(separation).x_variance().max(0.0);
            let raw_xx = raw_cov.in_separation_frame(separation).x_variance().max(0.0);
            (local_xx.sqrt() + raw_xx.sqrt()) / distance
        }
        _ => local_error + raw_error,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Confidence {
    local: TrackId,
    last_confident: f64,
}

#[derive(Clone, Debug, Default)]
pub struct NearestNeighborCorrelation {
    pub config: NearestNeighborConfig,
    confident: HashMap<TrackId, Confidence>,
    /// Raw ids whose latest correlation was only marginally confident
    turning: BTreeSet<TrackId>,
}

impl NearestNeighborCorrelation {
    pub fn new(config: NearestNeighborConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// True when a raw track correlated to `local_id` is flagged turning.
    pub fn is_turning(&self, local_id: TrackId) -> bool {
        self.turning
            .iter()
            .any(|raw| self.confident.get(raw).is_some_and(|c| c.local == local_id))
    }

    pub fn last_confident_time(&self, raw_id: TrackId) -> Option<f64> {
        self.confident.get(&raw_id).map(|c| c.last_confident)
    }

    /// True if any bookkeeping entry is keyed by `raw_id`.
    pub fn has_entries_for(&self, raw_id: TrackId) -> bool {
        self.confident.contains_key(&raw_id) || self.turning.contains(&raw_id)
    }

    fn clear_turning(&mut self, local_id: TrackId) {
        let confident = &self.confident;
        self.turning
            .retain(|raw| confident.get(raw).map_or(true, |c| c.local != local_id));
    }

    fn record(&mut self, raw_id: TrackId, local_id: TrackId, sim_time: f64) {
        self.confident.insert(
            raw_id,
            Confidence {
                local: local_id,
                last_confident: sim_time,
            },
        );
    }

    fn sigma_for(&self, sim_time: f64, raw: &RawTrack, raw_pos: &Vec3, local: &LocalTrack, local_pos: &Vec3) -> f64 {
        let separation = raw_pos - local_pos;
        let (local_cov, raw_cov) = if self.config.precise_mode {
            (local.position_covariance(), raw.position_covariance())
        } else {
            (None, None)
        };
        let sigma = confidence_sigma(
            &separation,
            local_cov.as_ref(),
            raw_cov.as_ref(),
            local.expected_location_error(),
            raw.expected_location_error(),
        );
        trace!(
            raw = %raw.id,
            local = %local.id,
            sim_time,
            separation = separation.norm(),
            sigma,
            "nearest neighbour gate"
        );
        sigma
    }
}

impl CorrelationStrategy for NearestNeighborCorrelation {
    fn name(&self) -> &'static str {
        "nearest_neighbor"
    }

    fn correlate(&mut self, sim_time: f64, raw: &RawTrack, ctx: &mut CorrelationContext<'_>) -> Option<TrackId> {
        let Some(raw_pos) = raw.extrapolated_position_at(sim_time) else {
            // Angle-only: only the local track mirroring this report qualifies.
            return ctx
                .local_tracks
                .iter()
                .find(|l| l.is_mirror_of(raw.id))
                .map(|l| l.id);
        };

        let mut nearest: Option<(&LocalTrack, Vec3, f64)> = None;
        for local in ctx.local_tracks.iter().filter(|l| l.fusible) {
            let Some(local_pos) = local.extrapolated_position_at(sim_time) else {
                continue;
            };
            let d2 = (raw_pos - local_pos).norm_squared();
            if nearest.map_or(true, |(_, _, best)| d2 < best) {
                nearest = Some((local, local_pos, d2));
            }
        }

        if let Some((local, local_pos, _)) = nearest {
            let local_id = local.id;
            let sigma = self.sigma_for(sim_time, raw, &raw_pos, local, &local_pos);
            if sigma >= self.config.tracking_sigma {
                self.record(raw.id, local_id, sim_time);
                self.clear_turning(local_id);
                return Some(local_id);
            }
            if sigma >= self.config.turning_sigma {
                self.record(raw.id, local_id, sim_time);
                self.turning.insert(raw.id);
                return Some(local_id);
            }
            self.clear_turning(local_id);
        }

        let previous = self.confident.get(&raw.id).copied()?;
        if sim_time - previous.last_confident <= self.config.coast_time
            && ctx.local_tracks.contains(previous.local)
        {
            trace!(raw = %raw.id, local = %previous.local, "coasting");
            Some(previous.local)
        } else {
            self.decorrelate(raw.id);
            None
        }
    }

    fn decorrelate(&mut self, raw_id: TrackId) {
        self.confident.remove(&raw_id);
        self.turning.remove(&raw_id);
    }

    fn new_track_correlation(&mut self, raw_id: TrackId, local_id: TrackId) {
        // A freshly initiated track is its own perfect match.
        self.turning.remove(&raw_id);
        self.confident.insert(
            raw_id,
            Confidence {
                local: local_id,
                last_confident: f64::NEG_INFINITY,
            },
        );
    }

    fn correlated_track_id(&self, raw_id: TrackId) -> Option<TrackId> {
        self.confident.get(&raw_id).map(|c| c.local)
    }

    fn local_track_dropped(&mut self, local_id: TrackId) {
        self.clear_turning(local_id);
        self.confident.retain(|_, c| c.local != local_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        track_list::{LocalTrackList, RawTrackList},
        types::SensorId,
    };
    use approx::assert_abs_diff_eq;

    const LOCAL: TrackId = TrackId::new(1, 1);
    const RAW: TrackId = TrackId::new(3, 1);

    fn locals_at_origin() -> LocalTrackList {
        let seed = RawTrack::cartesian(TrackId::new(3, 99), SensorId(1), 0.0, Vec3::zeros())
            .with_state_covariance(Covariance::isotropic(25.0));
        let mut list = LocalTrackList::new();
        list.add(LocalTrack::from_raw(LOCAL, &seed));
        list
    }

    /// Report `distance` m from the origin with a 25 m isotropic covariance,
    /// so sigma = 50 / distance.
    fn report(distance: f64, t: f64) -> RawTrack {
        RawTrack::cartesian(RAW, SensorId(2), t, Vec3::new(0.0, distance, 0.0))
            .with_state_covariance(Covariance::isotropic(25.0))
    }

    fn strategy(coast_time: f64) -> NearestNeighborCorrelation {
        NearestNeighborCorrelation::new(NearestNeighborConfig {
            coast_time,
            ..Default::default()
        })
    }

    #[test]
    fn sigma_halves_when_separation_doubles() {
        let cov = Covariance::from_diagonal(625.0, 100.0, 100.0);
        let near = confidence_sigma(&Vec3::new(50.0, 0.0, 0.0), Some(&cov), Some(&cov), 0.0, 0.0);
        let far = confidence_sigma(&Vec3::new(100.0, 0.0, 0.0), Some(&cov), Some(&cov), 0.0, 0.0);
        assert_abs_diff_eq!(far, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(near, 1.0, epsilon = 1e-12);
        let mut previous = f64::MAX;
        for d in [1.0, 10.0, 60.0, 200.0, 5000.0] {
            let s = confidence_sigma(&Vec3::new(0.0, d, d), Some(&cov), Some(&cov), 0.0, 0.0);
            assert!(s < previous);
            previous = s;
        }
    }

    #[test]
    fn degenerate_geometry_is_clamped() {
        let cov = Covariance::isotropic(10.0);
        assert_eq!(confidence_sigma(&Vec3::zeros(), Some(&cov), Some(&cov), 0.0, 0.0), f64::MAX);
        let s = confidence_sigma(&Vec3::new(-40.0, 0.0, 0.0), Some(&cov), Some(&cov), 0.0, 0.0);
        assert_abs_diff_eq!(s, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn scalar_fallback_is_undivided_sum() {
        let s = confidence_sigma(&Vec3::new(1.0e6, 0.0, 0.0), None, None, 30.0, 12.5);
        assert_abs_diff_eq!(s, 42.5);
    }

    #[test]
    fn stable_when_gate_always_passes() {
        let raws = RawTrackList::new();
        let locals = locals_at_origin();
        let mut nn = strategy(2.0);
        for t in 0..20 {
            let mut ctx = CorrelationContext::new(&raws, &locals);
            assert_eq!(nn.correlate(t as f64, &report(10.0, t as f64), &mut ctx), Some(LOCAL));
        }
        assert!(!nn.is_turning(LOCAL));
    }

    #[test]
    fn turning_then_coasting_within_window() {
        let raws = RawTrackList::new();
        let locals = locals_at_origin();
        let mut nn = strategy(2.0);
        let t = 10.0;

        let mut ctx = CorrelationContext::new(&raws, &locals);
        assert_eq!(nn.correlate(t - 1.0, &report(100.0, t - 1.0), &mut ctx), Some(LOCAL));
        assert!(nn.is_turning(LOCAL));
        assert_eq!(nn.last_confident_time(RAW), Some(t - 1.0));

        // sigma 0.1: rejected, but coasts on the previous correlation.
        assert_eq!(nn.correlate(t, &report(500.0, t), &mut ctx), Some(LOCAL));
        assert!(!nn.is_turning(LOCAL));
        assert_eq!(nn.last_confident_time(RAW), Some(t - 1.0));
    }

    #[test]
    fn coast_expires_and_clears_bookkeeping() {
        let raws = RawTrackList::new();
        let locals = locals_at_origin();
        let mut nn = strategy(2.0);
        let t = 10.0;

        let mut ctx = CorrelationContext::new(&raws, &locals);
        assert_eq!(nn.correlate(t - 3.0, &report(100.0, t - 3.0), &mut ctx), Some(LOCAL));
        assert_eq!(nn.correlate(t, &report(500.0, t), &mut ctx), None);
        assert!(!nn.has_entries_for(RAW));
        assert_eq!(nn.correlated_track_id(RAW), None);
    }

    #[test]
    fn decorrelate_removes_every_entry() {
        let raws = RawTrackList::new();
        let locals = locals_at_origin();
        let mut nn = strategy(2.0);
        let mut ctx = CorrelationContext::new(&raws, &locals);
        nn.correlate(0.0, &report(100.0, 0.0), &mut ctx);
        assert!(nn.has_entries_for(RAW));
        nn.decorrelate(RAW);
        assert!(!nn.has_entries_for(RAW));
        assert!(!nn.is_turning(LOCAL));
    }

    #[test]
    fn angle_only_matches_only_its_mirror() {
        let raws = RawTrackList::new();
        let mut locals = locals_at_origin();
        let bearing = RawTrack::angle_only(TrackId::new(3, 5), SensorId(4), 0.0, Vec3::zeros(), 1.0, None);
        let mut nn = strategy(2.0);
        {
            let mut ctx = CorrelationContext::new(&raws, &locals);
            assert_eq!(nn.correlate(0.0, &bearing, &mut ctx), None);
        }
        let mut mirror = LocalTrack::from_raw(TrackId::new(1, 2), &bearing);
        mirror.correlate(bearing.id);
        locals.add(mirror);
        let mut ctx = CorrelationContext::new(&raws, &locals);
        assert_eq!(nn.correlate(0.0, &bearing, &mut ctx), Some(TrackId::new(1, 2)));
    }

    #[test]
    fn imprecise_mode_uses_scalar_errors() {
        let raws = RawTrackList::new();
        let locals = locals_at_origin();
        let mut nn = NearestNeighborCorrelation::new(NearestNeighborConfig {
            precise_mode: false,
            ..Default::default()
        });
        // Far beyond the covariance gate, but the scalar sum is 25 + 25.
        let mut ctx = CorrelationContext::new(&raws, &locals);
        assert_eq!(nn.correlate(0.0, &report(1.0e5, 0.0), &mut ctx), Some(LOCAL));
    }

    #[test]
    fn negative_values_are_rejected() {
        let config = NearestNeighborConfig {
            coast_time: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(NearestNeighborConfig::default().validate().is_ok());
    }
}
