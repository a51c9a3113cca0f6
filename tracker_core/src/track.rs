//! Raw tracks (sensor reports) and local tracks (fused system tracks).

use crate::{
    geometry::{spherical_position_error, spherical_to_cartesian, Covariance},
    types::{IffStatus, SensorId, TrackId, TrackKind, TruthId, Vec3},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Maximum number of past fused positions kept per local track.
const HISTORY_LEN: usize = 1024;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Reported position of a raw track at its update time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Location {
    /// Full 3-D solution in the world frame
    Cartesian(Vec3),
    /// Angles from the originator, with range when the sensor measures it.
    /// Without range there is no 3-D solution.
    Spherical {
        bearing: f64,
        elevation: Option<f64>,
        range: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// RawTrack
// ---------------------------------------------------------------------------

/// A single sensor or off-board report, owned by the raw track list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawTrack {
    pub id: TrackId,
    /// Sensor that produced the report
    pub sensor_id: SensorId,
    pub kind: TrackKind,
    /// Simulation time the data is valid at
    pub update_time: f64,
    pub update_count: u32,
    /// World position of the reporting sensor
    pub originator_location: Vec3,
    pub location: Location,
    pub velocity: Option<Vec3>,
    /// Filter state covariance (position block)
    pub state_covariance: Option<Covariance>,
    /// Single-measurement covariance
    pub measurement_covariance: Option<Covariance>,
    /// 1σ measurement errors (m, rad, rad)
    pub range_error: Option<f64>,
    pub bearing_error: Option<f64>,
    pub elevation_error: Option<f64>,
    /// Scalar location error used when no covariance is available
    pub expected_location_error: Option<f64>,
    /// Embedded ground truth, when the producer knows it
    pub truth_id: Option<TruthId>,
    pub side: Option<String>,
    pub iff: IffStatus,
    /// Non-fusible reports are mirrored into the local list, never fused
    pub fusible: bool,
    /// Candidate (not yet confirmed) report
    pub candidate: bool,
    pub purgeable: bool,
}

impl RawTrack {
    /// Report with a full 3-D position.
    pub fn cartesian(id: TrackId, sensor_id: SensorId, update_time: f64, position: Vec3) -> Self {
        Self::with_location(id, sensor_id, update_time, Location::Cartesian(position))
    }

    /// Bearing (and optionally elevation) report with no range.
    pub fn angle_only(
        id: TrackId,
        sensor_id: SensorId,
        update_time: f64,
        originator_location: Vec3,
        bearing: f64,
        elevation: Option<f64>,
    ) -> Self {
        let mut track = Self::with_location(
            id,
            sensor_id,
            update_time,
            Location::Spherical {
                bearing,
                elevation,
                range: None,
            },
        );
        track.originator_location = originator_location;
        track
    }

    fn with_location(id: TrackId, sensor_id: SensorId, update_time: f64, location: Location) -> Self {
        Self {
            id,
            sensor_id,
            kind: TrackKind::UnfilteredSensor,
            update_time,
            update_count: 0,
            originator_location: Vec3::zeros(),
            location,
            velocity: None,
            state_covariance: None,
            measurement_covariance: None,
            range_error: None,
            bearing_error: None,
            elevation_error: None,
            expected_location_error: None,
            truth_id: None,
            side: None,
            iff: IffStatus::Unknown,
            fusible: true,
            candidate: false,
            purgeable: true,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_truth(mut self, truth_id: TruthId) -> Self {
        self.truth_id = Some(truth_id);
        self
    }

    pub fn with_state_covariance(mut self, cov: Covariance) -> Self {
        self.state_covariance = Some(cov);
        self
    }

    pub fn with_measurement_covariance(mut self, cov: Covariance) -> Self {
        self.measurement_covariance = Some(cov);
        self
    }

    pub fn with_expected_location_error(mut self, error: f64) -> Self {
        self.expected_location_error = Some(error);
        self
    }

    pub fn with_side(mut self, side: impl Into<String>) -> Self {
        self.side = Some(side.into());
        self
    }

    /// Set the spherical measurement errors (1σ range in m, angles in rad).
    pub fn with_spherical_errors(mut self, range_error: f64, bearing_error: f64, elevation_error: f64) -> Self {
        self.range_error = Some(range_error);
        self.bearing_error = Some(bearing_error);
        self.elevation_error = Some(elevation_error);
        self
    }

    pub fn with_originator(mut self, location: Vec3) -> Self {
        self.originator_location = location;
        self
    }

    /// True when a 3-D position can be derived from the report.
    pub fn is_3d(&self) -> bool {
        self.reported_position().is_some()
    }

    /// Position at `update_time`, if derivable.
    pub fn reported_position(&self) -> Option<Vec3> {
        match &self.location {
            Location::Cartesian(p) => Some(*p),
            Location::Spherical {
                bearing,
                elevation,
                range: Some(range),
            } => Some(spherical_to_cartesian(
                &self.originator_location,
                *range,
                *bearing,
                elevation.unwrap_or(0.0),
            )),
            Location::Spherical { range: None, .. } => None,
        }
    }

    /// Position extrapolated to `sim_time` along the reported velocity.
    pub fn extrapolated_position_at(&self, sim_time: f64) -> Option<Vec3> {
        let position = self.reported_position()?;
        Some(match self.velocity {
            Some(v) => position + v * (sim_time - self.update_time),
            None => position,
        })
    }

    /// Slant range from the originator, if a 3-D position exists.
    pub fn range(&self) -> Option<f64> {
        match &self.location {
            Location::Spherical { range, .. } => *range,
            Location::Cartesian(p) => Some((p - self.originator_location).norm()),
        }
    }

    /// Positional covariance: state covariance, then measurement covariance,
    /// else one synthesized from the spherical error terms.
    pub fn position_covariance(&self) -> Option<Covariance> {
        if let Some(cov) = self.state_covariance {
            return Some(cov);
        }
        if let Some(cov) = self.measurement_covariance {
            return Some(cov);
        }
        let (range_error, bearing_error) = (self.range_error?, self.bearing_error?);
        let elevation_error = self.elevation_error.unwrap_or(bearing_error);
        let location = self.reported_position()?;
        Covariance::from_spherical_errors(
            &self.originator_location,
            &location,
            range_error,
            bearing_error,
            elevation_error,
        )
    }

    /// Scalar location error: explicit value, else from the covariance, else 0.
    pub fn expected_location_error(&self) -> f64 {
        if let Some(error) = self.expected_location_error {
            return error;
        }
        self.position_covariance()
            .map(|c| c.max_variance().max(0.0).sqrt())
            .unwrap_or(0.0)
    }

    /// 1σ position error from the spherical error terms at `range`.
    pub fn spherical_error_at(&self, range: f64) -> Option<f64> {
        let range_error = self.range_error?;
        let bearing_error = self.bearing_error?;
        let elevation_error = self.elevation_error.unwrap_or(0.0);
        Some(spherical_position_error(range, range_error, bearing_error, elevation_error))
    }

    /// Replace the data of this stored report with a newer one.
    pub(crate) fn replacement_update(&mut self, newer: &RawTrack) {
        let count = self.update_count;
        *self = newer.clone();
        self.update_count = count + 1;
    }
}

// ---------------------------------------------------------------------------
// LocalTrack
// ---------------------------------------------------------------------------

/// A fused track owned by the local track list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalTrack {
    pub id: TrackId,
    pub kind: TrackKind,
    /// Time of the most recent contributing data
    pub update_time: f64,
    pub start_time: f64,
    pub update_count: u32,
    pub location: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub state_covariance: Option<Covariance>,
    pub expected_location_error: Option<f64>,
    pub truth_id: Option<TruthId>,
    pub side: Option<String>,
    pub iff: IffStatus,
    /// Raw track this local track currently mirrors (single contributor or
    /// non-fusible copy)
    pub mirror_of: Option<TrackId>,
    pub fusible: bool,
    pub purgeable: bool,
    pub candidate: bool,
    /// Purge-eligible but held by a lock
    pub stale: bool,
    /// Fused positions, most recent last
    #[serde(skip)]
    pub history: VecDeque<(f64, Vec3)>,
    raw_track_ids: BTreeSet<TrackId>,
    use_count: u32,
}

impl LocalTrack {
    /// New local track seeded from the data of `raw`.
    pub fn from_raw(id: TrackId, raw: &RawTrack) -> Self {
        Self {
            id,
            kind: TrackKind::Processed,
            update_time: raw.update_time,
            start_time: raw.update_time,
            update_count: 0,
            location: raw.reported_position(),
            velocity: raw.velocity,
            state_covariance: raw.position_covariance(),
            expected_location_error: Some(raw.expected_location_error()),
            truth_id: raw.truth_id,
            side: raw.side.clone(),
            iff: raw.iff,
            mirror_of: Some(raw.id),
            fusible: true,
            purgeable: true,
            candidate: raw.candidate,
            stale: false,
            history: VecDeque::new(),
            raw_track_ids: BTreeSet::new(),
            use_count: 0,
        }
    }

    /// Add `raw_id` to the correlated set. Returns false if already present.
    pub fn correlate(&mut self, raw_id: TrackId) -> bool {
        self.raw_track_ids.insert(raw_id)
    }

    /// Remove `raw_id` from the correlated set. Returns false if absent.
    pub fn decorrelate(&mut self, raw_id: TrackId) -> bool {
        let removed = self.raw_track_ids.remove(&raw_id);
        if removed && self.mirror_of == Some(raw_id) {
            self.mirror_of = None;
        }
        removed
    }

    pub fn is_correlated(&self) -> bool {
        !self.raw_track_ids.is_empty()
    }

    pub fn is_correlated_with(&self, raw_id: TrackId) -> bool {
        self.raw_track_ids.contains(&raw_id)
    }

    /// Correlated raw ids in ascending order.
    pub fn raw_track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.raw_track_ids.iter().copied()
    }

    pub fn raw_track_count(&self) -> usize {
        self.raw_track_ids.len()
    }

    pub fn is_mirror_of(&self, raw_id: TrackId) -> bool {
        self.mirror_of == Some(raw_id)
    }

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    pub(crate) fn increment_use_count(&mut self) {
        self.use_count += 1;
    }

    pub(crate) fn decrement_use_count(&mut self) {
        self.use_count = self.use_count.saturating_sub(1);
    }

    pub fn extrapolated_position_at(&self, sim_time: f64) -> Option<Vec3> {
        let position = self.location?;
        Some(match self.velocity {
            Some(v) => position + v * (sim_time - self.update_time),
            None => position,
        })
    }

    pub fn position_covariance(&self) -> Option<Covariance> {
        self.state_covariance
    }

    pub fn expected_location_error(&self) -> f64 {
        if let Some(error) = self.expected_location_error {
            return error;
        }
        self.state_covariance
            .map(|c| c.max_variance().max(0.0).sqrt())
            .unwrap_or(0.0)
    }

    /// Overwrite kinematics and attributes with those of `raw`
    /// (used for non-fusible mirror tracks).
    pub(crate) fn replacement_update(&mut self, raw: &RawTrack) {
        self.update_time = raw.update_time;
        self.location = raw.reported_position();
        self.velocity = raw.velocity;
        self.state_covariance = raw.position_covariance();
        self.expected_location_error = Some(raw.expected_location_error());
        self.side = raw.side.clone();
        self.iff = raw.iff;
        if raw.truth_id.is_some() {
            self.truth_id = raw.truth_id;
        }
        self.update_count += 1;
    }

    /// Push the current position to the bounded history.
    pub fn push_history(&mut self) {
        if let Some(position) = self.location {
            if self.history.len() >= HISTORY_LEN {
                self.history.pop_front();
            }
            self.history.push_back((self.update_time, position));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn raw(n: u32) -> RawTrack {
        RawTrack::cartesian(TrackId::new(9, n), SensorId(1), 10.0, Vec3::new(100.0, 0.0, 0.0))
    }

    #[test]
    fn extrapolation_follows_velocity() {
        let r = raw(1).with_velocity(Vec3::new(10.0, -5.0, 0.0));
        let p = r.extrapolated_position_at(12.0).expect("3-D report");
        assert_abs_diff_eq!(p.x, 120.0);
        assert_abs_diff_eq!(p.y, -10.0);
    }

    #[test]
    fn angle_only_has_no_position() {
        let r = RawTrack::angle_only(TrackId::new(9, 2), SensorId(1), 0.0, Vec3::zeros(), 0.3, None);
        assert!(!r.is_3d());
        assert!(r.extrapolated_position_at(5.0).is_none());
        assert!(r.position_covariance().is_none());
    }

    #[test]
    fn ranged_spherical_report_is_3d() {
        let mut r = raw(3);
        r.location = Location::Spherical {
            bearing: 0.0,
            elevation: None,
            range: Some(500.0),
        };
        r.originator_location = Vec3::new(0.0, 100.0, 0.0);
        let p = r.reported_position().expect("ranged report");
        assert_abs_diff_eq!(p.x, 500.0);
        assert_abs_diff_eq!(p.y, 100.0);
        assert_eq!(r.range(), Some(500.0));
    }

    #[test]
    fn covariance_preference_order() {
        let state = Covariance::isotropic(5.0);
        let meas = Covariance::isotropic(50.0);
        let r = raw(4).with_measurement_covariance(meas).with_state_covariance(state);
        assert_eq!(r.position_covariance(), Some(state));
        let r = raw(5).with_measurement_covariance(meas);
        assert_eq!(r.position_covariance(), Some(meas));
        let r = raw(6).with_spherical_errors(10.0, 0.001, 0.001);
        assert!(r.position_covariance().is_some());
        assert!(raw(7).position_covariance().is_none());
    }

    #[test]
    fn local_track_correlated_set() {
        let r = raw(8);
        let mut local = LocalTrack::from_raw(TrackId::new(1, 1), &r);
        assert!(local.is_mirror_of(r.id));
        assert!(local.correlate(r.id));
        assert!(!local.correlate(r.id), "set semantics");
        assert!(local.is_correlated_with(r.id));
        assert!(local.decorrelate(r.id));
        assert!(!local.is_correlated());
        assert!(local.mirror_of.is_none());
    }

    #[test]
    fn replacement_update_bumps_count() {
        let mut stored = raw(9);
        let mut newer = raw(9);
        newer.update_time = 11.0;
        stored.replacement_update(&newer);
        assert_eq!(stored.update_count, 1);
        assert_abs_diff_eq!(stored.update_time, 11.0);
    }
}
