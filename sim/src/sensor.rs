//! Sensor simulator producing raw track reports.
//!
//! Each sensor reports at a fixed interval with:
//! - uniform range/bearing/elevation noise scaled to the configured 1σ errors
//! - miss probability (1 - P_D)
//! - a stable raw track number per target
//! - optional embedded truth, candidate start-up reports and angle-only output

use crate::target::Target;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracker_core::{
    geometry::{spherical_to_cartesian, Covariance},
    Location, RawTrack, SensorId, TrackId, TrackKind, TruthId, Vec3,
};
use tracing::trace;

/// What a sensor puts in its reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportMode {
    /// Filtered world-frame position, velocity and state covariance
    #[default]
    Cartesian,
    /// Range, bearing and elevation from the sensor, with spherical errors
    Spherical,
    /// Bearing and elevation only; no 3-D solution
    AngleOnly,
}

/// One configured sensor in the simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimSensor {
    pub id: SensorId,
    /// Owner field of the raw track ids this sensor reports
    pub owner: u32,
    pub location: Vec3,
    /// Seconds between reports
    pub update_interval: f64,
    pub p_detection: f64,
    pub max_range: f64,
    /// 1σ errors (m, rad, rad)
    pub range_error: f64,
    pub bearing_error: f64,
    pub elevation_error: f64,
    pub mode: ReportMode,
    /// Stamp reports with the target's truth id
    pub embed_truth: bool,
    /// First reports of each track are flagged as candidates
    pub candidate_reports: u32,
    pub fusible: bool,
    pub side: Option<String>,
    /// Next scheduled report time
    pub next_report_time: f64,
    #[serde(skip)]
    track_numbers: BTreeMap<TruthId, (u32, u32)>,
}

impl SimSensor {
    pub fn new(id: u32, location: Vec3, update_interval: f64) -> Self {
        Self {
            id: SensorId(id),
            owner: id,
            location,
            update_interval,
            p_detection: 0.9,
            max_range: 150_000.0,
            range_error: 50.0,
            bearing_error: 0.002,
            elevation_error: 0.002,
            mode: ReportMode::Cartesian,
            embed_truth: true,
            candidate_reports: 0,
            fusible: true,
            side: None,
            next_report_time: 0.0,
            track_numbers: BTreeMap::new(),
        }
    }

    pub fn with_errors(mut self, range_error: f64, bearing_error: f64, elevation_error: f64) -> Self {
        self.range_error = range_error;
        self.bearing_error = bearing_error;
        self.elevation_error = elevation_error;
        self
    }

    pub fn with_mode(mut self, mode: ReportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_detection(mut self, p_detection: f64, max_range: f64) -> Self {
        self.p_detection = p_detection;
        self.max_range = max_range;
        self
    }

    pub fn with_candidates(mut self, reports: u32) -> Self {
        self.candidate_reports = reports;
        self
    }

    pub fn without_truth(mut self) -> Self {
        self.embed_truth = false;
        self
    }

    /// True if this sensor should report at the current simulation time.
    pub fn should_report(&self, t: f64) -> bool {
        t >= self.next_report_time
    }

    /// Advance the schedule by one report interval.
    pub fn advance_schedule(&mut self) {
        self.next_report_time += self.update_interval;
    }

    /// Stable raw track id for `target`, plus how many reports it has had.
    fn track_for(&mut self, target: TruthId) -> (TrackId, u32) {
        let next_number = self.track_numbers.len() as u32 + 1;
        let entry = self.track_numbers.entry(target).or_insert((next_number, 0));
        let reports = entry.1;
        entry.1 += 1;
        (TrackId::new(self.owner, entry.0), reports)
    }
}

/// Generates raw track reports from a set of targets.
pub struct SensorSimulator {
    pub sensors: Vec<SimSensor>,
    rng: ChaCha8Rng,
}

impl SensorSimulator {
    pub fn new(sensors: Vec<SimSensor>, seed: u64) -> Self {
        Self {
            sensors,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// All reports due at or before `sim_time`, in sensor order.
    pub fn generate_reports(&mut self, targets: &[Target], sim_time: f64) -> Vec<RawTrack> {
        let mut reports = Vec::new();

        for sensor in &mut self.sensors {
            while sensor.should_report(sim_time) {
                let report_time = sensor.next_report_time;
                sensor.advance_schedule();

                for target in targets {
                    if !target.is_active(report_time) {
                        continue;
                    }
                    let truth = target.truth_platform(sim_time).location_at(report_time);
                    let los = truth - sensor.location;
                    let range = los.norm();
                    if range > sensor.max_range || range <= 0.0 {
                        continue;
                    }
                    // Miss detection?
                    if self.rng.gen::<f64>() > sensor.p_detection {
                        continue;
                    }

                    let noisy_range = range + noise(&mut self.rng, sensor.range_error);
                    let bearing = los.y.atan2(los.x) + noise(&mut self.rng, sensor.bearing_error);
                    let elevation = (los.z / range).asin() + noise(&mut self.rng, sensor.elevation_error);

                    let (id, count) = sensor.track_for(target.id);
                    let mut report = build_report(sensor, id, report_time, noisy_range, bearing, elevation, target);
                    report.update_count = count;
                    report.candidate = count < sensor.candidate_reports;
                    trace!(sensor = %sensor.id, raw = %id, t = report_time, "report");
                    reports.push(report);
                }
            }
        }

        reports
    }
}

fn build_report(
    sensor: &SimSensor,
    id: TrackId,
    report_time: f64,
    range: f64,
    bearing: f64,
    elevation: f64,
    target: &Target,
) -> RawTrack {
    let mut report = match sensor.mode {
        ReportMode::Cartesian => {
            let position = spherical_to_cartesian(&sensor.location, range, bearing, elevation);
            let mut report = RawTrack::cartesian(id, sensor.id, report_time, position)
                .with_originator(sensor.location)
                .with_velocity(target.velocity);
            report.kind = TrackKind::FilteredSensor;
            report.state_covariance = Covariance::from_spherical_errors(
                &sensor.location,
                &position,
                sensor.range_error,
                sensor.bearing_error,
                sensor.elevation_error,
            );
            report
        }
        ReportMode::Spherical => {
            let mut report = RawTrack::angle_only(id, sensor.id, report_time, sensor.location, bearing, Some(elevation));
            report.location = Location::Spherical {
                bearing,
                elevation: Some(elevation),
                range: Some(range),
            };
            report.with_spherical_errors(sensor.range_error, sensor.bearing_error, sensor.elevation_error)
        }
        ReportMode::AngleOnly => {
            RawTrack::angle_only(id, sensor.id, report_time, sensor.location, bearing, Some(elevation))
        }
    };
    report.fusible = sensor.fusible;
    report.side = sensor.side.clone();
    if sensor.embed_truth {
        report.truth_id = Some(target.id);
    }
    report
}

/// Zero-mean uniform noise with standard deviation `sigma`.
fn noise(rng: &mut ChaCha8Rng, sigma: f64) -> f64 {
    (rng.gen::<f64>() * 2.0 - 1.0) * sigma * 3f64.sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MotionSpec;

    fn targets() -> Vec<Target> {
        vec![
            Target::new(1, Vec3::new(20_000.0, 0.0, 3_000.0), Vec3::new(-150.0, 0.0, 0.0), MotionSpec::ConstantVelocity),
            Target::new(2, Vec3::new(0.0, 30_000.0, 5_000.0), Vec3::new(0.0, -200.0, 0.0), MotionSpec::ConstantVelocity),
        ]
    }

    fn sensor(id: u32) -> SimSensor {
        SimSensor::new(id, Vec3::zeros(), 1.0).with_detection(1.0, 100_000.0)
    }

    #[test]
    fn same_seed_same_reports() {
        let run = |seed| {
            let mut sim = SensorSimulator::new(vec![sensor(10), sensor(11)], seed);
            sim.generate_reports(&targets(), 0.0)
                .iter()
                .filter_map(RawTrack::reported_position)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn track_numbers_are_stable_per_target() {
        let mut sim = SensorSimulator::new(vec![sensor(10)], 1);
        let first: Vec<_> = sim.generate_reports(&targets(), 0.0).iter().map(|r| (r.id, r.truth_id)).collect();
        let second: Vec<_> = sim.generate_reports(&targets(), 1.0).iter().map(|r| (r.id, r.truth_id)).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(first[0].0, TrackId::new(10, 1));
    }

    #[test]
    fn catches_up_on_missed_intervals() {
        let mut sim = SensorSimulator::new(vec![sensor(10)], 1);
        let reports = sim.generate_reports(&targets(), 2.5);
        let times: Vec<f64> = reports.iter().map(|r| r.update_time).collect();
        assert_eq!(times, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn angle_only_reports_have_no_position() {
        let mut sim = SensorSimulator::new(vec![sensor(10).with_mode(ReportMode::AngleOnly).without_truth()], 3);
        let reports = sim.generate_reports(&targets(), 0.0);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| !r.is_3d() && r.truth_id.is_none()));
    }

    #[test]
    fn out_of_range_targets_are_not_reported() {
        let mut sim = SensorSimulator::new(vec![sensor(10).with_detection(1.0, 25_000.0)], 3);
        let reports = sim.generate_reports(&targets(), 0.0);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].truth_id, Some(TruthId(1)));
    }

    #[test]
    fn first_reports_are_candidates() {
        let mut sim = SensorSimulator::new(vec![sensor(10).with_candidates(2)], 3);
        let flags: Vec<bool> = (0..4)
            .flat_map(|t| sim.generate_reports(&targets()[..1], f64::from(t)))
            .map(|r| r.candidate)
            .collect();
        assert_eq!(flags, vec![true, true, false, false]);
    }
}
