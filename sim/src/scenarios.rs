//! Scenario definitions.
//!
//! Each scenario is a named configuration of targets and sensors.
//! All scenarios are deterministic given the same seed.

use crate::{
    sensor::{ReportMode, SimSensor},
    target::{MotionSpec, Target},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use tracker_core::Vec3;

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// 5 targets, 2 radars, straight lines and one gentle turn
    Simple,
    /// 2 targets crossing close together, 3 radars
    Crossing,
    /// 50 targets converging on a point, 3 radars
    DenseCrossing,
    /// 4 targets, one radar plus a passive angle-only sensor
    Passive,
    /// 300 targets, 4 radars with candidate start-up reports
    Stress,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    /// Seconds
    pub duration: f64,
    /// Simulation step (s) between report collections
    pub sim_dt: f64,
    pub targets: Vec<Target>,
    pub sensors: Vec<SimSensor>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Simple => Self::simple(seed),
            ScenarioKind::Crossing => Self::crossing(seed),
            ScenarioKind::DenseCrossing => Self::dense_crossing(seed),
            ScenarioKind::Passive => Self::passive(seed),
            ScenarioKind::Stress => Self::stress(seed),
        }
    }

    // -----------------------------------------------------------------------
    // Simple
    // -----------------------------------------------------------------------
    fn simple(seed: u64) -> Self {
        let cv = || MotionSpec::ConstantVelocity;
        let targets = vec![
            Target::new(1, Vec3::new(-20_000.0, 0.0, 3_000.0), Vec3::new(150.0, 0.0, 0.0), cv()),
            Target::new(2, Vec3::new(0.0, -20_000.0, 4_000.0), Vec3::new(0.0, 150.0, 0.0), cv()),
            Target::new(3, Vec3::new(10_000.0, 10_000.0, 6_000.0), Vec3::new(-80.0, -80.0, 0.0), cv()),
            Target::new(
                4,
                Vec3::new(-5_000.0, 15_000.0, 2_000.0),
                Vec3::new(100.0, -50.0, 0.0),
                MotionSpec::ConstantTurn { omega: 0.01 },
            ),
            Target::new(5, Vec3::new(15_000.0, -5_000.0, 8_000.0), Vec3::new(-50.0, 120.0, 0.0), cv()),
        ];

        let sensors = vec![
            SimSensor::new(10, Vec3::new(-10_000.0, -10_000.0, 0.0), 1.0)
                .with_errors(50.0, 0.002, 0.002)
                .with_detection(0.9, 150_000.0),
            SimSensor::new(11, Vec3::new(10_000.0, 10_000.0, 0.0), 2.0)
                .with_errors(80.0, 0.003, 0.003)
                .with_detection(0.85, 150_000.0),
        ];

        Scenario {
            name: "simple".into(),
            seed,
            duration: 120.0,
            sim_dt: 0.5,
            targets,
            sensors,
        }
    }

    // -----------------------------------------------------------------------
    // Crossing
    // -----------------------------------------------------------------------
    fn crossing(seed: u64) -> Self {
        // Both targets pass within a few hundred meters of the origin at t = 60.
        let targets = vec![
            Target::new(1, Vec3::new(-12_000.0, -150.0, 5_000.0), Vec3::new(200.0, 0.0, 0.0), MotionSpec::ConstantVelocity)
                .with_side("red"),
            Target::new(2, Vec3::new(12_000.0, 150.0, 5_200.0), Vec3::new(-200.0, 0.0, 0.0), MotionSpec::ConstantVelocity)
                .with_side("red"),
        ];

        let sensors = vec![
            SimSensor::new(10, Vec3::new(0.0, -30_000.0, 0.0), 1.0).with_errors(40.0, 0.002, 0.002),
            SimSensor::new(11, Vec3::new(-25_000.0, 20_000.0, 0.0), 1.5).with_errors(60.0, 0.003, 0.003),
            SimSensor::new(12, Vec3::new(25_000.0, 20_000.0, 0.0), 2.0)
                .with_errors(100.0, 0.004, 0.004)
                .with_mode(ReportMode::Spherical),
        ];

        Scenario {
            name: "crossing".into(),
            seed,
            duration: 120.0,
            sim_dt: 0.5,
            targets,
            sensors,
        }
    }

    // -----------------------------------------------------------------------
    // Dense crossing
    // -----------------------------------------------------------------------
    fn dense_crossing(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));

        let targets = (0..50u64)
            .map(|i| {
                let angle = i as f64 * TAU / 50.0;
                let r = 25_000.0_f64;
                let speed = 100.0 + rng.gen::<f64>() * 150.0;
                let heading = angle + PI; // toward the centre
                let altitude = 2_000.0 + rng.gen::<f64>() * 8_000.0;
                Target::new(
                    i + 1,
                    Vec3::new(r * angle.cos(), r * angle.sin(), altitude),
                    Vec3::new(speed * heading.cos(), speed * heading.sin(), 0.0),
                    MotionSpec::ConstantVelocity,
                )
            })
            .collect();

        let sensors = vec![
            SimSensor::new(10, Vec3::zeros(), 1.0)
                .with_errors(50.0, 0.002, 0.002)
                .with_detection(0.85, 150_000.0),
            SimSensor::new(11, Vec3::new(-15_000.0, 0.0, 0.0), 2.0)
                .with_errors(75.0, 0.003, 0.003)
                .with_detection(0.8, 150_000.0),
            SimSensor::new(12, Vec3::new(15_000.0, 0.0, 0.0), 1.5)
                .with_errors(40.0, 0.002, 0.002)
                .with_detection(0.88, 150_000.0),
        ];

        Scenario {
            name: "dense_crossing".into(),
            seed,
            duration: 300.0,
            sim_dt: 0.5,
            targets,
            sensors,
        }
    }

    // -----------------------------------------------------------------------
    // Passive
    // -----------------------------------------------------------------------
    fn passive(seed: u64) -> Self {
        let targets = (0..4u64)
            .map(|i| {
                let bearing = 0.4 + 0.5 * i as f64;
                let position = Vec3::new(40_000.0 * bearing.cos(), 40_000.0 * bearing.sin(), 6_000.0);
                Target::new(i + 1, position, Vec3::new(-180.0, 40.0, 0.0), MotionSpec::ConstantTurn { omega: 0.005 })
                    .with_side("red")
            })
            .collect();

        let sensors = vec![
            SimSensor::new(10, Vec3::zeros(), 2.0).with_errors(60.0, 0.002, 0.002),
            SimSensor::new(20, Vec3::new(5_000.0, -5_000.0, 0.0), 1.0)
                .with_errors(0.0, 0.01, 0.01)
                .with_mode(ReportMode::AngleOnly),
        ];

        Scenario {
            name: "passive".into(),
            seed,
            duration: 120.0,
            sim_dt: 0.5,
            targets,
            sensors,
        }
    }

    // -----------------------------------------------------------------------
    // Stress
    // -----------------------------------------------------------------------
    fn stress(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(2));

        let targets = (0..300u64)
            .map(|i| {
                let position = Vec3::new(
                    rng.gen_range(-80_000.0..80_000.0),
                    rng.gen_range(-80_000.0..80_000.0),
                    rng.gen_range(1_000.0..12_000.0),
                );
                let heading = rng.gen::<f64>() * TAU;
                let speed = rng.gen_range(80.0..300.0);
                let motion = if i % 5 == 0 {
                    MotionSpec::Segmented {
                        segments: vec![
                            (0.0, Box::new(MotionSpec::ConstantVelocity)),
                            (rng.gen_range(20.0..80.0), Box::new(MotionSpec::ConstantTurn { omega: 0.03 })),
                        ],
                    }
                } else {
                    MotionSpec::ConstantVelocity
                };
                Target::new(i + 1, position, Vec3::new(speed * heading.cos(), speed * heading.sin(), 0.0), motion)
            })
            .collect();

        let sensors = [(-50_000.0, -50_000.0), (50_000.0, -50_000.0), (50_000.0, 50_000.0), (-50_000.0, 50_000.0)]
            .into_iter()
            .zip(10u32..)
            .map(|((x, y), id)| {
                SimSensor::new(id, Vec3::new(x, y, 0.0), 2.0)
                    .with_errors(75.0, 0.003, 0.003)
                    .with_detection(0.9, 120_000.0)
                    .with_candidates(2)
            })
            .collect();

        Scenario {
            name: "stress".into(),
            seed,
            duration: 120.0,
            sim_dt: 1.0,
            targets,
            sensors,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
