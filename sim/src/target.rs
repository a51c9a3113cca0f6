//! Truth platforms and their motion.
//!
//! Each target carries its true position and velocity plus a `MotionSpec`
//! describing how it moves. The driver steps every target forward in time and
//! snapshots them as [`TruthPlatform`]s for truth-based correlation and
//! metrics.

use serde::{Deserialize, Serialize};
use tracker_core::{TruthId, TruthPlatform, Vec3};

/// How a target moves between steps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// No acceleration.
    ConstantVelocity,
    /// Constant turn rate in the horizontal plane. `omega` in rad/s.
    ConstantTurn { omega: f64 },
    /// Constant acceleration in m/s².
    ConstantAccel { ax: f64, ay: f64, az: f64 },
    /// Switch motion model at given sim times.
    /// `segments` is sorted by start time; the active spec is the last one
    /// whose start is <= the current time.
    Segmented { segments: Vec<(f64, Box<MotionSpec>)> },
}

/// A simulated platform with ground-truth kinematics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    pub id: TruthId,
    pub name: String,
    pub side: Option<String>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub motion: MotionSpec,
    /// No reports before this time
    pub appear_at: Option<f64>,
    /// No reports from this time on
    pub disappear_at: Option<f64>,
}

impl Target {
    pub fn new(id: u64, position: Vec3, velocity: Vec3, motion: MotionSpec) -> Self {
        Self {
            id: TruthId(id),
            name: format!("target-{id}"),
            side: None,
            position,
            velocity,
            motion,
            appear_at: None,
            disappear_at: None,
        }
    }

    pub fn with_side(mut self, side: impl Into<String>) -> Self {
        self.side = Some(side.into());
        self
    }

    pub fn active_between(mut self, appear_at: Option<f64>, disappear_at: Option<f64>) -> Self {
        self.appear_at = appear_at;
        self.disappear_at = disappear_at;
        self
    }

    /// Propagate the true state by `dt` seconds from time `t`.
    pub fn step(&mut self, t: f64, dt: f64) {
        let (position, velocity) = propagate(&self.motion, t, dt, self.position, self.velocity);
        self.position = position;
        self.velocity = velocity;
    }

    pub fn is_active(&self, t: f64) -> bool {
        if self.appear_at.is_some_and(|appear| t < appear) {
            return false;
        }
        if self.disappear_at.is_some_and(|disappear| t >= disappear) {
            return false;
        }
        true
    }

    /// Snapshot of the current state, valid at `time`.
    pub fn truth_platform(&self, time: f64) -> TruthPlatform {
        TruthPlatform {
            id: self.id,
            name: self.name.clone(),
            side: self.side.clone(),
            location: self.position,
            velocity: self.velocity,
            time,
        }
    }
}

fn propagate(motion: &MotionSpec, t: f64, dt: f64, p: Vec3, v: Vec3) -> (Vec3, Vec3) {
    match motion {
        MotionSpec::ConstantVelocity => (p + v * dt, v),
        MotionSpec::ConstantTurn { omega } => {
            let speed = v.xy().norm();
            let heading = v.y.atan2(v.x);
            let turned = heading + omega * dt;
            let moved = Vec3::new(speed * heading.cos() * dt, speed * heading.sin() * dt, v.z * dt);
            (p + moved, Vec3::new(speed * turned.cos(), speed * turned.sin(), v.z))
        }
        MotionSpec::ConstantAccel { ax, ay, az } => {
            let a = Vec3::new(*ax, *ay, *az);
            (p + v * dt + a * (0.5 * dt * dt), v + a * dt)
        }
        MotionSpec::Segmented { segments } => {
            match segments.iter().filter(|(start, _)| *start <= t).last() {
                Some((_, spec)) => propagate(spec, t, dt, p, v),
                None => (p + v * dt, v),
            }
        }
    }
}

/// Truth snapshot of every target active at `time`.
pub fn truth_snapshot(targets: &[Target], time: f64) -> Vec<TruthPlatform> {
    targets
        .iter()
        .filter(|t| t.is_active(time))
        .map(|t| t.truth_platform(time))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
