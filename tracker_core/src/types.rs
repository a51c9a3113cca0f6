//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: f64 throughout (positions are metres in a flat world frame).
// ---------------------------------------------------------------------------

/// 3-D position or velocity vector [x, y, z]
pub type Vec3 = Vector3<f64>;

/// 3×3 matrix (positional covariance, rotations)
pub type Mat3 = Matrix3<f64>;

// ---------------------------------------------------------------------------
// Identifier types: newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

/// Identifies a raw or local track: the owning entity plus a sequence number
/// local to that owner.
///
/// The all-zero value is the null identifier. Ordering is lexicographic on
/// `(owner, number)` so iteration over id-keyed maps is deterministic.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrackId {
    pub owner: u32,
    pub number: u32,
}

impl TrackId {
    /// The null identifier.
    pub const NULL: TrackId = TrackId {
        owner: 0,
        number: 0,
    };

    pub const fn new(owner: u32, number: u32) -> Self {
        Self { owner, number }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// Which sensor produced a raw report.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SensorId(pub u32);

/// Identity of a ground-truth platform (simulation index).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TruthId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.number)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

impl fmt::Display for TruthId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Track attributes used by correlation policy
// ---------------------------------------------------------------------------

/// Identify-friend-or-foe status carried by a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IffStatus {
    #[default]
    Unknown,
    Ambiguous,
    Foe,
    Friend,
    Neutral,
}

/// Kind of track, mirroring the producer of the data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Direct sensor report, unfiltered
    #[default]
    UnfilteredSensor,
    /// Sensor report already filtered by the sensor
    FilteredSensor,
    /// Produced by a track manager (local tracks)
    Processed,
    /// Pre-briefed / injected track
    Predefined,
}
