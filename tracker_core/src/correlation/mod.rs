//! Correlation strategies: decide which local track (if any) a raw report
//! belongs to.
//!
//! # Contract
//! A strategy sees the raw and local track lists read-only through a
//! [`CorrelationContext`]. It may keep private bookkeeping keyed by track id,
//! but it never mutates the lists. Strategies that need to move other raw
//! tracks between local tracks (cluster re-assignment) queue
//! [`CorrelationCommand`]s on the context; the track manager applies them in
//! order after `correlate` returns.
//!
//! # Variants
//! - [`PerfectCorrelation`]: match on embedded truth identity.
//! - [`TruthCorrelation`]: resolve the nearest truth platform, then match.
//! - [`NearestNeighborCorrelation`]: covariance-scaled nearest neighbour with
//!   turning hysteresis and coasting.
//! - [`ClusterCorrelation`]: periodic complete-linkage re-clustering.

pub mod cluster;
pub mod nearest_neighbor;
pub mod perfect;
pub mod truth;

pub use cluster::{ClusterConfig, ClusterCorrelation};
pub use nearest_neighbor::{confidence_sigma, NearestNeighborConfig, NearestNeighborCorrelation};
pub use perfect::PerfectCorrelation;
pub use truth::{TruthConfig, TruthCorrelation};

use crate::{
    config::ConfigError,
    track::RawTrack,
    track_list::{LocalTrackList, RawTrackList},
    types::{TrackId, TruthId, Vec3},
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Truth data
// ---------------------------------------------------------------------------

/// Ground-truth state of one simulated platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthPlatform {
    pub id: TruthId,
    pub name: String,
    pub side: Option<String>,
    /// Position at `time`
    pub location: Vec3,
    pub velocity: Vec3,
    pub time: f64,
}

impl TruthPlatform {
    pub fn location_at(&self, sim_time: f64) -> Vec3 {
        self.location + self.velocity * (sim_time - self.time)
    }
}

/// Where truth-based strategies look up platform states.
pub trait TruthSource {
    fn platforms(&self) -> &[TruthPlatform];

    fn platform(&self, id: TruthId) -> Option<&TruthPlatform> {
        self.platforms().iter().find(|p| p.id == id)
    }
}

impl TruthSource for Vec<TruthPlatform> {
    fn platforms(&self) -> &[TruthPlatform] {
        self
    }
}

impl TruthSource for [TruthPlatform] {
    fn platforms(&self) -> &[TruthPlatform] {
        self
    }
}

// ---------------------------------------------------------------------------
// Context and commands
// ---------------------------------------------------------------------------

/// List mutation requested by a strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorrelationCommand {
    Correlate { raw: TrackId, local: TrackId },
    Decorrelate { raw: TrackId, local: TrackId },
    /// Create a local track seeded from `members[0]` and correlate all members
    Initiate { members: Vec<TrackId> },
}

pub struct CorrelationContext<'a> {
    pub raw_tracks: &'a RawTrackList,
    pub local_tracks: &'a LocalTrackList,
    pub truth: Option<&'a dyn TruthSource>,
    /// Side of the owning entity
    pub own_side: Option<&'a str>,
    commands: Vec<CorrelationCommand>,
}

impl<'a> CorrelationContext<'a> {
    pub fn new(raw_tracks: &'a RawTrackList, local_tracks: &'a LocalTrackList) -> Self {
        Self {
            raw_tracks,
            local_tracks,
            truth: None,
            own_side: None,
            commands: Vec::new(),
        }
    }

    pub fn with_truth(mut self, truth: Option<&'a dyn TruthSource>) -> Self {
        self.truth = truth;
        self
    }

    pub fn with_side(mut self, side: Option<&'a str>) -> Self {
        self.own_side = side;
        self
    }

    pub fn push(&mut self, command: CorrelationCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[CorrelationCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<CorrelationCommand> {
        self.commands
    }
}

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

pub trait CorrelationStrategy {
    fn name(&self) -> &'static str;

    /// Called when the strategy becomes active. Returns the time of its first
    /// periodic update, if it has one.
    fn initialize(&mut self, _sim_time: f64) -> Option<f64> {
        None
    }

    /// Local track `raw` belongs to, or `None` for no match.
    fn correlate(&mut self, sim_time: f64, raw: &RawTrack, ctx: &mut CorrelationContext<'_>) -> Option<TrackId>;

    /// `raw_id` is no longer attached to any local track; forget it.
    fn decorrelate(&mut self, raw_id: TrackId);

    /// The manager created `local_id` from (or including) `raw_id`.
    fn new_track_correlation(&mut self, _raw_id: TrackId, _local_id: TrackId) {}

    /// Local track this strategy believes `raw_id` is correlated with.
    fn correlated_track_id(&self, raw_id: TrackId) -> Option<TrackId>;

    /// `local_id` left the local track list.
    fn local_track_dropped(&mut self, _local_id: TrackId) {}

    /// Periodic work. Returns the next time it should run.
    fn scheduled_update(&mut self, _sim_time: f64, _ctx: &mut CorrelationContext<'_>) -> Option<f64> {
        None
    }
}

// ---------------------------------------------------------------------------
// Closed set of strategies
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum Correlator {
    Perfect(PerfectCorrelation),
    Truth(TruthCorrelation),
    NearestNeighbor(NearestNeighborCorrelation),
    Cluster(ClusterCorrelation),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            Correlator::Perfect($s) => $body,
            Correlator::Truth($s) => $body,
            Correlator::NearestNeighbor($s) => $body,
            Correlator::Cluster($s) => $body,
        }
    };
}

impl CorrelationStrategy for Correlator {
    fn name(&self) -> &'static str {
        dispatch!(self, s => s.name())
    }

    fn initialize(&mut self, sim_time: f64) -> Option<f64> {
        dispatch!(self, s => s.initialize(sim_time))
    }

    fn correlate(&mut self, sim_time: f64, raw: &RawTrack, ctx: &mut CorrelationContext<'_>) -> Option<TrackId> {
        dispatch!(self, s => s.correlate(sim_time, raw, ctx))
    }

    fn decorrelate(&mut self, raw_id: TrackId) {
        dispatch!(self, s => s.decorrelate(raw_id))
    }

    fn new_track_correlation(&mut self, raw_id: TrackId, local_id: TrackId) {
        dispatch!(self, s => s.new_track_correlation(raw_id, local_id))
    }

    fn correlated_track_id(&self, raw_id: TrackId) -> Option<TrackId> {
        dispatch!(self, s => s.correlated_track_id(raw_id))
    }

    fn local_track_dropped(&mut self, local_id: TrackId) {
        dispatch!(self, s => s.local_track_dropped(local_id))
    }

    fn scheduled_update(&mut self, sim_time: f64, ctx: &mut CorrelationContext<'_>) -> Option<f64> {
        dispatch!(self, s => s.scheduled_update(sim_time, ctx))
    }
}

/// Strategy selection plus its parameters, as read from configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrelationMethod {
    Perfect,
    Truth(TruthConfig),
    NearestNeighbor(NearestNeighborConfig),
    Cluster(ClusterConfig),
}

impl Default for CorrelationMethod {
    fn default() -> Self {
        CorrelationMethod::NearestNeighbor(NearestNeighborConfig::default())
    }
}

impl CorrelationMethod {
    /// Names accepted by `correlation_method`.
    pub const NAMES: [&'static str; 4] = ["perfect", "truth", "nearest_neighbor", "cluster"];

    /// Default parameters for the named strategy.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "perfect" => Some(CorrelationMethod::Perfect),
            "truth" => Some(CorrelationMethod::Truth(TruthConfig::default())),
            "nearest_neighbor" => Some(CorrelationMethod::NearestNeighbor(NearestNeighborConfig::default())),
            "cluster" => Some(CorrelationMethod::Cluster(ClusterConfig::default())),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CorrelationMethod::Perfect => "perfect",
            CorrelationMethod::Truth(_) => "truth",
            CorrelationMethod::NearestNeighbor(_) => "nearest_neighbor",
            CorrelationMethod::Cluster(_) => "cluster",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CorrelationMethod::Perfect => Ok(()),
            CorrelationMethod::Truth(c) => c.validate(),
            CorrelationMethod::NearestNeighbor(c) => c.validate(),
            CorrelationMethod::Cluster(c) => c.validate(),
        }
    }

    pub fn build(&self) -> Correlator {
        match self {
            CorrelationMethod::Perfect => Correlator::Perfect(PerfectCorrelation::new()),
            CorrelationMethod::Truth(c) => Correlator::Truth(TruthCorrelation::new(c.clone())),
            CorrelationMethod::NearestNeighbor(c) => {
                Correlator::NearestNeighbor(NearestNeighborCorrelation::new(c.clone()))
            }
            CorrelationMethod::Cluster(c) => Correlator::Cluster(ClusterCorrelation::new(c.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for name in CorrelationMethod::NAMES {
            let method = CorrelationMethod::from_name(name).expect("known name");
            assert_eq!(method.name(), name);
            assert_eq!(method.build().name(), name);
            assert!(method.validate().is_ok());
        }
        assert!(CorrelationMethod::from_name("hungarian").is_none());
    }

    #[test]
    fn truth_platform_extrapolates() {
        let p = TruthPlatform {
            id: TruthId(1),
            name: "red-1".into(),
            side: Some("red".into()),
            location: Vec3::new(0.0, 0.0, 1000.0),
            velocity: Vec3::new(100.0, 0.0, 0.0),
            time: 10.0,
        };
        assert_eq!(p.location_at(12.0), Vec3::new(200.0, 0.0, 1000.0));
        let source = vec![p];
        assert!(source.platform(TruthId(1)).is_some());
        assert!(source.platform(TruthId(2)).is_none());
    }
}
