//! `tracker_core`: Track correlation and local-track management.
//!
//! # Module layout
//! - [`types`]: Identifiers, track kinds, vector aliases
//! - [`geometry`]: Covariance rotation and spherical error helpers
//! - [`track`]: Raw tracks (reports) and local tracks (fused)
//! - [`track_list`]: Insertion-ordered track container with id lookup
//! - [`clustering`]: Hierarchical and k-means clustering, proximity matrix
//! - [`correlation`]: Perfect, truth, nearest-neighbour and cluster strategies
//! - [`fusion`]: Replacement and covariance-weighted fusion
//! - [`scheduler`]: Time-ordered action queue
//! - [`observer`]: Lifecycle notifications
//! - [`config`]: Track manager configuration and text reader
//! - [`track_manager`]: Report ingestion, lifecycle policy, purge and locks
//! - [`metrics`]: Purity, fragmentation, reassignments, RMSE

pub mod clustering;
pub mod config;
pub mod correlation;
pub mod fusion;
pub mod geometry;
pub mod metrics;
pub mod observer;
pub mod scheduler;
pub mod track;
pub mod track_list;
pub mod track_manager;
pub mod types;

pub use config::{ConfigError, TrackManagerConfig};
pub use correlation::{CorrelationMethod, CorrelationStrategy, Correlator, TruthPlatform, TruthSource};
pub use fusion::FusionMethod;
pub use observer::{EventCounts, RecordingObserver, TrackEvent, TrackObserver};
pub use track::{LocalTrack, Location, RawTrack};
pub use track_list::{LocalTrackList, RawTrackList, TrackList};
pub use track_manager::TrackManager;
pub use types::{IffStatus, SensorId, TrackId, TrackKind, TruthId, Vec3};
