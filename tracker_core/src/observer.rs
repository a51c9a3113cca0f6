//! Lifecycle notifications emitted by the track manager.
//!
//! Observers receive every callback with the simulation time it happened at.
//! All methods default to no-ops so an observer implements only what it
//! needs.

use crate::{
    track::{LocalTrack, RawTrack},
    types::TrackId,
};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, rc::Rc};

pub trait TrackObserver {
    /// A new local track was created. `raw` is the report it was seeded from,
    /// absent for pre-briefed tracks.
    fn local_track_initiated(&mut self, _sim_time: f64, _local: &LocalTrack, _raw: Option<&RawTrack>) {}

    /// `raw` was fused into `local`.
    fn local_track_updated(&mut self, _sim_time: f64, _local: &LocalTrack, _raw: &RawTrack) {}

    fn local_track_correlated(&mut self, _sim_time: f64, _local: &LocalTrack, _raw_id: TrackId) {}

    fn local_track_decorrelated(&mut self, _sim_time: f64, _local: &LocalTrack, _raw_id: TrackId) {}

    fn local_track_dropped(&mut self, _sim_time: f64, _local: &LocalTrack) {}

    fn candidate_promoted(&mut self, _sim_time: f64, _local: &LocalTrack) {}

    fn raw_track_received(&mut self, _sim_time: f64, _raw: &RawTrack) {}

    fn raw_track_dropped(&mut self, _sim_time: f64, _raw: &RawTrack) {}

    /// `None` when the current target was cleared.
    fn current_target_changed(&mut self, _sim_time: f64, _target: Option<&LocalTrack>) {}

    fn track_manager_replaced(&mut self, _sim_time: f64) {}
}

/// Flattened notification, as recorded by [`RecordingObserver`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrackEvent {
    Initiated { time: f64, local: TrackId, raw: Option<TrackId> },
    Updated { time: f64, local: TrackId, raw: TrackId },
    Correlated { time: f64, local: TrackId, raw: TrackId },
    Decorrelated { time: f64, local: TrackId, raw: TrackId },
    Dropped { time: f64, local: TrackId },
    CandidatePromoted { time: f64, local: TrackId },
    RawReceived { time: f64, raw: TrackId },
    RawDropped { time: f64, raw: TrackId },
    CurrentTargetChanged { time: f64, local: Option<TrackId> },
    ManagerReplaced { time: f64 },
}

/// Appends every notification to a shared log. Clone the observer (or the
/// log handle) before boxing it to keep read access.
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    log: Rc<RefCell<Vec<TrackEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<TrackEvent> {
        self.log.borrow().clone()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    fn push(&self, event: TrackEvent) {
        self.log.borrow_mut().push(event);
    }
}

impl TrackObserver for RecordingObserver {
    fn local_track_initiated(&mut self, time: f64, local: &LocalTrack, raw: Option<&RawTrack>) {
        self.push(TrackEvent::Initiated {
            time,
            local: local.id,
            raw: raw.map(|r| r.id),
        });
    }

    fn local_track_updated(&mut self, time: f64, local: &LocalTrack, raw: &RawTrack) {
        self.push(TrackEvent::Updated {
            time,
            local: local.id,
            raw: raw.id,
        });
    }

    fn local_track_correlated(&mut self, time: f64, local: &LocalTrack, raw: TrackId) {
        self.push(TrackEvent::Correlated {
            time,
            local: local.id,
            raw,
        });
    }

    fn local_track_decorrelated(&mut self, time: f64, local: &LocalTrack, raw: TrackId) {
        self.push(TrackEvent::Decorrelated {
            time,
            local: local.id,
            raw,
        });
    }

    fn local_track_dropped(&mut self, time: f64, local: &LocalTrack) {
        self.push(TrackEvent::Dropped { time, local: local.id });
    }

    fn candidate_promoted(&mut self, time: f64, local: &LocalTrack) {
        self.push(TrackEvent::CandidatePromoted { time, local: local.id });
    }

    fn raw_track_received(&mut self, time: f64, raw: &RawTrack) {
        self.push(TrackEvent::RawReceived { time, raw: raw.id });
    }

    fn raw_track_dropped(&mut self, time: f64, raw: &RawTrack) {
        self.push(TrackEvent::RawDropped { time, raw: raw.id });
    }

    fn current_target_changed(&mut self, time: f64, target: Option<&LocalTrack>) {
        self.push(TrackEvent::CurrentTargetChanged {
            time,
            local: target.map(|t| t.id),
        });
    }

    fn track_manager_replaced(&mut self, time: f64) {
        self.push(TrackEvent::ManagerReplaced { time });
    }
}

/// Counts of each notification kind, for summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub initiated: usize,
    pub updated: usize,
    pub correlated: usize,
    pub decorrelated: usize,
    pub dropped: usize,
    pub candidates_promoted: usize,
    pub raw_received: usize,
    pub raw_dropped: usize,
}

impl EventCounts {
    pub fn from_events(events: &[TrackEvent]) -> Self {
        let mut counts = Self::default();
        for event in events {
            match event {
                TrackEvent::Initiated { .. } => counts.initiated += 1,
                TrackEvent::Updated { .. } => counts.updated += 1,
                TrackEvent::Correlated { .. } => counts.correlated += 1,
                TrackEvent::Decorrelated { .. } => counts.decorrelated += 1,
                TrackEvent::Dropped { .. } => counts.dropped += 1,
                TrackEvent::CandidatePromoted { .. } => counts.candidates_promoted += 1,
                TrackEvent::RawReceived { .. } => counts.raw_received += 1,
                TrackEvent::RawDropped { .. } => counts.raw_dropped += 1,
                TrackEvent::CurrentTargetChanged { .. } | TrackEvent::ManagerReplaced { .. } => {}
            }
        }
        counts
    }
}
