//! Correlation quality metrics: contributor purity, target fragmentation,
//! raw-track reassignments and position RMSE against truth.
//!
//! Only raw tracks carrying an embedded truth id are scored; the rest are
//! invisible to these metrics.

use crate::{
    correlation::{TruthPlatform, TruthSource},
    observer::TrackEvent,
    track::LocalTrack,
    track_list::{LocalTrackList, RawTrackList},
    types::{TrackId, TruthId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Accumulated metric statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CorrelationMetrics {
    /// Number of frames evaluated
    pub n_frames: u64,
    /// Local tracks with at least one truth-labelled contributor, summed over frames
    pub n_evaluated: u64,
    /// Of those, tracks whose labelled contributors all share one truth id
    pub pure_tracks: u64,
    /// Truth targets seen among contributors, summed over frames
    pub n_targets: u64,
    /// Distinct local tracks holding each target, summed over targets and frames
    pub sum_tracks_per_target: u64,
    /// (local, target) pairs scored for position error
    pub n_matched: u64,
    pub sum_sq_pos_err: f64,
    /// Raw tracks moved from one local track to another
    pub reassignments: u64,
}

impl CorrelationMetrics {
    /// Fraction of evaluated local tracks fed by a single target.
    pub fn purity(&self) -> f64 {
        if self.n_evaluated == 0 {
            1.0
        } else {
            self.pure_tracks as f64 / self.n_evaluated as f64
        }
    }

    /// Mean number of local tracks per target (1.0 is ideal).
    pub fn fragmentation(&self) -> f64 {
        if self.n_targets == 0 {
            0.0
        } else {
            self.sum_tracks_per_target as f64 / self.n_targets as f64
        }
    }

    /// Root-mean-square 3-D position error (meters).
    pub fn rmse_position(&self) -> f64 {
        if self.n_matched == 0 {
            return 0.0;
        }
        (self.sum_sq_pos_err / self.n_matched as f64).sqrt()
    }

    /// Accumulate one frame: the track lists as they stand at `sim_time`.
    pub fn accumulate(&mut self, sim_time: f64, raw_tracks: &RawTrackList, local_tracks: &LocalTrackList, truth: &[TruthPlatform]) {
        self.n_frames += 1;
        let mut holders: BTreeMap<TruthId, BTreeSet<TrackId>> = BTreeMap::new();

        for local in local_tracks {
            let labels = contributor_truths(local, raw_tracks);
            let Some(dominant) = dominant_truth(&labels) else {
                continue;
            };
            self.n_evaluated += 1;
            if labels.len() == 1 {
                self.pure_tracks += 1;
            }
            for truth_id in labels.keys() {
                holders.entry(*truth_id).or_default().insert(local.id);
            }

            let position = local.extrapolated_position_at(sim_time);
            let platform = truth.platform(dominant);
            if let (Some(position), Some(platform)) = (position, platform) {
                self.sum_sq_pos_err += (position - platform.location_at(sim_time)).norm_squared();
                self.n_matched += 1;
            }
        }

        self.n_targets += holders.len() as u64;
        self.sum_tracks_per_target += holders.values().map(|h| h.len() as u64).sum::<u64>();
    }

    /// Count raw tracks correlated into a local track other than the one
    /// they were last in.
    pub fn count_reassignments(&mut self, events: &[TrackEvent]) {
        let mut last_local: HashMap<TrackId, TrackId> = HashMap::new();
        for event in events {
            match *event {
                TrackEvent::Initiated { local, raw: Some(raw), .. } => {
                    if last_local.insert(raw, local).is_some_and(|prev| prev != local) {
                        self.reassignments += 1;
                    }
                }
                TrackEvent::Correlated { local, raw, .. } => {
                    if last_local.insert(raw, local).is_some_and(|prev| prev != local) {
                        self.reassignments += 1;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Truth id → number of contributors labelled with it.
fn contributor_truths(local: &LocalTrack, raw_tracks: &RawTrackList) -> BTreeMap<TruthId, usize> {
    let mut labels = BTreeMap::new();
    for raw in local.raw_track_ids().filter_map(|id| raw_tracks.find(id)) {
        if let Some(truth_id) = raw.truth_id {
            *labels.entry(truth_id).or_insert(0) += 1;
        }
    }
    labels
}

/// Most frequent label; ties go to the lowest truth id.
fn dominant_truth(labels: &BTreeMap<TruthId, usize>) -> Option<TruthId> {
    labels
        .iter()
        .fold(None, |best: Option<(TruthId, usize)>, (id, n)| match best {
            Some((_, m)) if m >= *n => best,
            _ => Some((*id, *n)),
        })
        .map(|(id, _)| id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        track::RawTrack,
        types::{SensorId, Vec3},
    };
    use approx::assert_relative_eq;

    fn labelled(n: u32, truth: u64, x: f64) -> RawTrack {
        RawTrack::cartesian(TrackId::new(5, n), SensorId(1), 0.0, Vec3::new(x, 0.0, 0.0)).with_truth(TruthId(truth))
    }

    fn platform(id: u64, x: f64) -> TruthPlatform {
        TruthPlatform {
            id: TruthId(id),
            name: format!("t{id}"),
            side: None,
            location: Vec3::new(x, 0.0, 0.0),
            velocity: Vec3::zeros(),
            time: 0.0,
        }
    }

    #[test]
    fn mixed_and_split_targets_are_scored() {
        let mut raws = RawTrackList::new();
        for raw in [labelled(1, 1, 0.0), labelled(2, 2, 10.0), labelled(3, 1, 5.0)] {
            raws.add(raw);
        }
        let mut locals = LocalTrackList::new();
        // Local 1 mixes targets 1 and 2; local 2 holds another report of target 1.
        let mut mixed = LocalTrack::from_raw(TrackId::new(1, 1), &labelled(1, 1, 3.0));
        mixed.correlate(TrackId::new(5, 1));
        mixed.correlate(TrackId::new(5, 2));
        let mut split = LocalTrack::from_raw(TrackId::new(1, 2), &labelled(3, 1, 4.0));
        split.correlate(TrackId::new(5, 3));
        locals.add(mixed);
        locals.add(split);

        let mut metrics = CorrelationMetrics::default();
        metrics.accumulate(0.0, &raws, &locals, &[platform(1, 0.0), platform(2, 10.0)]);
        assert_eq!(metrics.n_evaluated, 2);
        assert_relative_eq!(metrics.purity(), 0.5);
        // Target 1 is held by two tracks, target 2 by one.
        assert_relative_eq!(metrics.fragmentation(), 1.5);
        // Both tracks are scored against target 1: errors 3 and 4.
        assert_relative_eq!(metrics.rmse_position(), (12.5f64).sqrt());
    }

    #[test]
    fn moves_between_local_tracks_count_as_reassignments() {
        let (r, a, b) = (TrackId::new(5, 1), TrackId::new(1, 1), TrackId::new(1, 2));
        let events = [
            TrackEvent::Initiated { time: 0.0, local: a, raw: Some(r) },
            TrackEvent::Correlated { time: 1.0, local: a, raw: r },
            TrackEvent::Decorrelated { time: 2.0, local: a, raw: r },
            TrackEvent::Correlated { time: 2.0, local: b, raw: r },
        ];
        let mut metrics = CorrelationMetrics::default();
        metrics.count_reassignments(&events);
        assert_eq!(metrics.reassignments, 1);
    }

    #[test]
    fn empty_frame_is_neutral() {
        let mut metrics = CorrelationMetrics::default();
        metrics.accumulate(0.0, &RawTrackList::new(), &LocalTrackList::new(), &[]);
        assert_eq!(metrics.n_frames, 1);
        assert_relative_eq!(metrics.purity(), 1.0);
        assert_relative_eq!(metrics.fragmentation(), 0.0);
        assert_relative_eq!(metrics.rmse_position(), 0.0);
    }
}
