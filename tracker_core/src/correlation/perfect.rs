//! Oracle correlation on embedded truth identity.

use super::{CorrelationContext, CorrelationStrategy};
use crate::{track::RawTrack, types::TrackId};
use std::collections::HashMap;
use tracing::trace;

#[derive(Clone, Debug, Default)]
pub struct PerfectCorrelation {
    correlated: HashMap<TrackId, TrackId>,
}

impl PerfectCorrelation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CorrelationStrategy for PerfectCorrelation {
    fn name(&self) -> &'static str {
        "perfect"
    }

    fn correlate(&mut self, _sim_time: f64, raw: &RawTrack, ctx: &mut CorrelationContext<'_>) -> Option<TrackId> {
        let Some(truth) = raw.truth_id else {
            // A truthless raw stays with the truthless local track it seeded.
            let kept = self.correlated.get(&raw.id).copied().filter(|id| {
                ctx.local_tracks
                    .find(*id)
                    .is_some_and(|l| l.fusible && l.truth_id.is_none())
            });
            if kept.is_none() {
                self.correlated.remove(&raw.id);
            }
            return kept;
        };

        if let Some(&local_id) = self.correlated.get(&raw.id) {
            if ctx
                .local_tracks
                .find(local_id)
                .is_some_and(|l| l.fusible && l.truth_id == Some(truth))
            {
                return Some(local_id);
            }
        }

        let found = ctx
            .local_tracks
            .iter()
            .find(|l| l.fusible && l.truth_id == Some(truth))
            .map(|l| l.id);
        match found {
            Some(local_id) => {
                trace!(raw = %raw.id, local = %local_id, %truth, "truth match");
                self.correlated.insert(raw.id, local_id);
            }
            None => {
                self.correlated.remove(&raw.id);
            }
        }
        found
    }

    fn decorrelate(&mut self, raw_id: TrackId) {
        self.correlated.remove(&raw_id);
    }

    fn new_track_correlation(&mut self, raw_id: TrackId, local_id: TrackId) {
        self.correlated.insert(raw_id, local_id);
    }

    fn correlated_track_id(&self, raw_id: TrackId) -> Option<TrackId> {
        self.correlated.get(&raw_id).copied()
    }

    fn local_track_dropped(&mut self, local_id: TrackId) {
        self.correlated.retain(|_, l| *l != local_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        track::LocalTrack,
        track_list::{LocalTrackList, RawTrackList},
        types::{SensorId, TruthId, Vec3},
    };

    fn raw(n: u32, truth: u64) -> RawTrack {
        RawTrack::cartesian(TrackId::new(2, n), SensorId(1), 0.0, Vec3::new(n as f64 * 1e4, 0.0, 0.0))
            .with_truth(TruthId(truth))
    }

    #[test]
    fn same_mapping_in_any_order_and_time() {
        let raws = RawTrackList::new();
        let mut locals = LocalTrackList::new();
        locals.add(LocalTrack::from_raw(TrackId::new(1, 1), &raw(10, 7)));
        locals.add(LocalTrack::from_raw(TrackId::new(1, 2), &raw(11, 8)));
        // A second local with the same truth is never chosen over the first.
        locals.add(LocalTrack::from_raw(TrackId::new(1, 3), &raw(12, 7)));

        let mut strategy = PerfectCorrelation::new();
        let reports = [raw(1, 8), raw(2, 7), raw(3, 9)];
        let mut first = Vec::new();
        for r in &reports {
            let mut ctx = CorrelationContext::new(&raws, &locals);
            first.push(strategy.correlate(0.0, r, &mut ctx));
        }
        assert_eq!(first, vec![Some(TrackId::new(1, 2)), Some(TrackId::new(1, 1)), None]);

        let mut fresh = PerfectCorrelation::new();
        for (t, r) in reports.iter().enumerate().rev() {
            let mut ctx = CorrelationContext::new(&raws, &locals);
            assert_eq!(fresh.correlate(100.0 + t as f64, r, &mut ctx), first[t]);
        }
    }

    #[test]
    fn report_without_truth_never_matches() {
        let raws = RawTrackList::new();
        let mut locals = LocalTrackList::new();
        locals.add(LocalTrack::from_raw(TrackId::new(1, 1), &raw(10, 7)));
        let mut strategy = PerfectCorrelation::new();
        let anonymous = RawTrack::cartesian(TrackId::new(2, 1), SensorId(1), 0.0, Vec3::zeros());
        let mut ctx = CorrelationContext::new(&raws, &locals);
        assert_eq!(strategy.correlate(0.0, &anonymous, &mut ctx), None);
    }

    #[test]
    fn truthless_raw_keeps_the_track_it_seeded() {
        let raws = RawTrackList::new();
        let mut locals = LocalTrackList::new();
        let anonymous = RawTrack::cartesian(TrackId::new(2, 1), SensorId(1), 0.0, Vec3::zeros());
        let seeded = TrackId::new(1, 1);
        locals.add(LocalTrack::from_raw(seeded, &anonymous));
        locals.add(LocalTrack::from_raw(TrackId::new(1, 2), &raw(10, 7)));

        let mut strategy = PerfectCorrelation::new();
        strategy.new_track_correlation(anonymous.id, seeded);
        for _ in 0..3 {
            let mut ctx = CorrelationContext::new(&raws, &locals);
            assert_eq!(strategy.correlate(1.0, &anonymous, &mut ctx), Some(seeded));
        }

        // Mapped onto a track that carries truth: released.
        strategy.new_track_correlation(anonymous.id, TrackId::new(1, 2));
        let mut ctx = CorrelationContext::new(&raws, &locals);
        assert_eq!(strategy.correlate(2.0, &anonymous, &mut ctx), None);
        assert_eq!(strategy.correlated_track_id(anonymous.id), None);
    }
}
