//! Correlation through resolved ground truth.
//!
//! Each report is attributed to a truth platform: its embedded truth identity
//! when present (unless `ignore_track_target` is set), otherwise the closest
//! platform within `max_distance_for_correlation`. The report is then matched
//! to the local track attributed to the same platform.
//!
//! A report that fails to resolve keeps its previous attribution while that
//! attribution was confirmed within `coast_time`.

use super::{CorrelationContext, CorrelationStrategy};
use crate::{
    config::{non_negative, positive, ConfigError},
    track::RawTrack,
    types::{TrackId, TruthId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthConfig {
    /// Largest report-to-platform distance accepted (m); `None` is unbounded
    pub max_distance_for_correlation: Option<f64>,
    /// Resolve by distance even when the report names its target
    pub ignore_track_target: bool,
    /// Never attribute a report to a platform on the owner's side
    pub ignore_same_side: bool,
    /// How long an unconfirmed attribution is kept (s)
    pub coast_time: f64,
}

impl Default for TruthConfig {
    fn default() -> Self {
        Self {
            max_distance_for_correlation: None,
            ignore_track_target: false,
            ignore_same_side: false,
            coast_time: 5.0,
        }
    }
}

impl TruthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(d) = self.max_distance_for_correlation {
            positive("max_distance_for_correlation", d)?;
        }
        non_negative("coast_time", self.coast_time)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Attribution {
    truth: TruthId,
    last_confirmed: f64,
}

#[derive(Clone, Debug, Default)]
pub struct TruthCorrelation {
    pub config: TruthConfig,
    raw_truth: HashMap<TrackId, Attribution>,
    raw_local: HashMap<TrackId, TrackId>,
    local_truth: HashMap<TrackId, TruthId>,
}

impl TruthCorrelation {
    pub fn new(config: TruthConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Platform currently attributed to `raw_id`.
    pub fn attributed_truth(&self, raw_id: TrackId) -> Option<TruthId> {
        self.raw_truth.get(&raw_id).map(|a| a.truth)
    }

    /// True if any bookkeeping entry is keyed by `raw_id`.
    pub fn has_entries_for(&self, raw_id: TrackId) -> bool {
        self.raw_truth.contains_key(&raw_id) || self.raw_local.contains_key(&raw_id)
    }

    fn resolve(&self, sim_time: f64, raw: &RawTrack, ctx: &CorrelationContext<'_>) -> Option<TruthId> {
        if !self.config.ignore_track_target {
            if let Some(truth) = raw.truth_id {
                return Some(truth);
            }
        }
        let position = raw.extrapolated_position_at(sim_time)?;
        let source = ctx.truth?;
        let max_distance = self.config.max_distance_for_correlation.unwrap_or(f64::INFINITY);

        let mut best: Option<(TruthId, f64)> = None;
        for platform in source.platforms() {
            if self.config.ignore_same_side
                && ctx.own_side.is_some()
                && platform.side.as_deref() == ctx.own_side
            {
                continue;
            }
            let distance = (platform.location_at(sim_time) - position).norm();
            trace!(raw = %raw.id, truth = %platform.id, distance, "truth candidate");
            if distance <= max_distance && best.map_or(true, |(_, d)| distance < d) {
                best = Some((platform.id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    fn truth_of_local(&self, local_id: TrackId, embedded: Option<TruthId>) -> Option<TruthId> {
        self.local_truth.get(&local_id).copied().or(embedded)
    }
}

impl CorrelationStrategy for TruthCorrelation {
    fn name(&self) -> &'static str {
        "truth"
    }

    fn correlate(&mut self, sim_time: f64, raw: &RawTrack, ctx: &mut CorrelationContext<'_>) -> Option<TrackId> {
        let truth = match self.resolve(sim_time, raw, ctx) {
            Some(truth) => {
                self.raw_truth.insert(
                    raw.id,
                    Attribution {
                        truth,
                        last_confirmed: sim_time,
                    },
                );
                truth
            }
            None => {
                let coast_time = self.config.coast_time;
                let coasting = self
                    .raw_truth
                    .get(&raw.id)
                    .filter(|a| sim_time - a.last_confirmed <= coast_time)
                    .map(|a| a.truth);
                match coasting {
                    Some(truth) => truth,
                    None => {
                        self.decorrelate(raw.id);
                        return None;
                    }
                }
            }
        };

        if let Some(&local_id) = self.raw_local.get(&raw.id) {
            if let Some(local) = ctx.local_tracks.find(local_id) {
                if self.truth_of_local(local_id, local.truth_id) == Some(truth) {
                    return Some(local_id);
                }
            }
        }

        let found = ctx
            .local_tracks
            .iter()
            .filter(|l| l.fusible)
            .find(|l| self.truth_of_local(l.id, l.truth_id) == Some(truth))
            .map(|l| l.id);
        match found {
            Some(local_id) => {
                self.raw_local.insert(raw.id, local_id);
            }
            None => {
                self.raw_local.remove(&raw.id);
            }
        }
        found
    }

    fn decorrelate(&mut self, raw_id: TrackId) {
        self.raw_truth.remove(&raw_id);
        self.raw_local.remove(&raw_id);
    }

    fn new_track_correlation(&mut self, raw_id: TrackId, local_id: TrackId) {
        self.raw_local.insert(raw_id, local_id);
        if let Some(a) = self.raw_truth.get(&raw_id) {
            self.local_truth.insert(local_id, a.truth);
        }
    }

    fn correlated_track_id(&self, raw_id: TrackId) -> Option<TrackId> {
        self.raw_local.get(&raw_id).copied()
    }

    fn local_track_dropped(&mut self, local_id: TrackId) {
        self.local_truth.remove(&local_id);
        self.raw_local.retain(|_, l| *l != local_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        correlation::TruthPlatform,
        track::LocalTrack,
        track_list::{LocalTrackList, RawTrackList},
        types::{SensorId, Vec3},
    };

    fn platform(id: u64, x: f64, side: &str) -> TruthPlatform {
        TruthPlatform {
            id: TruthId(id),
            name: format!("p{id}"),
            side: Some(side.into()),
            location: Vec3::new(x, 0.0, 0.0),
            velocity: Vec3::zeros(),
            time: 0.0,
        }
    }

    fn report(x: f64, t: f64) -> RawTrack {
        RawTrack::cartesian(TrackId::new(4, 1), SensorId(1), t, Vec3::new(x, 0.0, 0.0))
    }

    fn config(max: f64, coast: f64) -> TruthConfig {
        TruthConfig {
            max_distance_for_correlation: Some(max),
            coast_time: coast,
            ..Default::default()
        }
    }

    #[test]
    fn resolves_nearest_platform_and_matches_its_local() {
        let truth = vec![platform(1, 0.0, "red"), platform(2, 5000.0, "red")];
        let raws = RawTrackList::new();
        let mut locals = LocalTrackList::new();
        locals.add(LocalTrack::from_raw(
            TrackId::new(1, 1),
            &report(5000.0, 0.0).with_truth(TruthId(2)),
        ));

        let mut strategy = TruthCorrelation::new(config(1000.0, 2.0));
        let mut ctx = CorrelationContext::new(&raws, &locals).with_truth(Some(&truth));
        assert_eq!(strategy.correlate(0.0, &report(4900.0, 0.0), &mut ctx), Some(TrackId::new(1, 1)));
        assert_eq!(strategy.attributed_truth(TrackId::new(4, 1)), Some(TruthId(2)));
    }

    #[test]
    fn coasts_then_clears() {
        let truth = vec![platform(1, 0.0, "red")];
        let raws = RawTrackList::new();
        let locals = LocalTrackList::new();
        let mut strategy = TruthCorrelation::new(config(100.0, 2.0));

        let mut ctx = CorrelationContext::new(&raws, &locals).with_truth(Some(&truth));
        strategy.correlate(0.0, &report(50.0, 0.0), &mut ctx);
        assert_eq!(strategy.attributed_truth(TrackId::new(4, 1)), Some(TruthId(1)));

        // Out of range, but within the coast window.
        strategy.correlate(1.5, &report(900.0, 1.5), &mut ctx);
        assert_eq!(strategy.attributed_truth(TrackId::new(4, 1)), Some(TruthId(1)));

        strategy.correlate(2.5, &report(900.0, 2.5), &mut ctx);
        assert!(!strategy.has_entries_for(TrackId::new(4, 1)));
    }

    #[test]
    fn same_side_platforms_are_skipped() {
        let truth = vec![platform(1, 0.0, "blue"), platform(2, 300.0, "red")];
        let raws = RawTrackList::new();
        let locals = LocalTrackList::new();
        let mut strategy = TruthCorrelation::new(TruthConfig {
            ignore_same_side: true,
            ..Default::default()
        });
        let mut ctx = CorrelationContext::new(&raws, &locals)
            .with_truth(Some(&truth))
            .with_side(Some("blue"));
        strategy.correlate(0.0, &report(10.0, 0.0), &mut ctx);
        assert_eq!(strategy.attributed_truth(TrackId::new(4, 1)), Some(TruthId(2)));
    }

    #[test]
    fn embedded_target_wins_unless_ignored() {
        let truth = vec![platform(1, 0.0, "red"), platform(2, 300.0, "red")];
        let raws = RawTrackList::new();
        let locals = LocalTrackList::new();
        let named = report(10.0, 0.0).with_truth(TruthId(2));

        let mut strategy = TruthCorrelation::new(TruthConfig::default());
        let mut ctx = CorrelationContext::new(&raws, &locals).with_truth(Some(&truth));
        strategy.correlate(0.0, &named, &mut ctx);
        assert_eq!(strategy.attributed_truth(named.id), Some(TruthId(2)));

        let mut strategy = TruthCorrelation::new(TruthConfig {
            ignore_track_target: true,
            ..Default::default()
        });
        strategy.correlate(0.0, &named, &mut ctx);
        assert_eq!(strategy.attributed_truth(named.id), Some(TruthId(1)));
    }

    #[test]
    fn decorrelate_removes_every_entry() {
        let truth = vec![platform(1, 0.0, "red")];
        let raws = RawTrackList::new();
        let locals = LocalTrackList::new();
        let mut strategy = TruthCorrelation::new(TruthConfig::default());
        let r = report(0.0, 0.0);
        let mut ctx = CorrelationContext::new(&raws, &locals).with_truth(Some(&truth));
        strategy.correlate(0.0, &r, &mut ctx);
        strategy.new_track_correlation(r.id, TrackId::new(1, 9));
        assert!(strategy.has_entries_for(r.id));
        strategy.decorrelate(r.id);
        assert!(!strategy.has_entries_for(r.id));
        assert_eq!(strategy.correlated_track_id(r.id), None);
    }

    #[test]
    fn rejects_non_positive_distance() {
        assert!(config(0.0, 1.0).validate().is_err());
        assert!(config(10.0, -1.0).validate().is_err());
        assert!(config(10.0, 1.0).validate().is_ok());
    }
}
