//! Track manager: owns the raw and local track lists and drives correlation,
//! fusion and the local track lifecycle.
//!
//! # Report handling
//! - **Fusible report**: stored in the raw list (replacing the stored copy
//!   when newer), matched by the active correlation strategy, then fused
//!   into the matched local track or used to initiate a new one.
//! - **Non-fusible report**: mirrored into a non-fusible, non-purgeable local
//!   track that is updated by replacement and never fused.
//!
//! # Lifecycle policy
//! - **Drop when uncorrelated**: a fusible, unlocked local track whose last
//!   contributor leaves is dropped once the current operation completes.
//! - **Purge**: local tracks not updated within the inactivity limit are
//!   dropped together with their raw contributors (unless raw tracks are
//!   retained). Locked tracks are marked stale instead.
//! - **Locks**: a reference count held by external users; never ownership.
//!
//! Strategy list mutations requested through [`CorrelationCommand`]s are
//! applied in the order they were queued.

use crate::{
    config::{ConfigError, TrackManagerConfig},
    correlation::{CorrelationCommand, CorrelationContext, CorrelationMethod, CorrelationStrategy, Correlator, TruthSource},
    fusion::{FusionMethod, FusionStrategy},
    observer::TrackObserver,
    scheduler::EventQueue,
    track::{LocalTrack, RawTrack},
    track_list::{LocalTrackList, RawTrackList},
    types::TrackId,
};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScheduledAction {
    /// Periodic work of the strategy started as `instance`
    StrategyUpdate { instance: u64 },
}

macro_rules! notify {
    ($observers:expr, $o:ident => $call:expr) => {
        for $o in $observers.iter_mut() {
            $call;
        }
    };
}

macro_rules! correlation_context {
    ($self:ident) => {
        CorrelationContext::new(&$self.raw_tracks, &$self.local_tracks)
            .with_truth($self.truth.as_deref())
            .with_side($self.config.side.as_deref())
    };
}

fn drops_when_uncorrelated(config: &TrackManagerConfig, local: &LocalTrack) -> bool {
    config.drop_uncorrelated_tracks && local.fusible && local.use_count() == 0 && !local.is_correlated()
}

pub struct TrackManager {
    config: TrackManagerConfig,
    raw_tracks: RawTrackList,
    local_tracks: LocalTrackList,
    correlator: Correlator,
    strategy_instance: u64,
    fusion: Box<dyn FusionStrategy>,
    observers: Vec<Box<dyn TrackObserver>>,
    schedule: EventQueue<ScheduledAction>,
    /// raw id → local track whose correlated set holds it
    correlations: HashMap<TrackId, TrackId>,
    pending_drops: Vec<TrackId>,
    next_local_number: u32,
    current_target: Option<TrackId>,
    truth: Option<Box<dyn TruthSource>>,
}

impl TrackManager {
    /// Validates `config` and starts its correlation strategy at time 0.
    pub fn new(config: TrackManagerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut manager = Self {
            raw_tracks: RawTrackList::new(),
            local_tracks: LocalTrackList::new(),
            correlator: config.correlation.build(),
            strategy_instance: 0,
            fusion: config.fusion.build(),
            observers: Vec::new(),
            schedule: EventQueue::new(),
            correlations: HashMap::new(),
            pending_drops: Vec::new(),
            next_local_number: 1,
            current_target: None,
            truth: None,
            config,
        };
        manager.start_strategy(0.0);
        Ok(manager)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &TrackManagerConfig {
        &self.config
    }

    pub fn raw_tracks(&self) -> &RawTrackList {
        &self.raw_tracks
    }

    pub fn local_tracks(&self) -> &LocalTrackList {
        &self.local_tracks
    }

    pub fn find_track(&self, local_id: TrackId) -> Option<&LocalTrack> {
        self.local_tracks.find(local_id)
    }

    pub fn find_raw_track(&self, raw_id: TrackId) -> Option<&RawTrack> {
        self.raw_tracks.find(raw_id)
    }

    /// Local track whose correlated set holds `raw_id`, or the mirror of a
    /// non-fusible report.
    pub fn find_correlated_track(&self, raw_id: TrackId) -> Option<&LocalTrack> {
        match self.correlations.get(&raw_id) {
            Some(&local_id) => self.local_tracks.find(local_id),
            None => self.find_mirror_track(raw_id),
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn strategy_name(&self) -> &'static str {
        self.correlator.name()
    }

    /// Time of the earliest pending scheduled action.
    pub fn next_event_time(&self) -> Option<f64> {
        self.schedule.next_time()
    }

    pub fn add_observer(&mut self, observer: impl TrackObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Platform states used by truth-based strategies.
    pub fn set_truth_source(&mut self, truth: impl TruthSource + 'static) {
        self.truth = Some(Box::new(truth));
    }

    /// Both lists are internally consistent, and every correlated raw id sits
    /// in exactly one local track's set, matching the manager's index.
    pub fn is_consistent(&self) -> bool {
        if !self.raw_tracks.is_consistent() || !self.local_tracks.is_consistent() {
            return false;
        }
        let mut owners: HashMap<TrackId, TrackId> = HashMap::new();
        for local in &self.local_tracks {
            for raw_id in local.raw_track_ids() {
                if owners.insert(raw_id, local.id).is_some() {
                    warn!(raw = %raw_id, "raw track correlated with more than one local track");
                    return false;
                }
                if self.correlations.get(&raw_id) != Some(&local.id) {
                    warn!(raw = %raw_id, local = %local.id, "correlation index out of date");
                    return false;
                }
            }
        }
        owners.len() == self.correlations.len()
    }

    // -----------------------------------------------------------------------
    // Report ingestion
    // -----------------------------------------------------------------------

    /// Process one report. Returns the local track it now belongs to, or
    /// `None` when it was ignored or left uncorrelated.
    pub fn add_track_report(&mut self, sim_time: f64, report: RawTrack) -> Option<TrackId> {
        notify!(self.observers, o => o.raw_track_received(sim_time, &report));
        if !report.fusible {
            return Some(self.update_non_fusible(sim_time, report));
        }

        let raw_id = report.id;
        match self.raw_tracks.find_mut(raw_id) {
            Some(stored) if report.update_time <= stored.update_time => {
                debug!(
                    raw = %raw_id,
                    sim_time,
                    update_time = report.update_time,
                    stored = stored.update_time,
                    "ignoring report not newer than the stored one"
                );
                return None;
            }
            Some(stored) => stored.replacement_update(&report),
            None => {
                trace!(raw = %raw_id, sensor = %report.sensor_id, "new raw track");
                self.raw_tracks.add(report);
            }
        }

        let (local_id, initiated) = match self.correlate_track(sim_time, raw_id) {
            Some((local_id, initiated)) => (Some(local_id), initiated),
            None if self.config.initiate_local_tracks => (self.initiate_track(sim_time, raw_id), true),
            None => (None, false),
        };
        if let (Some(local_id), false) = (local_id, initiated) {
            self.fuse_track(sim_time, raw_id, local_id);
        }
        self.flush_pending_drops(sim_time);
        local_id.filter(|id| self.local_tracks.contains(*id))
    }

    /// Add a pre-briefed track: a non-fusible, non-purgeable local track that
    /// has no raw counterpart.
    pub fn add_track(&mut self, sim_time: f64, track: RawTrack) -> TrackId {
        self.add_mirror_track(sim_time, &track, false)
    }

    fn find_mirror_track(&self, raw_id: TrackId) -> Option<&LocalTrack> {
        self.local_tracks.iter().find(|l| !l.fusible && l.is_mirror_of(raw_id))
    }

    fn update_non_fusible(&mut self, sim_time: f64, report: RawTrack) -> TrackId {
        let existing = self
            .correlator
            .correlated_track_id(report.id)
            .filter(|id| self.local_tracks.find(*id).is_some_and(|l| l.is_mirror_of(report.id)))
            .or_else(|| self.find_mirror_track(report.id).map(|l| l.id));

        let Some(local_id) = existing else {
            return self.add_mirror_track(sim_time, &report, true);
        };
        if let Some(local) = self.local_tracks.find_mut(local_id) {
            local.replacement_update(&report);
            if self.config.maintain_track_history {
                local.push_history();
            }
            let local = &*local;
            trace!(local = %local_id, raw = %report.id, "mirror track replaced");
            notify!(self.observers, o => o.local_track_updated(sim_time, local, &report));
        }
        local_id
    }

    fn add_mirror_track(&mut self, sim_time: f64, track: &RawTrack, from_report: bool) -> TrackId {
        let local_id = self.next_local_id();
        let mut local = LocalTrack::from_raw(local_id, track);
        local.kind = track.kind;
        local.fusible = false;
        local.purgeable = false;
        local.candidate = false;
        if self.config.maintain_track_history {
            local.push_history();
        }
        debug!(local = %local_id, source = %track.id, sim_time, "mirror track added");
        self.local_tracks.add(local);
        self.correlator.new_track_correlation(track.id, local_id);
        if let Some(local) = self.local_tracks.find(local_id) {
            let raw = from_report.then_some(track);
            notify!(self.observers, o => o.local_track_initiated(sim_time, local, raw));
        }
        local_id
    }

    fn next_local_id(&mut self) -> TrackId {
        let id = TrackId::new(self.config.owner, self.next_local_number);
        self.next_local_number += 1;
        id
    }

    // -----------------------------------------------------------------------
    // Correlation
    // -----------------------------------------------------------------------

    /// Ask the strategy for a match for `raw_id`, apply its queued commands and
    /// move the raw track to the match. Returns the match and whether it was
    /// initiated by this call.
    fn correlate_track(&mut self, sim_time: f64, raw_id: TrackId) -> Option<(TrackId, bool)> {
        let (matched, commands) = {
            let raw = self.raw_tracks.find(raw_id)?;
            let mut ctx = correlation_context!(self);
            let matched = self.correlator.correlate(sim_time, raw, &mut ctx);
            (matched, ctx.into_commands())
        };
        let initiated = self.apply_commands(sim_time, commands);
        let seeded = initiated.get(&raw_id).copied();

        let matched = matched.filter(|id| {
            let exists = self.local_tracks.contains(*id);
            if !exists {
                warn!(raw = %raw_id, local = %id, "strategy matched a local track that does not exist");
            }
            exists
        });
        let resolved = matched.or(seeded);
        let current = self.correlations.get(&raw_id).copied();
        if resolved != current {
            if let Some(old) = current {
                self.decorrelate_local_track(sim_time, raw_id, old);
            }
            if let Some(new) = resolved {
                self.correlate_local_track(sim_time, raw_id, new);
            }
        }
        resolved.map(|id| (id, seeded == Some(id)))
    }

    /// Returns raw id → local id for every raw track placed in a local track
    /// initiated by the commands.
    fn apply_commands(&mut self, sim_time: f64, commands: Vec<CorrelationCommand>) -> HashMap<TrackId, TrackId> {
        let mut initiated = HashMap::new();
        for command in commands {
            trace!(?command, "applying correlation command");
            match command {
                CorrelationCommand::Correlate { raw, local } => {
                    if self.raw_tracks.contains(raw) {
                        self.correlate_local_track(sim_time, raw, local);
                    } else {
                        warn!(raw = %raw, "correlate command for unknown raw track");
                    }
                }
                CorrelationCommand::Decorrelate { raw, local } => {
                    self.decorrelate_local_track(sim_time, raw, local);
                }
                CorrelationCommand::Initiate { members } => {
                    if !self.config.initiate_local_tracks {
                        continue;
                    }
                    let Some((&seed, rest)) = members.split_first() else {
                        continue;
                    };
                    let Some(local_id) = self.initiate_track(sim_time, seed) else {
                        continue;
                    };
                    initiated.insert(seed, local_id);
                    for &raw in rest {
                        if !self.raw_tracks.contains(raw) {
                            continue;
                        }
                        self.correlate_local_track(sim_time, raw, local_id);
                        self.correlator.new_track_correlation(raw, local_id);
                        initiated.insert(raw, local_id);
                    }
                }
            }
        }
        initiated
    }

    fn correlate_local_track(&mut self, sim_time: f64, raw_id: TrackId, local_id: TrackId) {
        match self.correlations.get(&raw_id).copied() {
            Some(current) if current == local_id => return,
            Some(current) => self.decorrelate_local_track(sim_time, raw_id, current),
            None => {}
        }
        let Some(local) = self.local_tracks.find_mut(local_id) else {
            warn!(raw = %raw_id, local = %local_id, "cannot correlate with unknown local track");
            return;
        };
        local.correlate(raw_id);
        self.correlations.insert(raw_id, local_id);
        debug!(raw = %raw_id, local = %local_id, sim_time, "raw track correlated");
        let local = &*local;
        notify!(self.observers, o => o.local_track_correlated(sim_time, local, raw_id));
    }

    fn decorrelate_local_track(&mut self, sim_time: f64, raw_id: TrackId, local_id: TrackId) {
        if self.correlations.get(&raw_id) == Some(&local_id) {
            self.correlations.remove(&raw_id);
        }
        let Some(local) = self.local_tracks.find_mut(local_id) else {
            return;
        };
        if !local.decorrelate(raw_id) {
            return;
        }
        if self.correlator.correlated_track_id(raw_id) == Some(local_id) {
            self.correlator.decorrelate(raw_id);
        }
        debug!(raw = %raw_id, local = %local_id, sim_time, "raw track decorrelated");
        let local = &*local;
        notify!(self.observers, o => o.local_track_decorrelated(sim_time, local, raw_id));
        if drops_when_uncorrelated(&self.config, local) {
            self.pending_drops.push(local_id);
        }
    }

    /// Drop local tracks that lost their last contributor during the current
    /// operation and are still uncorrelated.
    fn flush_pending_drops(&mut self, sim_time: f64) {
        for local_id in std::mem::take(&mut self.pending_drops) {
            let droppable = self
                .local_tracks
                .find(local_id)
                .is_some_and(|l| drops_when_uncorrelated(&self.config, l));
            if droppable {
                debug!(local = %local_id, sim_time, "dropping uncorrelated local track");
                self.drop_local_track(sim_time, local_id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Initiation and fusion
    // -----------------------------------------------------------------------

    fn initiate_track(&mut self, sim_time: f64, raw_id: TrackId) -> Option<TrackId> {
        if !self.raw_tracks.contains(raw_id) {
            return None;
        }
        if let Some(current) = self.correlations.get(&raw_id).copied() {
            self.decorrelate_local_track(sim_time, raw_id, current);
        }
        let local_id = self.next_local_id();
        let raw = self.raw_tracks.find(raw_id)?;
        let mut local = LocalTrack::from_raw(local_id, raw);
        local.correlate(raw_id);
        if self.config.maintain_track_history {
            local.push_history();
        }
        debug!(local = %local_id, raw = %raw_id, sim_time, candidate = local.candidate, "local track initiated");
        self.local_tracks.add(local);
        self.correlations.insert(raw_id, local_id);
        self.correlator.new_track_correlation(raw_id, local_id);
        if let Some(local) = self.local_tracks.find(local_id) {
            notify!(self.observers, o => o.local_track_initiated(sim_time, local, Some(raw)));
        }
        Some(local_id)
    }

    fn fuse_track(&mut self, sim_time: f64, raw_id: TrackId, local_id: TrackId) {
        let (Some(raw), Some(local)) = (self.raw_tracks.find(raw_id), self.local_tracks.find_mut(local_id)) else {
            return;
        };
        local.stale = false;
        if !self.fusion.fuse(sim_time, raw, local) {
            trace!(raw = %raw_id, local = %local_id, "nothing fused");
            return;
        }
        if self.config.maintain_track_history {
            local.push_history();
        }
        let promoted = local.candidate && !raw.candidate;
        if promoted {
            local.candidate = false;
        }
        let local = &*local;
        if promoted {
            debug!(local = %local_id, raw = %raw_id, sim_time, "candidate promoted");
            notify!(self.observers, o => o.candidate_promoted(sim_time, local));
        }
        notify!(self.observers, o => o.local_track_updated(sim_time, local, raw));
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// The producer lost raw track `raw_id`: decorrelate it, then remove it
    /// unless raw tracks are retained.
    pub fn drop_track(&mut self, sim_time: f64, raw_id: TrackId) {
        if let Some(local_id) = self.correlations.get(&raw_id).copied() {
            self.decorrelate_local_track(sim_time, raw_id, local_id);
        }
        if self.raw_tracks.contains(raw_id) {
            if self.config.retain_raw_tracks {
                self.correlator.decorrelate(raw_id);
            } else {
                self.remove_raw(sim_time, raw_id);
            }
        } else if let Some(mirror_id) = self.find_mirror_track(raw_id).map(|l| l.id) {
            debug!(raw = %raw_id, local = %mirror_id, sim_time, "non-fusible source dropped");
            self.correlator.decorrelate(raw_id);
            self.drop_local_track(sim_time, mirror_id);
        }
        self.flush_pending_drops(sim_time);
    }

    /// Detach raw track `raw_id` regardless of the retention policy.
    pub fn remove_raw_track(&mut self, sim_time: f64, raw_id: TrackId) -> Option<RawTrack> {
        if let Some(local_id) = self.correlations.get(&raw_id).copied() {
            self.decorrelate_local_track(sim_time, raw_id, local_id);
        }
        let raw = self.remove_raw(sim_time, raw_id);
        self.flush_pending_drops(sim_time);
        raw
    }

    /// Detach local track `local_id` without a drop notification. Its raw
    /// contributors stay in the raw list, uncorrelated.
    pub fn remove_track(&mut self, sim_time: f64, local_id: TrackId) -> Option<LocalTrack> {
        let local = self.local_tracks.remove(local_id)?;
        self.correlator.local_track_dropped(local_id);
        for raw_id in local.raw_track_ids() {
            if self.correlations.get(&raw_id) == Some(&local_id) {
                self.correlations.remove(&raw_id);
            }
            self.correlator.decorrelate(raw_id);
        }
        debug!(local = %local_id, sim_time, "local track removed");
        self.clear_target_if(sim_time, local_id);
        Some(local)
    }

    fn remove_raw(&mut self, sim_time: f64, raw_id: TrackId) -> Option<RawTrack> {
        let raw = self.raw_tracks.remove(raw_id)?;
        self.correlator.decorrelate(raw_id);
        trace!(raw = %raw_id, sim_time, "raw track removed");
        notify!(self.observers, o => o.raw_track_dropped(sim_time, &raw));
        Some(raw)
    }

    /// Notify, delete, and release the raw contributors (deleted unless
    /// retained).
    fn drop_local_track(&mut self, sim_time: f64, local_id: TrackId) -> bool {
        let Some(local) = self.local_tracks.remove(local_id) else {
            return false;
        };
        notify!(self.observers, o => o.local_track_dropped(sim_time, &local));
        self.correlator.local_track_dropped(local_id);
        for raw_id in local.raw_track_ids() {
            if self.correlations.get(&raw_id) == Some(&local_id) {
                self.correlations.remove(&raw_id);
            }
            if !self.config.retain_raw_tracks {
                self.remove_raw(sim_time, raw_id);
            }
        }
        self.clear_target_if(sim_time, local_id);
        true
    }

    // -----------------------------------------------------------------------
    // Locks and purging
    // -----------------------------------------------------------------------

    pub fn lock_track(&mut self, local_id: TrackId) -> bool {
        match self.local_tracks.find_mut(local_id) {
            Some(local) => {
                local.increment_use_count();
                true
            }
            None => false,
        }
    }

    /// Release one lock. An unlocked, uncorrelated fusible track is dropped
    /// when the drop-uncorrelated policy is on.
    pub fn unlock_track(&mut self, sim_time: f64, local_id: TrackId) -> bool {
        let Some(local) = self.local_tracks.find_mut(local_id) else {
            return false;
        };
        local.decrement_use_count();
        if drops_when_uncorrelated(&self.config, local) {
            debug!(local = %local_id, sim_time, "dropping uncorrelated local track on unlock");
            self.drop_local_track(sim_time, local_id);
        }
        true
    }

    /// Time of the newest data behind `local`: its own fused update or the
    /// latest report of any contributor, whichever is later.
    fn last_activity(&self, local: &LocalTrack) -> f64 {
        local
            .raw_track_ids()
            .filter_map(|id| self.raw_tracks.find(id))
            .map(|raw| raw.update_time)
            .fold(local.update_time, f64::max)
    }

    /// Drop purgeable local tracks whose newest contributor is older than
    /// `sim_time - limit`. Locked ones are marked stale instead. Returns the
    /// number dropped.
    pub fn purge_inactive_tracks(&mut self, sim_time: f64, limit: f64) -> usize {
        let expired: Vec<(TrackId, f64)> = self
            .local_tracks
            .iter()
            .filter(|l| l.purgeable)
            .map(|l| (l.id, self.last_activity(l)))
            .filter(|(_, last)| last + limit < sim_time)
            .collect();

        let mut dropped = 0;
        for (local_id, last_update) in expired {
            let Some(local) = self.local_tracks.find_mut(local_id) else {
                continue;
            };
            if local.use_count() > 0 {
                if !local.stale {
                    debug!(local = %local_id, sim_time, "inactive local track is locked; marked stale");
                }
                local.stale = true;
                continue;
            }
            debug!(local = %local_id, sim_time, last_update, "purging inactive local track");
            if self.drop_local_track(sim_time, local_id) {
                dropped += 1;
            }
        }
        dropped
    }

    /// Drop purgeable raw tracks older than `limit`. Does nothing while raw
    /// tracks are retained. Returns the number dropped.
    pub fn purge_inactive_raw_tracks(&mut self, sim_time: f64, limit: f64) -> usize {
        if self.config.retain_raw_tracks {
            return 0;
        }
        let expired: Vec<TrackId> = self
            .raw_tracks
            .iter()
            .filter(|r| r.purgeable && sim_time - r.update_time > limit)
            .map(|r| r.id)
            .collect();
        for &raw_id in &expired {
            debug!(raw = %raw_id, sim_time, "purging inactive raw track");
            self.drop_track(sim_time, raw_id);
        }
        expired.len()
    }

    /// Forget history entries older than `sim_time - keep`.
    pub fn purge_local_track_history(&mut self, sim_time: f64, keep: f64) {
        let oldest = sim_time - keep;
        for local in self.local_tracks.iter_mut() {
            local.history.retain(|(t, _)| *t >= oldest);
        }
    }

    // -----------------------------------------------------------------------
    // Current target
    // -----------------------------------------------------------------------

    /// Designate a local track, or the local track a raw id is correlated
    /// with, as the current target. Returns false if neither resolves.
    pub fn set_current_target(&mut self, sim_time: f64, id: TrackId) -> bool {
        let target = if self.local_tracks.contains(id) {
            Some(id)
        } else {
            self.find_correlated_track(id).map(|l| l.id)
        };
        let Some(target) = target else {
            return false;
        };
        if self.current_target != Some(target) {
            self.current_target = Some(target);
            debug!(local = %target, sim_time, "current target changed");
            let local = self.local_tracks.find(target);
            notify!(self.observers, o => o.current_target_changed(sim_time, local));
        }
        true
    }

    pub fn clear_current_target(&mut self, sim_time: f64) {
        if self.current_target.take().is_some() {
            notify!(self.observers, o => o.current_target_changed(sim_time, None));
        }
    }

    pub fn current_target(&self) -> Option<&LocalTrack> {
        self.current_target.and_then(|id| self.local_tracks.find(id))
    }

    fn clear_target_if(&mut self, sim_time: f64, local_id: TrackId) {
        if self.current_target == Some(local_id) {
            self.clear_current_target(sim_time);
        }
    }

    // -----------------------------------------------------------------------
    // Strategies and scheduling
    // -----------------------------------------------------------------------

    fn start_strategy(&mut self, sim_time: f64) {
        if let Some(first) = self.correlator.initialize(sim_time) {
            self.schedule.schedule(
                first,
                ScheduledAction::StrategyUpdate {
                    instance: self.strategy_instance,
                },
            );
        }
    }

    /// Replace the correlation strategy. The new strategy learns the existing
    /// correlations; periodic work of the old one is discarded when it comes
    /// due.
    pub fn set_correlation_strategy(&mut self, sim_time: f64, method: CorrelationMethod) -> Result<(), ConfigError> {
        method.validate()?;
        let mut correlator = method.build();

        let mut known: Vec<(TrackId, TrackId)> = self.correlations.iter().map(|(r, l)| (*r, *l)).collect();
        known.extend(
            self.local_tracks
                .iter()
                .filter(|l| !l.fusible)
                .filter_map(|l| l.mirror_of.map(|raw| (raw, l.id))),
        );
        known.sort_unstable();
        for (raw_id, local_id) in known {
            correlator.new_track_correlation(raw_id, local_id);
        }

        debug!(from = self.correlator.name(), to = correlator.name(), sim_time, "correlation strategy replaced");
        self.correlator = correlator;
        self.config.correlation = method;
        self.strategy_instance += 1;
        self.start_strategy(sim_time);
        Ok(())
    }

    pub fn set_fusion_strategy(&mut self, method: FusionMethod) {
        self.fusion = method.build();
        self.config.fusion = method;
    }

    /// Run every scheduled action due at or before `sim_time`, in time order.
    /// Returns how many ran.
    pub fn process_scheduled_events(&mut self, sim_time: f64) -> usize {
        let mut ran = 0;
        while let Some((time, action)) = self.schedule.pop_due(sim_time) {
            match action {
                ScheduledAction::StrategyUpdate { instance } => {
                    if instance != self.strategy_instance {
                        trace!(instance, time, "discarding update of a replaced strategy");
                        continue;
                    }
                    let (next, commands) = {
                        let mut ctx = correlation_context!(self);
                        let next = self.correlator.scheduled_update(time, &mut ctx);
                        (next, ctx.into_commands())
                    };
                    self.apply_commands(time, commands);
                    self.flush_pending_drops(time);
                    ran += 1;
                    match next {
                        Some(next) if next > time => self.schedule.schedule(next, ScheduledAction::StrategyUpdate { instance }),
                        Some(next) => warn!(time, next, "strategy asked for a non-advancing update; stopped"),
                        None => {}
                    }
                }
            }
        }
        ran
    }

    pub fn notify_track_manager_changed(&mut self, sim_time: f64) {
        notify!(self.observers, o => o.track_manager_replaced(sim_time));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
