//! Insertion-ordered container of owned tracks with O(1) id lookup.
//!
//! # Layout
//! Tracks live by value in a `Vec`; a `HashMap<TrackId, usize>` maps each id
//! to its slot. Removing from the end is O(1); removing from the middle shifts
//! the tail and reindexes it, preserving insertion order for iteration.

use crate::{
    track::{LocalTrack, RawTrack},
    types::TrackId,
};
use std::collections::HashMap;

/// Anything that can be stored in a [`TrackList`].
pub trait Tracked: Clone {
    fn track_id(&self) -> TrackId;
}

impl Tracked for RawTrack {
    fn track_id(&self) -> TrackId {
        self.id
    }
}

impl Tracked for LocalTrack {
    fn track_id(&self) -> TrackId {
        self.id
    }
}

pub type RawTrackList = TrackList<RawTrack>;
pub type LocalTrackList = TrackList<LocalTrack>;

#[derive(Clone, Debug)]
pub struct TrackList<T> {
    tracks: Vec<T>,
    index: HashMap<TrackId, usize>,
}

impl<T> Default for TrackList<T> {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Tracked> TrackList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `track`. Ids must be unique within the list.
    pub fn add(&mut self, track: T) {
        let id = track.track_id();
        debug_assert!(!self.index.contains_key(&id), "duplicate track id {id}");
        self.index.insert(id, self.tracks.len());
        self.tracks.push(track);
    }

    pub fn find(&self, id: TrackId) -> Option<&T> {
        self.index.get(&id).map(|&i| &self.tracks[i])
    }

    pub fn find_mut(&mut self, id: TrackId) -> Option<&mut T> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.tracks[i]),
            None => None,
        }
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.index.contains_key(&id)
    }

    /// Slot of `id` in iteration order.
    pub fn position(&self, id: TrackId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Detach the track and hand ownership back.
    pub fn remove(&mut self, id: TrackId) -> Option<T> {
        let slot = self.index.remove(&id)?;
        let track = self.tracks.remove(slot);
        self.reindex_from(slot);
        Some(track)
    }

    /// Remove and drop the track. Returns false if it was not present.
    pub fn delete(&mut self, id: TrackId) -> bool {
        self.remove(id).is_some()
    }

    /// Delete the track at `slot`; returns the slot of the next track, or
    /// `None` at the end of the list.
    pub fn delete_entry(&mut self, slot: usize) -> Option<usize> {
        if slot >= self.tracks.len() {
            return None;
        }
        let track = self.tracks.remove(slot);
        self.index.remove(&track.track_id());
        self.reindex_from(slot);
        (slot < self.tracks.len()).then_some(slot)
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.tracks.get(slot)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.tracks.iter_mut()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(Tracked::track_id).collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.index.clear();
    }

    /// Index and backing sequence agree in membership and count.
    pub fn is_consistent(&self) -> bool {
        self.index.len() == self.tracks.len()
            && self
                .tracks
                .iter()
                .enumerate()
                .all(|(slot, t)| self.index.get(&t.track_id()) == Some(&slot))
    }

    fn reindex_from(&mut self, slot: usize) {
        for (i, track) in self.tracks.iter().enumerate().skip(slot) {
            self.index.insert(track.track_id(), i);
        }
        debug_assert!(self.is_consistent());
    }
}

impl<'a, T: Tracked> IntoIterator for &'a TrackList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
