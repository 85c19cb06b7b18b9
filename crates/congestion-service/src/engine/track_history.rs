/// Bounded per-track centroid history with stale-id reclamation.
///
/// Only the last two positions feed the speed estimate; a few more are retained for
/// smoothing. Ids the tracker stops reporting are dropped after a configurable number of
/// processed frames so long sessions do not grow without bound.
use common::traffic::{Point, TrackedObject};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

/// Recent centroids of one track, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHistory {
    positions: VecDeque<Point>,
    capacity: usize,
    last_seen: u64,
}

impl TrackHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            positions: VecDeque::with_capacity(capacity),
            capacity,
            last_seen: 0,
        }
    }

    /// Build a history from positions, keeping the newest `capacity` of them
    pub fn from_positions(capacity: usize, positions: impl IntoIterator<Item = Point>) -> Self {
        let mut history = Self::new(capacity);
        for p in positions {
            history.push(p);
        }
        history
    }

    pub fn push(&mut self, position: Point) {
        if self.positions.len() >= self.capacity {
            self.positions.pop_front();
        }
        self.positions.push_back(position);
    }

    /// The two most recent positions as (previous, latest)
    pub fn last_two(&self) -> Option<(Point, Point)> {
        let n = self.positions.len();
        if n < 2 {
            return None;
        }
        Some((self.positions[n - 2], self.positions[n - 1]))
    }

    pub fn latest(&self) -> Option<Point> {
        self.positions.back().copied()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Point> {
        self.positions.iter()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sequence number of the last processed frame that observed this track
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

/// Track id → history, mutated once per processed frame
#[derive(Debug, Clone)]
pub struct TrackHistoryStore {
    tracks: HashMap<u64, TrackHistory>,
    capacity: usize,
    stale_after: u64,
}

impl TrackHistoryStore {
    pub fn new(capacity: usize, stale_after: u64) -> Self {
        Self {
            tracks: HashMap::new(),
            capacity: capacity.max(2),
            stale_after: stale_after.max(1),
        }
    }

    /// Append the centroid of every object for frame `seq`.
    ///
    /// At most one position per id is recorded per frame; later duplicates of an id within
    /// the same frame are ignored. Returns the number of positions appended.
    pub fn record_frame(&mut self, seq: u64, objects: &[TrackedObject]) -> usize {
        let mut appended = 0;
        for obj in objects {
            if self.observe(seq, obj.id, obj.centroid()) {
                appended += 1;
            }
        }
        appended
    }

    /// Record one observation; false if the id was already observed in frame `seq`
    pub fn observe(&mut self, seq: u64, id: u64, centroid: Point) -> bool {
        match self.tracks.entry(id) {
            Entry::Occupied(mut e) => {
                let history = e.get_mut();
                if history.last_seen == seq && !history.is_empty() {
                    return false;
                }
                history.push(centroid);
                history.last_seen = seq;
            }
            Entry::Vacant(e) => {
                let mut history = TrackHistory::new(self.capacity);
                history.push(centroid);
                history.last_seen = seq;
                e.insert(history);
            }
        }
        true
    }

    /// Drop ids not observed for more than `stale_after` frames before `seq`.
    /// Returns the number of evicted ids.
    pub fn evict_stale(&mut self, seq: u64) -> usize {
        let stale_after = self.stale_after;
        let before = self.tracks.len();
        self.tracks
            .retain(|_, history| seq.saturating_sub(history.last_seen) <= stale_after);
        before - self.tracks.len()
    }

    pub fn get(&self, id: u64) -> Option<&TrackHistory> {
        self.tracks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
