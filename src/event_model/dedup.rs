use std::collections::{HashMap, VecDeque};

/// Default window size; sized to cover the largest expected redelivery gap
/// on a single partition.
pub const DEFAULT_DEDUP_WINDOW_SIZE: usize = 100_000;

/// Decision returned for an incoming event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// Not seen within the window.
    Fresh,
    /// Seen within the window; the ingestor skips the record outright.
    RecentDuplicate,
}

/// Bounded recently-confirmed event-id window with strict oldest-first
/// eviction.
///
/// This is the ingestor's cheap first pass: it absorbs tight redelivery
/// bursts so most replays never reach the store. It is not the correctness
/// mechanism — an id that has aged out of the window still hits the
/// engine's idempotent write, which is definitive. Only confirmed ids may
/// enter the window: an id remembered before its write succeeded would
/// make the later redelivery of a failed event skip as a duplicate.
pub struct DedupWindow {
    seen: HashMap<String, u64>,
    order: VecDeque<(String, u64)>,
    next_seq: u64,
    capacity: usize,
    duplicate_total: u64,
}

impl DedupWindow {
    /// Builds a window bounded to `capacity` remembered event ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
            capacity: capacity.max(1),
            duplicate_total: 0,
        }
    }

    /// Checks an event id against the window without recording it.
    pub fn check(&mut self, event_id: &str) -> DedupDecision {
        if self.seen.contains_key(event_id) {
            self.duplicate_total += 1;
            return DedupDecision::RecentDuplicate;
        }
        DedupDecision::Fresh
    }

    /// Records a confirmed event id, evicting the oldest beyond capacity.
    pub fn confirm(&mut self, event_id: &str) {
        if self.seen.contains_key(event_id) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seen.insert(event_id.to_string(), seq);
        self.order.push_back((event_id.to_string(), seq));
        self.enforce_capacity();
    }

    /// Number of event ids currently remembered.
    pub fn occupancy(&self) -> usize {
        self.seen.len()
    }

    /// Duplicates absorbed since construction.
    pub fn duplicate_total(&self) -> u64 {
        self.duplicate_total
    }

    fn enforce_capacity(&mut self) {
        while self.seen.len() > self.capacity {
            match self.order.pop_front() {
                Some((event_id, seq)) => {
                    // Skip tombstones left by ids re-recorded later.
                    if self.seen.get(&event_id) == Some(&seq) {
                        self.seen.remove(&event_id);
                    }
                }
                None => break,
            }
        }
    }
}
