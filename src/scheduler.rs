//! Retransmission deadlines, ordered by `(deadline, segment)`.
//!
//! An indexed binary min-heap: the heap stores entries, and a side table keyed
//! by `segment & mask` records where each segment's entry currently sits so
//! that rescheduling and cancellation are `O(log n)` without tombstones. Both
//! arrays are sized once to the window capacity, so at most one entry per
//! outstanding segment can ever exist.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    deadline: Instant,
    segment: u64,
}

/// At most one pending deadline per outstanding segment.
#[derive(Debug, Clone)]
pub struct RtoScheduler {
    heap: Vec<Entry>,
    position: Vec<Option<usize>>,
    mask: u64,
}

impl RtoScheduler {
    /// Scheduler for a window of `capacity` segments (a power of two).
    pub fn new(capacity: u32) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            heap: Vec::with_capacity(capacity as usize),
            position: vec![None; capacity as usize],
            mask: u64::from(capacity) - 1,
        }
    }

    /// Number of pending deadlines.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending deadline.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.position.iter_mut().for_each(|p| *p = None);
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.first().map(|e| e.deadline)
    }

    /// Pending deadline of `segment`, if scheduled.
    pub fn deadline_of(&self, segment: u64) -> Option<Instant> {
        self.find(segment).map(|pos| self.heap[pos].deadline)
    }

    /// Schedule `segment` to expire at `deadline`, replacing any existing
    /// entry for it.
    pub fn insert(&mut self, segment: u64, deadline: Instant) {
        let entry = Entry { deadline, segment };
        if let Some(pos) = self.find(segment) {
            let previous = self.heap[pos];
            self.heap[pos] = entry;
            if entry < previous {
                self.sift_up(pos);
            } else {
                self.sift_down(pos);
            }
            return;
        }

        let slot = self.slot(segment);
        debug_assert!(
            self.position[slot].is_none(),
            "segment {segment} collides with a live timer"
        );
        self.heap.push(entry);
        let pos = self.heap.len() - 1;
        self.position[slot] = Some(pos);
        self.sift_up(pos);
    }

    /// Remove the entry for `segment`. Returns `false` if none was pending.
    pub fn cancel(&mut self, segment: u64) -> bool {
        match self.find(segment) {
            Some(pos) => {
                self.remove_at(pos);
                true
            }
            None => false,
        }
    }

    /// Pop the earliest entry whose deadline is at or before `now`.
    ///
    /// Draining this in a loop visits every expired segment in ascending
    /// deadline order, ties broken by ascending segment number.
    pub fn pop_expired(&mut self, now: Instant) -> Option<u64> {
        let head = *self.heap.first()?;
        if head.deadline > now {
            return None;
        }
        self.remove_at(0);
        Some(head.segment)
    }

    #[inline]
    fn slot(&self, segment: u64) -> usize {
        (segment & self.mask) as usize
    }

    fn find(&self, segment: u64) -> Option<usize> {
        let pos = self.position[self.slot(segment)]?;
        (self.heap[pos].segment == segment).then_some(pos)
    }

    fn remove_at(&mut self, pos: usize) {
        let removed = self.heap.swap_remove(pos);
        let slot = self.slot(removed.segment);
        self.position[slot] = None;

        if pos < self.heap.len() {
            let moved = self.slot(self.heap[pos].segment);
            self.position[moved] = Some(pos);
            if self.heap[pos] < removed {
                self.sift_up(pos);
            } else {
                self.sift_down(pos);
            }
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let slot_a = self.slot(self.heap[a].segment);
        let slot_b = self.slot(self.heap[b].segment);
        self.position[slot_a] = Some(a);
        self.position[slot_b] = Some(b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos] >= self.heap[parent] {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left] < self.heap[smallest] {
                smallest = left;
            }
            if right < len && self.heap[right] < self.heap[smallest] {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}
