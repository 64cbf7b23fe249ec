//! Sparse window of outstanding segments.
//!
//! ```text
//!        lo                          hi
//!   ─────┼──────────────────────────┼────────▶ segment numbers
//!        │ x . x x . . x x x . x x  │
//!        │ (x = outstanding, . = delivered but not yet compacted)
//! ```
//!
//! Segments are appended at `hi` and may be deleted in any order. `lo` only
//! moves when the segment sitting at `lo` is deleted, at which point it skips
//! every contiguous hole behind it.

use std::time::Instant;

use crate::{
    cirbuf::CircularBuffer,
    error::{FetchError, Result},
};

/// Per-segment bookkeeping for one outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentState {
    /// Segment number this state belongs to.
    pub segment: u64,
    /// Number of times the request has been sent, including the first.
    pub transmit_count: u32,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
    /// Retransmission deadline currently registered with the scheduler.
    pub deadline: Instant,
    /// Set once a response for this segment carried a congestion mark.
    pub congestion_mark_seen: bool,
}

/// Capacity-bounded map from segment number to [`SegmentState`].
#[derive(Debug, Clone)]
pub struct Window {
    slots: CircularBuffer<SegmentState>,
    lo: u64,
    hi: u64,
}

impl Window {
    /// Allocates `capacity` slots. Fails unless `capacity` is a non-zero
    /// power of two.
    pub fn new(capacity: u32) -> Result<Self> {
        if !capacity.is_power_of_two() {
            return Err(FetchError::InvalidCapacity(capacity));
        }
        Ok(Self {
            slots: CircularBuffer::new(capacity),
            lo: 0,
            hi: 0,
        })
    }

    /// Drop every segment and restart numbering at `first`.
    pub fn reset(&mut self, first: u64) {
        self.slots.clear();
        self.lo = first;
        self.hi = first;
    }

    /// Maximum span `hi - lo`.
    pub fn capacity(&self) -> u64 {
        self.slots.capacity()
    }

    /// Oldest segment that may still be outstanding.
    pub fn lo(&self) -> u64 {
        self.lo
    }

    /// Next segment number [`Window::append`] will hand out.
    pub fn hi(&self) -> u64 {
        self.hi
    }

    /// Span between the edges, including delivered-but-uncompacted holes.
    pub fn len(&self) -> u64 {
        self.hi - self.lo
    }

    /// No segment is outstanding.
    pub fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    /// [`Window::append`] would fail.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Open a slot for segment `hi`. Returns `None` when the window is full
    /// or the segment number space is exhausted.
    pub fn append(&mut self, now: Instant) -> Option<&mut SegmentState> {
        if self.is_full() {
            return None;
        }
        let segment = self.hi;
        self.hi = segment.checked_add(1)?;

        let state = SegmentState {
            segment,
            transmit_count: 1,
            sent_at: now,
            deadline: now,
            congestion_mark_seen: false,
        };
        let previous = self.slots.set(segment, state);
        debug_assert!(previous.is_none(), "slot for segment {segment} still occupied");
        self.slots.get_mut(segment)
    }

    /// State of an outstanding segment.
    pub fn get(&self, segment: u64) -> Option<&SegmentState> {
        if !self.in_bounds(segment) {
            return None;
        }
        self.slots.get(segment)
    }

    /// Mutable state of an outstanding segment.
    pub fn get_mut(&mut self, segment: u64) -> Option<&mut SegmentState> {
        if !self.in_bounds(segment) {
            return None;
        }
        self.slots.get_mut(segment)
    }

    /// Free the slot of `segment`. Deleting a segment that is not present is
    /// a no-op. Returns the removed state, if any.
    pub fn delete(&mut self, segment: u64) -> Option<SegmentState> {
        if !self.in_bounds(segment) {
            return None;
        }
        let removed = self.slots.remove(segment)?;

        if segment == self.lo {
            while self.lo < self.hi && self.slots.is_vacant(self.lo) {
                self.lo += 1;
            }
        }
        Some(removed)
    }

    /// Outstanding segments in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &SegmentState> + '_ {
        (self.lo..self.hi).filter_map(move |seg| self.slots.get(seg))
    }

    #[inline]
    fn in_bounds(&self, segment: u64) -> bool {
        segment >= self.lo && segment < self.hi
    }
}
