//! Power-of-two slot storage backing the segment window.

/// Fixed-size slot array indexed by `seq & mask`.
///
/// Unlike a growable ring this never reallocates: callers are expected to keep
/// at most `capacity` live sequence numbers, which makes every slot belong to
/// exactly one of them.
#[derive(Clone, Debug)]
pub struct CircularBuffer<T> {
    values: Vec<Option<T>>,
    mask: u64,
}

impl<T: Clone> CircularBuffer<T> {
    /// Allocate `size` empty slots; `size` must be a power of two.
    pub fn new(size: u32) -> Self {
        debug_assert!(size.is_power_of_two());
        Self {
            values: vec![None; size as usize],
            mask: u64::from(size) - 1,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> u64 {
        self.mask + 1
    }

    #[inline]
    fn index(&self, seq: u64) -> usize {
        (seq & self.mask) as usize
    }

    /// Store `val` at `seq`, returning whatever occupied the slot before.
    pub fn set(&mut self, seq: u64, val: T) -> Option<T> {
        let idx = self.index(seq);
        self.values[idx].replace(val)
    }

    /// Value stored in the slot of `seq`.
    pub fn get(&self, seq: u64) -> Option<&T> {
        self.values[self.index(seq)].as_ref()
    }

    /// Mutable value stored in the slot of `seq`.
    pub fn get_mut(&mut self, seq: u64) -> Option<&mut T> {
        let idx = self.index(seq);
        self.values[idx].as_mut()
    }

    /// Empty the slot of `seq`, returning its value.
    pub fn remove(&mut self, seq: u64) -> Option<T> {
        let idx = self.index(seq);
        self.values[idx].take()
    }

    /// Whether the slot of `seq` is empty.
    pub fn is_vacant(&self, seq: u64) -> bool {
        self.values[self.index(seq)].is_none()
    }

    /// Empty every slot.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = None);
    }
}
