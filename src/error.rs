//! Error type shared by every fallible operation in the crate.

/// Configuration and integration-layer failures.
///
/// Loss, duplication and backpressure are not errors; they are absorbed by the
/// engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Window capacity is zero or not a power of two.
    #[error("Window capacity {0} is not a non-zero power of two")]
    InvalidCapacity(u32),

    /// Window capacity is a power of two but outside the supported bounds.
    #[error("Window capacity {capacity} outside [{min}, {max}]")]
    CapacityOutOfRange {
        /// Requested capacity.
        capacity: u32,
        /// Smallest accepted capacity.
        min: u32,
        /// Largest accepted capacity.
        max: u32,
    },

    /// Segment range is empty or reaches the end of the segment number space.
    #[error("Invalid segment range {first}..={last}")]
    InvalidRange {
        /// First segment of the rejected range.
        first: u64,
        /// Last segment of the rejected range; `u64::MAX` for unbounded ranges.
        last: u64,
    },

    /// RTO or CUBIC tuning constant out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Operation needs an engine with an active segment range.
    #[error("Invalid state")]
    InvalidState,

    /// Request or response channel closed before the fetch completed.
    #[error("Channel closed")]
    Closed,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FetchError>;
