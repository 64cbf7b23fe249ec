//! Tuning knobs for a [`crate::engine::FetchEngine`].
//!
//! Every field has a default taken from [`crate::constants`]; the `with_*`
//! setters exist so callers can override one knob without spelling out the
//! rest.

use std::time::Duration;

use crate::{
    constants::*,
    error::{FetchError, Result},
};

/// Retransmission timeout parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttConfig {
    /// RTO before any RTT sample is available.
    pub initial_rto: Duration,
    /// Lower clamp applied to every computed RTO.
    pub min_rto: Duration,
    /// Upper clamp, also the ceiling for exponential back-off.
    pub max_rto: Duration,
    /// Clock granularity `G` in `RTO = SRTT + max(G, K * RTTVAR)`.
    pub granularity: Duration,
}

impl Default for RttConfig {
    fn default() -> Self {
        Self {
            initial_rto: RTO_INITIAL,
            min_rto: RTO_MIN,
            max_rto: RTO_MAX,
            granularity: RTO_GRANULARITY,
        }
    }
}

impl RttConfig {
    /// Check that the clamps are ordered and the initial RTO lies between them.
    pub fn validate(&self) -> Result<()> {
        if self.min_rto.is_zero() {
            return Err(FetchError::InvalidConfig("min_rto must be positive"));
        }
        if self.min_rto > self.max_rto {
            return Err(FetchError::InvalidConfig("min_rto exceeds max_rto"));
        }
        if self.initial_rto < self.min_rto || self.initial_rto > self.max_rto {
            return Err(FetchError::InvalidConfig(
                "initial_rto outside [min_rto, max_rto]",
            ));
        }
        Ok(())
    }
}

/// CUBIC parameters, in segments and seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicConfig {
    /// Scaling constant `C` of the cubic growth function.
    pub c: f64,
    /// Multiplicative decrease factor, in `(0, 1)`.
    pub beta: f64,
    /// Floor the window never drops below.
    pub min_cwnd: f64,
    /// Ceiling the window never grows beyond.
    pub max_cwnd: f64,
}

impl Default for CubicConfig {
    fn default() -> Self {
        Self {
            c: CONG_C,
            beta: CONG_BETA,
            min_cwnd: CONG_MIN_CWND,
            max_cwnd: CONG_MAX_CWND,
        }
    }
}

impl CubicConfig {
    /// Check `C > 0`, `0 < beta < 1` and `1 <= min_cwnd <= max_cwnd`.
    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(FetchError::InvalidConfig("cubic C must be positive"));
        }
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(FetchError::InvalidConfig("cubic beta must be in (0, 1)"));
        }
        if !(self.min_cwnd >= 1.0 && self.min_cwnd <= self.max_cwnd) {
            return Err(FetchError::InvalidConfig(
                "cwnd bounds must satisfy 1 <= min_cwnd <= max_cwnd",
            ));
        }
        Ok(())
    }
}

/// Everything needed to construct a [`crate::engine::FetchEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of outstanding segments; a power of two between
    /// `WINDOW_MIN_CAPACITY` and `WINDOW_MAX_CAPACITY`.
    pub window_capacity: u32,
    /// RTO estimation parameters.
    pub rtt: RttConfig,
    /// Congestion control parameters.
    pub cubic: CubicConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: WINDOW_DEFAULT_CAPACITY,
            rtt: RttConfig::default(),
            cubic: CubicConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Override the window capacity.
    pub fn with_window_capacity(mut self, capacity: u32) -> Self {
        self.window_capacity = capacity;
        self
    }

    /// Override the RTO parameters.
    pub fn with_rtt(mut self, rtt: RttConfig) -> Self {
        self.rtt = rtt;
        self
    }

    /// Override the CUBIC parameters.
    pub fn with_cubic(mut self, cubic: CubicConfig) -> Self {
        self.cubic = cubic;
        self
    }

    /// Validate the capacity and both nested configs.
    pub fn validate(&self) -> Result<()> {
        let capacity = self.window_capacity;
        if !capacity.is_power_of_two() {
            return Err(FetchError::InvalidCapacity(capacity));
        }
        if !(WINDOW_MIN_CAPACITY..=WINDOW_MAX_CAPACITY).contains(&capacity) {
            return Err(FetchError::CapacityOutOfRange {
                capacity,
                min: WINDOW_MIN_CAPACITY,
                max: WINDOW_MAX_CAPACITY,
            });
        }
        self.rtt.validate()?;
        self.cubic.validate()
    }
}

/// Inclusive range of segment numbers to fetch.
///
/// `last == None` means the range is unbounded and the fetch never finishes
/// on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRange {
    /// First segment to request.
    pub first: u64,
    /// Last segment to request, inclusive.
    pub last: Option<u64>,
}

impl SegmentRange {
    /// Segments `first..=last`.
    pub fn bounded(first: u64, last: u64) -> Self {
        Self {
            first,
            last: Some(last),
        }
    }

    /// Segments from `first` onwards, with no end.
    pub fn unbounded(first: u64) -> Self {
        Self { first, last: None }
    }

    /// Segments `0..=last`.
    pub fn through(last: u64) -> Self {
        Self::bounded(0, last)
    }

    /// Reject empty ranges and ranges whose window edge could run past
    /// `u64::MAX`.
    ///
    /// An unbounded range must leave room for a full window of the largest
    /// capacity after `first`.
    pub fn validate(&self) -> Result<()> {
        let invalid = match self.last {
            Some(last) => last < self.first || last == u64::MAX,
            None => self.first > u64::MAX - u64::from(WINDOW_MAX_CAPACITY),
        };
        if invalid {
            return Err(FetchError::InvalidRange {
                first: self.first,
                last: self.last.unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    /// Whether `segment` falls inside the range.
    pub fn contains(&self, segment: u64) -> bool {
        segment >= self.first && self.last.map_or(true, |last| segment <= last)
    }
}
