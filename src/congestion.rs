//! CUBIC congestion window (RFC 8312), counted in segments.
//!
//! `W_cubic(t) = C·(t − K)³ + W_max`, `K = ∛(W_max·(1 − β)/C)`.
//!
//! In congestion avoidance the window follows the larger of `W_cubic(t)` and
//! the TCP-friendly estimate `W_est(t)`, but never shrinks outside of
//! [`CongestionControl::decrease`].

use std::time::{Duration, Instant};

use crate::config::CubicConfig;

/// Growth phase, derived from `cwnd` and `ssthresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    /// `cwnd < ssthresh`: one segment per delivery.
    SlowStart,
    /// Window follows the cubic curve since the last decrease.
    CongestionAvoidance,
}

/// CUBIC window state.
///
/// `ssthresh` starts unbounded, so congestion avoidance is only entered
/// through [`CongestionControl::decrease`], which also starts the epoch.
#[derive(Debug, Clone)]
pub struct CongestionControl {
    config: CubicConfig,
    cwnd: f64,
    ssthresh: f64,
    w_max: f64,
    // seconds until W_cubic returns to w_max
    k: f64,
    epoch_start: Option<Instant>,
}

impl Default for CongestionControl {
    fn default() -> Self {
        Self::new(CubicConfig::default())
    }
}

impl CongestionControl {
    /// Fresh window at `min_cwnd` in slow start.
    pub fn new(config: CubicConfig) -> Self {
        Self {
            config,
            cwnd: config.min_cwnd,
            ssthresh: f64::INFINITY,
            w_max: 0.0,
            k: 0.0,
            epoch_start: None,
        }
    }

    /// Return to the state of [`CongestionControl::new`].
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Current window in segments.
    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    /// Integer admission limit: how many segments may be outstanding.
    pub fn limit(&self) -> usize {
        self.cwnd.floor() as usize
    }

    /// Slow start threshold; infinite until the first decrease.
    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    /// Current growth phase.
    pub fn state(&self) -> CongestionState {
        if self.cwnd < self.ssthresh {
            CongestionState::SlowStart
        } else {
            CongestionState::CongestionAvoidance
        }
    }

    /// Grow the window after a segment was delivered without a congestion
    /// mark.
    pub fn increase(&mut self, now: Instant, srtt: Duration) {
        if self.state() == CongestionState::SlowStart {
            self.cwnd = (self.cwnd + 1.0).min(self.config.max_cwnd);
            return;
        }

        let t = self
            .epoch_start
            .map_or(0.0, |start| now.saturating_duration_since(start).as_secs_f64());
        let mut target = self.w_cubic(t);
        let rtt = srtt.as_secs_f64();
        if rtt > 0.0 {
            target = target.max(self.w_est(t, rtt));
        }

        if target > self.cwnd {
            self.cwnd = target.min(self.config.max_cwnd);
        }
    }

    /// Multiplicative decrease on loss or an explicit congestion mark.
    pub fn decrease(&mut self, now: Instant) {
        let beta = self.config.beta;
        self.w_max = self.cwnd;
        self.cwnd = (self.cwnd * beta).max(self.config.min_cwnd);
        self.ssthresh = self.cwnd;
        self.k = (self.w_max * (1.0 - beta) / self.config.c).cbrt();
        self.epoch_start = Some(now);
    }

    fn w_cubic(&self, t: f64) -> f64 {
        self.config.c * (t - self.k).powi(3) + self.w_max
    }

    fn w_est(&self, t: f64, rtt: f64) -> f64 {
        let beta = self.config.beta;
        self.w_max * beta + 3.0 * (1.0 - beta) / (1.0 + beta) * (t / rtt)
    }
}
