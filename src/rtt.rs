//! Round-trip time estimation per RFC 6298 (Jacobson/Karn).
//!
//! First sample R:       SRTT = R,  RTTVAR = R/2
//! Subsequent samples:   RTTVAR = 3/4·RTTVAR + 1/4·|SRTT − R|
//!                       SRTT   = 7/8·SRTT   + 1/8·R
//! RTO = clamp(SRTT + max(G, 4·RTTVAR), min_rto, max_rto)
//!
//! Karn's rule is the caller's job: only responses to requests that were
//! transmitted exactly once may be fed to [`RttEstimator::push`].

use std::time::Duration;

use crate::{config::RttConfig, constants::RTT_K};

/// SRTT, RTTVAR and the current RTO.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    config: RttConfig,
    srtt: Option<Duration>,
    rttvar: Duration,
    rto: Duration,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(RttConfig::default())
    }
}

impl RttEstimator {
    /// Estimator with no samples, at `initial_rto`.
    pub fn new(config: RttConfig) -> Self {
        Self {
            config,
            srtt: None,
            rttvar: Duration::ZERO,
            rto: config.initial_rto,
        }
    }

    /// Forget all samples and return to the initial RTO.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Record a new RTT sample and recompute the RTO.
    pub fn push(&mut self, sample: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2;
            }
            Some(srtt) => {
                let diff = sample.abs_diff(srtt);
                self.rttvar = self.rttvar * 3 / 4 + diff / 4;
                self.srtt = Some(srtt * 7 / 8 + sample / 8);
            }
        }
        self.rto = self.computed_rto();
    }

    /// Double the RTO after a retransmission timeout, capped at `max_rto`.
    /// SRTT and RTTVAR are left alone.
    pub fn backoff(&mut self) {
        self.rto = self
            .rto
            .saturating_mul(2)
            .min(self.config.max_rto);
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Smoothed RTT, or `None` before the first sample.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// RTT variance; zero before the first sample.
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    fn computed_rto(&self) -> Duration {
        let Some(srtt) = self.srtt else {
            return self.config.initial_rto;
        };
        let variance = self.rttvar.saturating_mul(RTT_K).max(self.config.granularity);
        srtt.saturating_add(variance)
            .clamp(self.config.min_rto, self.config.max_rto)
    }
}
