//! Request/response state machine for one fetch.
//!
//! [`FetchEngine`] owns a [`Window`], an [`RttEstimator`], a
//! [`CongestionControl`] and an [`RtoScheduler`] and decides which segments
//! to request and when to re-request them.
//!
//! ```text
//!   reset(range) ──▶ Active ──(last segment delivered)──▶ Finished
//!        │
//!        └─(None)──▶ Idle
//! ```
//!
//! The engine does no I/O and never reads the clock: every call takes `now`
//! from the caller. All calls for one engine must come from a single thread of
//! control; there is no internal locking.

use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::{
    config::{EngineConfig, SegmentRange},
    congestion::CongestionControl,
    error::Result,
    rtt::RttEstimator,
    scheduler::RtoScheduler,
    window::Window,
};

/// Lifecycle of a [`FetchEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No segment range.
    Idle,
    /// Requests are being issued for the current range.
    Active,
    /// Every segment of a bounded range was delivered.
    Finished,
}

/// Outcome of a response that matched an outstanding segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Delivered segment number.
    pub segment: u64,
    /// How many requests had been sent for this segment.
    pub transmit_count: u32,
    /// RTT sample taken from this response; `None` for retransmitted segments.
    pub rtt: Option<Duration>,
    /// The response carried a congestion mark.
    pub congestion_mark: bool,
}

/// Point-in-time copy of the engine's counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Counters {
    /// Most recent RTT sample.
    pub last_rtt: Option<Duration>,
    /// Smoothed RTT.
    pub srtt: Option<Duration>,
    /// Current retransmission timeout.
    pub rto: Duration,
    /// Congestion window in segments.
    pub cwnd: f64,
    /// Requests sent and not yet answered or given up on.
    pub n_in_flight: usize,
    /// Retransmitted requests.
    pub n_tx_retx: u64,
    /// Segments delivered.
    pub n_rx_data: u64,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Option<Duration>| d.map_or(-1.0, |d| d.as_secs_f64() * 1000.0);
        write!(
            f,
            "rtt={:.3}ms srtt={:.3}ms rto={:.3}ms cwnd={:.2} inflight={} retx={} rx={}",
            ms(self.last_rtt),
            ms(self.srtt),
            self.rto.as_secs_f64() * 1000.0,
            self.cwnd,
            self.n_in_flight,
            self.n_tx_retx,
            self.n_rx_data,
        )
    }
}

/// Reliability and congestion control for one segment range.
#[derive(Debug)]
pub struct FetchEngine {
    window: Window,
    rtt: RttEstimator,
    cc: CongestionControl,
    rto: RtoScheduler,

    state: EngineState,
    range: Option<SegmentRange>,
    last_rtt: Option<Duration>,
    n_in_flight: usize,
    n_tx_retx: u64,
    n_rx_data: u64,
}

impl FetchEngine {
    /// Build an idle engine. Fails on invalid configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: Window::new(config.window_capacity)?,
            rtt: RttEstimator::new(config.rtt),
            cc: CongestionControl::new(config.cubic),
            rto: RtoScheduler::new(config.window_capacity),
            state: EngineState::Idle,
            range: None,
            last_rtt: None,
            n_in_flight: 0,
            n_tx_retx: 0,
            n_rx_data: 0,
        })
    }

    /// Build an engine and immediately start fetching `range`.
    pub fn with_range(config: EngineConfig, range: SegmentRange) -> Result<Self> {
        let mut engine = Self::new(config)?;
        engine.reset(Some(range))?;
        Ok(engine)
    }

    /// Discard all in-flight state and start over on `range`, or go idle
    /// when `range` is `None`. On error the engine is left untouched.
    pub fn reset(&mut self, range: Option<SegmentRange>) -> Result<()> {
        if let Some(range) = &range {
            range.validate()?;
        }

        self.window.reset(range.map_or(0, |r| r.first));
        self.rto.clear();
        self.rtt.reset();
        self.cc.reset();
        self.range = range;
        self.last_rtt = None;
        self.n_in_flight = 0;
        self.n_tx_retx = 0;
        self.n_rx_data = 0;
        self.state = match range {
            Some(_) => EngineState::Active,
            None => EngineState::Idle,
        };

        log::debug!("[fetch] reset range={:?} state={:?}", range, self.state);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// A bounded range has been fully delivered.
    pub fn finished(&self) -> bool {
        self.state == EngineState::Finished
    }

    /// Range being fetched, `None` when idle.
    pub fn range(&self) -> Option<SegmentRange> {
        self.range
    }

    /// Requests currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.n_in_flight
    }

    /// When [`FetchEngine::trigger`] next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.rto.next_deadline()
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> Counters {
        Counters {
            last_rtt: self.last_rtt,
            srtt: self.rtt.srtt(),
            rto: self.rtt.rto(),
            cwnd: self.cc.cwnd(),
            n_in_flight: self.n_in_flight,
            n_tx_retx: self.n_tx_retx,
            n_rx_data: self.n_rx_data,
        }
    }

    /// Request up to `max` new segments, appending their numbers to `out` in
    /// ascending order. Returns how many were produced; zero means the window,
    /// the congestion window or the range is exhausted for now.
    pub fn tx_interest_burst(&mut self, now: Instant, max: usize, out: &mut Vec<u64>) -> usize {
        if self.state != EngineState::Active {
            return 0;
        }

        let limit = self.cc.limit();
        let last = self.range.and_then(|r| r.last);
        let rto = self.rtt.rto();
        let mut produced = 0;

        while produced < max
            && self.n_in_flight < limit
            && last.map_or(true, |last| self.window.hi() <= last)
        {
            let Some(state) = self.window.append(now) else {
                break;
            };
            state.deadline = now + rto;
            let (segment, deadline) = (state.segment, state.deadline);

            self.rto.insert(segment, deadline);
            self.n_in_flight += 1;
            out.push(segment);
            produced += 1;
        }

        if produced > 0 {
            log::trace!(
                "[fetch] tx {} seg(s) hi={} inflight={} cwnd={:.2}",
                produced,
                self.window.hi(),
                self.n_in_flight,
                self.cc.cwnd()
            );
        }
        produced
    }

    /// Process one response. Responses for segments that are not outstanding
    /// (duplicates, late arrivals, foreign numbers) are ignored.
    pub fn rx_data(
        &mut self,
        now: Instant,
        segment: u64,
        congestion_mark: bool,
    ) -> Option<Delivery> {
        if self.state != EngineState::Active {
            return None;
        }
        let state = self.window.get_mut(segment)?;
        state.congestion_mark_seen |= congestion_mark;
        let transmit_count = state.transmit_count;
        let sent_at = state.sent_at;

        self.rto.cancel(segment);

        let rtt = (transmit_count == 1).then(|| now.saturating_duration_since(sent_at));
        if let Some(sample) = rtt {
            self.rtt.push(sample);
            self.last_rtt = Some(sample);
        }

        if congestion_mark {
            self.cc.decrease(now);
            log::debug!(
                "[fetch] congestion mark seg={} cwnd={:.2}",
                segment,
                self.cc.cwnd()
            );
        } else {
            let srtt = self.rtt.srtt().unwrap_or_else(|| self.rtt.rto());
            self.cc.increase(now, srtt);
        }

        self.window.delete(segment);
        self.n_in_flight -= 1;
        self.n_rx_data += 1;

        if self.is_complete() {
            self.state = EngineState::Finished;
            log::debug!("[fetch] finished {}", self.counters());
        }

        Some(Delivery {
            segment,
            transmit_count,
            rtt,
            congestion_mark,
        })
    }

    /// Batch form of [`FetchEngine::rx_data`]; accepted deliveries are appended
    /// to `out`.
    pub fn rx_data_burst(
        &mut self,
        now: Instant,
        responses: &[(u64, bool)],
        out: &mut Vec<Delivery>,
    ) -> usize {
        let before = out.len();
        out.extend(
            responses
                .iter()
                .filter_map(|&(segment, mark)| self.rx_data(now, segment, mark)),
        );
        out.len() - before
    }

    /// Fire every retransmission timer that expired at or before `now`, in
    /// deadline order. Segments that must be re-requested are appended to
    /// `out`. Returns how many timers fired.
    pub fn trigger(&mut self, now: Instant, out: &mut Vec<u64>) -> usize {
        let mut fired = 0;
        while let Some(segment) = self.rto.pop_expired(now) {
            self.on_timeout(now, segment, out);
            fired += 1;
        }
        fired
    }

    fn on_timeout(&mut self, now: Instant, segment: u64, out: &mut Vec<u64>) {
        let Some(state) = self.window.get_mut(segment) else {
            debug_assert!(false, "timer fired for unknown segment {segment}");
            return;
        };

        self.cc.decrease(now);
        self.rtt.backoff();
        let rto = self.rtt.rto();

        state.transmit_count += 1;
        state.sent_at = now;
        state.deadline = now + rto;
        let (transmit_count, deadline) = (state.transmit_count, state.deadline);

        self.rto.insert(segment, deadline);
        self.n_tx_retx += 1;
        out.push(segment);

        log::debug!(
            "[fetch] timeout seg={} tx={} rto={:?} cwnd={:.2}",
            segment,
            transmit_count,
            rto,
            self.cc.cwnd()
        );
    }

    fn is_complete(&self) -> bool {
        match self.range.and_then(|r| r.last) {
            Some(last) => self.window.is_empty() && self.window.lo() > last,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    const RTT: Duration = Duration::from_millis(20);

    fn engine(last: u64) -> FetchEngine {
        FetchEngine::with_range(
            EngineConfig::default().with_window_capacity(64),
            SegmentRange::through(last),
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_config_and_range() {
        let cfg = EngineConfig::default().with_window_capacity(48);
        assert_eq!(
            FetchEngine::new(cfg).err(),
            Some(FetchError::InvalidCapacity(48))
        );

        let mut e = engine(10);
        let err = e.reset(Some(SegmentRange::bounded(5, 1))).unwrap_err();
        assert_eq!(err, FetchError::InvalidRange { first: 5, last: 1 });
        // A failed reset leaves the previous fetch in place.
        assert_eq!(e.state(), EngineState::Active);
    }

    #[test]
    fn rejects_unbounded_range_near_end_of_number_space() {
        let cfg = EngineConfig::default().with_window_capacity(16);
        let err = FetchEngine::with_range(cfg, SegmentRange::unbounded(u64::MAX - 1)).unwrap_err();
        assert_eq!(
            err,
            FetchError::InvalidRange {
                first: u64::MAX - 1,
                last: u64::MAX
            }
        );
    }

    #[test]
    fn idle_engine_does_nothing() {
        let now = Instant::now();
        let mut e = FetchEngine::new(EngineConfig::default()).unwrap();
        let mut out = Vec::new();
        assert_eq!(e.state(), EngineState::Idle);
        assert_eq!(e.tx_interest_burst(now, 10, &mut out), 0);
        assert_eq!(e.rx_data(now, 0, false), None);
        assert!(!e.finished());
    }

    #[test]
    fn initial_burst_limited_by_cwnd() {
        let now = Instant::now();
        let mut e = engine(100);
        let mut out = Vec::new();
        assert_eq!(e.tx_interest_burst(now, 64, &mut out), 2);
        assert_eq!(out, vec![0, 1]);
        assert_eq!(e.tx_interest_burst(now, 64, &mut out), 0);
        assert_eq!(e.in_flight(), 2);
    }

    #[test]
    fn burst_respects_max_and_range() {
        let now = Instant::now();
        let mut e = engine(2);
        let mut out = Vec::new();
        e.tx_interest_burst(now, 1, &mut out);
        assert_eq!(out, vec![0]);

        let d = e.rx_data(now + RTT, 0, false).unwrap();
        assert_eq!(d.rtt, Some(RTT));
        // cwnd is now 3 but only segments 1 and 2 remain.
        out.clear();
        assert_eq!(e.tx_interest_burst(now + RTT, 64, &mut out), 2);
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn lossless_fetch_finishes() {
        let last = 49;
        let mut now = Instant::now();
        let mut e = engine(last);
        let mut pending = Vec::new();
        let mut rx_calls = 0;

        while !e.finished() {
            e.tx_interest_burst(now, 64, &mut pending);
            now += RTT;
            for seg in pending.drain(..) {
                assert!(e.rx_data(now, seg, false).is_some());
                rx_calls += 1;
            }
        }

        assert_eq!(rx_calls, last + 1);
        let c = e.counters();
        assert_eq!(c.n_rx_data, last + 1);
        assert_eq!(c.n_tx_retx, 0);
        assert_eq!(c.n_in_flight, 0);
        assert_eq!(c.srtt, Some(RTT));
    }

    #[test]
    fn duplicates_and_unknown_segments_ignored() {
        let now = Instant::now();
        let mut e = engine(10);
        let mut out = Vec::new();
        e.tx_interest_burst(now, 64, &mut out);

        assert!(e.rx_data(now + RTT, 0, false).is_some());
        assert_eq!(e.rx_data(now + RTT, 0, false), None);
        assert_eq!(e.rx_data(now + RTT, 500, false), None);
        assert_eq!(e.counters().n_rx_data, 1);
    }

    #[test]
    fn out_of_order_delivery() {
        let now = Instant::now();
        let mut e = engine(1);
        let mut out = Vec::new();
        e.tx_interest_burst(now, 64, &mut out);
        assert!(e.rx_data(now + RTT, 1, false).is_some());
        assert!(!e.finished());
        assert!(e.rx_data(now + RTT, 0, false).is_some());
        assert!(e.finished());
    }

    #[test]
    fn timeout_retransmits_without_rtt_sample() {
        let t0 = Instant::now();
        let mut e = engine(10);
        let mut out = Vec::new();
        e.tx_interest_burst(t0, 1, &mut out);
        assert_eq!(out, vec![0]);

        let deadline = e.next_deadline().unwrap();
        assert_eq!(deadline, t0 + Duration::from_secs(1));

        let mut retx = Vec::new();
        assert_eq!(e.trigger(deadline - Duration::from_millis(1), &mut retx), 0);
        assert_eq!(e.trigger(deadline, &mut retx), 1);
        assert_eq!(retx, vec![0]);

        let c = e.counters();
        assert_eq!(c.n_tx_retx, 1);
        assert_eq!(c.n_in_flight, 1);
        assert_eq!(c.rto, Duration::from_secs(2));
        assert_eq!(e.next_deadline(), Some(deadline + Duration::from_secs(2)));

        let d = e.rx_data(deadline + RTT, 0, false).unwrap();
        assert_eq!(d.transmit_count, 2);
        assert_eq!(d.rtt, None);
        assert_eq!(e.counters().srtt, None);
        assert_eq!(e.next_deadline(), None);
    }

    #[test]
    fn expired_timers_fire_in_order() {
        let t0 = Instant::now();
        let mut e = engine(10);
        let mut out = Vec::new();
        e.tx_interest_burst(t0, 1, &mut out);
        e.tx_interest_burst(t0 + Duration::from_millis(5), 1, &mut out);
        assert_eq!(out, vec![0, 1]);

        let mut retx = Vec::new();
        assert_eq!(e.trigger(t0 + Duration::from_secs(5), &mut retx), 2);
        assert_eq!(retx, vec![0, 1]);
    }

    #[test]
    fn congestion_mark_shrinks_window_without_retransmission() {
        let now = Instant::now();
        let mut e = engine(1000);
        let mut out = Vec::new();
        let mut t = now;
        for _ in 0..4 {
            e.tx_interest_burst(t, 64, &mut out);
            t += RTT;
            for seg in out.drain(..) {
                e.rx_data(t, seg, false);
            }
        }
        let before = e.counters().cwnd;

        e.tx_interest_burst(t, 64, &mut out);
        let marked = out[0];
        let d = e.rx_data(t + RTT, marked, true).unwrap();
        assert!(d.congestion_mark);
        let c = e.counters();
        assert!(c.cwnd < before);
        assert_eq!(c.n_tx_retx, 0);

        let mut retx = Vec::new();
        assert_eq!(e.trigger(t + RTT, &mut retx), 0);
    }

    #[test]
    fn rx_burst_collects_deliveries() {
        let now = Instant::now();
        let mut e = engine(10);
        let mut out = Vec::new();
        e.tx_interest_burst(now, 64, &mut out);

        let mut delivered = Vec::new();
        let n = e.rx_data_burst(now + RTT, &[(1, false), (1, false), (0, true)], &mut delivered);
        assert_eq!(n, 2);
        assert_eq!(
            delivered.iter().map(|d| d.segment).collect::<Vec<_>>(),
            vec![1, 0]
        );
    }

    #[test]
    fn unbounded_range_never_finishes() {
        let mut now = Instant::now();
        let mut e = FetchEngine::with_range(
            EngineConfig::default().with_window_capacity(16),
            SegmentRange::unbounded(1000),
        )
        .unwrap();
        let mut out = Vec::new();
        for _ in 0..20 {
            e.tx_interest_burst(now, 64, &mut out);
            now += RTT;
            for seg in out.drain(..) {
                e.rx_data(now, seg, false);
            }
        }
        assert!(!e.finished());
        // Window capacity bounds the burst once cwnd outgrows it.
        assert_eq!(e.tx_interest_burst(now, 64, &mut out), 16);
        assert!(out.iter().all(|&seg| seg >= 1000));
    }

    #[test]
    fn reset_clears_counters() {
        let now = Instant::now();
        let mut e = engine(0);
        let mut out = Vec::new();
        e.tx_interest_burst(now, 64, &mut out);
        e.rx_data(now + RTT, 0, false);
        assert!(e.finished());

        e.reset(Some(SegmentRange::bounded(10, 12))).unwrap();
        assert_eq!(e.state(), EngineState::Active);
        let c = e.counters();
        assert_eq!(c.n_rx_data, 0);
        assert_eq!(c.srtt, None);
        assert_eq!(c.cwnd, 2.0);

        out.clear();
        e.tx_interest_burst(now, 64, &mut out);
        assert_eq!(out, vec![10, 11]);

        e.reset(None).unwrap();
        assert_eq!(e.state(), EngineState::Idle);
        assert_eq!(e.next_deadline(), None);
    }

    #[test]
    fn counters_display() {
        let e = engine(0);
        let line = e.counters().to_string();
        assert!(line.contains("cwnd=2.00"));
        assert!(line.contains("rto=1000.000ms"));
    }
}
