//! Discrete-event simulations of a fetch over an unreliable network.
//!
//! The clock is virtual: the simulator jumps straight to the next response
//! arrival or retransmission deadline, so thousands of segments under heavy
//! loss run in milliseconds and every run is reproducible from its seed.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use segfetch::{EngineConfig, FetchEngine, SegmentRange};

/// Fault model applied to every request independently.
#[derive(Debug, Clone, Copy)]
struct Network {
    loss: f64,
    duplicate: f64,
    base_rtt: Duration,
    jitter: Duration,
}

impl Network {
    fn lossy(loss: f64) -> Self {
        Self {
            loss,
            duplicate: 0.0,
            base_rtt: Duration::from_millis(10),
            jitter: Duration::from_millis(2),
        }
    }
}

struct Sim {
    engine: FetchEngine,
    rng: StdRng,
    now: Instant,
    arrivals: BinaryHeap<Reverse<(Instant, u64)>>,
    delivered: Vec<bool>,
    // index = transmit count at delivery
    histogram: Vec<usize>,
    rx_calls: u64,
    out: Vec<u64>,
}

impl Sim {
    fn new(last: u64, capacity: u32, seed: u64) -> Self {
        let engine = FetchEngine::with_range(
            EngineConfig::default().with_window_capacity(capacity),
            SegmentRange::through(last),
        )
        .expect("valid engine config");
        Self {
            engine,
            rng: StdRng::seed_from_u64(seed),
            now: Instant::now(),
            arrivals: BinaryHeap::new(),
            delivered: vec![false; last as usize + 1],
            histogram: vec![0; 32],
            rx_calls: 0,
            out: Vec::new(),
        }
    }

    fn step(&mut self, net: &Network) {
        self.out.clear();
        self.engine.trigger(self.now, &mut self.out);
        self.engine
            .tx_interest_burst(self.now, usize::MAX, &mut self.out);

        for &seg in &self.out {
            if self.rng.random_bool(net.loss) {
                continue;
            }
            let copies = if self.rng.random_bool(net.duplicate) { 2 } else { 1 };
            for _ in 0..copies {
                let jitter = self.rng.random_range(0..=net.jitter.as_micros() as u64);
                let at = self.now + net.base_rtt + Duration::from_micros(jitter);
                self.arrivals.push(Reverse((at, seg)));
            }
        }

        let next_arrival = self.arrivals.peek().map(|Reverse((at, _))| *at);
        let next = match (next_arrival, self.engine.next_deadline()) {
            (Some(a), Some(d)) => a.min(d),
            (a, d) => a.or(d).expect("engine stalled with nothing outstanding"),
        };
        self.now = self.now.max(next);

        while let Some(&Reverse((at, seg))) = self.arrivals.peek() {
            if at > self.now {
                break;
            }
            self.arrivals.pop();
            self.rx_calls += 1;
            if let Some(delivery) = self.engine.rx_data(self.now, seg, false) {
                let idx = seg as usize;
                assert!(!self.delivered[idx], "segment {seg} delivered twice");
                self.delivered[idx] = true;
                let bucket = (delivery.transmit_count as usize).min(self.histogram.len() - 1);
                self.histogram[bucket] += 1;
            }
        }
    }

    fn run_to_completion(&mut self, net: &Network) {
        let mut steps = 0u64;
        while !self.engine.finished() {
            self.step(net);
            steps += 1;
            assert!(steps < 10_000_000, "simulation did not converge");
        }
    }

    fn run_for(&mut self, net: &Network, span: Duration) {
        let until = self.now + span;
        while self.now < until && !self.engine.finished() {
            self.step(net);
        }
    }
}

#[test]
fn lossless_fetch_has_no_retransmissions() {
    let last = 999;
    let mut sim = Sim::new(last, 256, 1);
    sim.run_to_completion(&Network::lossy(0.0));

    assert!(sim.delivered.iter().all(|&d| d));
    assert_eq!(sim.rx_calls, last + 1);
    assert_eq!(sim.histogram[1] as u64, last + 1);

    let c = sim.engine.counters();
    assert_eq!(c.n_tx_retx, 0);
    assert_eq!(c.n_rx_data, last + 1);
    assert_eq!(c.n_in_flight, 0);
}

#[test]
fn five_percent_loss_delivers_everything() {
    let last = 1999u64;
    let total = (last + 1) as usize;
    let mut sim = Sim::new(last, 1024, 0x5eed);
    sim.run_to_completion(&Network::lossy(0.05));

    assert!(sim.delivered.iter().all(|&d| d));
    assert_eq!(sim.histogram.iter().sum::<usize>(), total);

    let first_try = sim.histogram[1];
    assert!(
        first_try * 100 > total * 85,
        "only {first_try}/{total} delivered on first attempt"
    );
    let stragglers: usize = sim.histogram[9..].iter().sum();
    assert!(
        stragglers * 100 < total,
        "{stragglers}/{total} needed 9 or more attempts"
    );

    let c = sim.engine.counters();
    assert!(c.n_tx_retx > 0);
    assert_eq!(c.n_rx_data, last + 1);
    assert!(c.cwnd >= 2.0);
}

#[test]
fn retransmission_histogram_decays() {
    let mut sim = Sim::new(2999, 1024, 99);
    sim.run_to_completion(&Network::lossy(0.2));

    assert!(sim.delivered.iter().all(|&d| d));
    // With independent 20% loss each extra attempt should be rarer than the
    // one before it.
    assert!(sim.histogram[1] > sim.histogram[2]);
    assert!(sim.histogram[2] > sim.histogram[3]);
    assert!(sim.histogram[3] >= sim.histogram[4]);
}

#[test]
fn duplicated_responses_are_ignored() {
    let last = 499;
    let mut sim = Sim::new(last, 128, 7);
    let net = Network {
        duplicate: 0.5,
        jitter: Duration::from_millis(8),
        ..Network::lossy(0.02)
    };
    sim.run_to_completion(&net);

    assert!(sim.delivered.iter().all(|&d| d));
    assert_eq!(sim.engine.counters().n_rx_data, last + 1);
    assert!(sim.rx_calls > last + 1);
}

#[test]
fn survives_total_blackout_then_recovers() {
    let last = 199;
    let mut sim = Sim::new(last, 64, 3);
    sim.run_for(&Network::lossy(0.0), Duration::from_millis(50));
    assert!(!sim.engine.finished());

    sim.run_for(&Network::lossy(1.0), Duration::from_secs(600));
    let c = sim.engine.counters();
    assert!(c.n_tx_retx > 0);
    assert_eq!(c.rto, Duration::from_secs(60));
    assert_eq!(c.cwnd, 2.0);
    assert!(c.n_in_flight > 0);

    sim.run_to_completion(&Network::lossy(0.0));
    assert!(sim.delivered.iter().all(|&d| d));
    assert_eq!(sim.engine.counters().n_rx_data, last + 1);
}
