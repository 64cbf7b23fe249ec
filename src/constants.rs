//! Default tuning constants.

use std::time::Duration;

// Window
/// Window capacity used by `EngineConfig::default()`.
pub const WINDOW_DEFAULT_CAPACITY: u32 = 4096;
/// Smallest window capacity an engine accepts.
pub const WINDOW_MIN_CAPACITY: u32 = 16;
/// Largest window capacity an engine accepts.
pub const WINDOW_MAX_CAPACITY: u32 = 65536;

// RTT estimation (RFC 6298)
/// Variance multiplier `K` in the RTO formula.
pub const RTT_K: u32 = 4;
/// RTO before the first RTT sample.
pub const RTO_INITIAL: Duration = Duration::from_secs(1);
/// Lower RTO clamp.
pub const RTO_MIN: Duration = Duration::from_millis(200);
/// Upper RTO clamp and back-off ceiling.
pub const RTO_MAX: Duration = Duration::from_secs(60);
/// Clock granularity `G`.
pub const RTO_GRANULARITY: Duration = Duration::from_millis(1);

// Congestion control constants
/// CUBIC scaling constant `C`.
pub const CONG_C: f64 = 0.4;
/// Multiplicative decrease factor (beta_cubic).
pub const CONG_BETA: f64 = 0.7;
/// Congestion window floor, in segments.
pub const CONG_MIN_CWND: f64 = 2.0;
/// Congestion window ceiling, in segments.
pub const CONG_MAX_CWND: f64 = 65536.0;

// Fetcher
/// New requests emitted per fetcher loop iteration.
pub const FETCH_DEFAULT_BURST: usize = 64;
/// Per-task response queue depth handed out by `TaskRegistry::register`.
pub const FETCH_RESPONSE_QUEUE: usize = 1024;
