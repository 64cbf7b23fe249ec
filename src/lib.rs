//! segfetch: congestion controlled retrieval of numbered segments over a
//! request/response transport.
//!
//! The transport is assumed to offer nothing beyond "send a request, maybe get
//! a response": no ordering, no flow control, no loss recovery. This crate
//! layers TCP-style reliability on top of it:
//! - a sparse window of outstanding segments
//! - RTT estimation and retransmission timeouts (RFC 6298, Karn's rule)
//! - CUBIC congestion control (RFC 8312)
//! - a deadline-ordered retransmission scheduler
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────────────── FetchEngine ─────────────────────┐
//!  │  Window ◀──▶ RtoScheduler   RttEstimator ──▶ CongestionControl
//!  └──────────────┬───────────────────────────▲────────────┘
//!        segment numbers                 (segment, mark)
//!  ┌──────────────▼───────────────────────────┴────────────┐
//!  │  Fetcher (tokio task)  ◀── TaskRegistry ◀── transport │
//!  └───────────────────────────────────────────────────────┘
//! ```
//!
//! - [`window`]     — fixed-capacity map from segment number to state
//! - [`rtt`]        — SRTT / RTTVAR / RTO
//! - [`congestion`] — CUBIC congestion window
//! - [`scheduler`]  — retransmission deadlines
//! - [`engine`]     — the state machine tying the above together
//! - [`fetcher`]    — async driver for one engine
//! - [`registry`]   — routes responses to fetchers by token
#![warn(
    missing_debug_implementations,
    missing_docs,
    redundant_lifetimes,
    non_local_definitions,
    unsafe_code
)]

pub mod cirbuf;
pub mod config;
pub mod congestion;
pub mod constants;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod packet;
pub mod registry;
pub mod rtt;
pub mod scheduler;
pub mod window;

pub use config::{CubicConfig, EngineConfig, RttConfig, SegmentRange};
pub use engine::{Counters, Delivery, EngineState, FetchEngine};
pub use error::{FetchError, Result};
pub use fetcher::{FetchReport, Fetcher};
pub use packet::{Request, Response};
pub use registry::TaskRegistry;
