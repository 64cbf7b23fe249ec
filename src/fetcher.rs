//! Async driver that runs one [`FetchEngine`] over a pair of channels.
//!
//! The fetcher owns no socket. Requests go out on an `mpsc::Sender<Request>`
//! and responses come back on an `mpsc::Receiver<Response>`, usually the
//! queue handed out by [`crate::registry::TaskRegistry::register`]. Each turn
//! of the loop fires expired timers, sends retransmissions and then new
//! requests, and waits for either a response or the next RTO deadline.

use std::time::Duration;

use bytes::Bytes;
use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};

use crate::{
    constants::FETCH_DEFAULT_BURST,
    engine::{Counters, EngineState, FetchEngine},
    error::{FetchError, Result},
    packet::{Request, Response},
};

/// Summary of a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchReport {
    /// Engine counters when the fetch ended.
    pub counters: Counters,
    /// Payload bytes handed to the segment callback.
    pub bytes_received: u64,
    /// Wall time spent in [`Fetcher::run`].
    pub elapsed: Duration,
}

/// One fetch task: an engine plus its request and response channels.
#[derive(Debug)]
pub struct Fetcher {
    token: u32,
    engine: FetchEngine,
    requests: mpsc::Sender<Request>,
    responses: mpsc::Receiver<Response>,
    burst: usize,
}

impl Fetcher {
    /// Build a fetcher for the task named `token`. `engine` should already
    /// hold a segment range.
    pub fn new(
        token: u32,
        engine: FetchEngine,
        requests: mpsc::Sender<Request>,
        responses: mpsc::Receiver<Response>,
    ) -> Self {
        Self {
            token,
            engine,
            requests,
            responses,
            burst: FETCH_DEFAULT_BURST,
        }
    }

    /// Cap on new requests emitted per loop iteration.
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst.max(1);
        self
    }

    /// Token stamped on every request this fetcher sends.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// The engine being driven.
    pub fn engine(&self) -> &FetchEngine {
        &self.engine
    }

    /// Run until the engine finishes. `on_segment` sees each segment's
    /// payload exactly once, in arrival order.
    ///
    /// Fails with [`FetchError::Closed`] if either channel closes before a
    /// bounded fetch completes. An unbounded fetch ends successfully when the
    /// response channel closes. An engine with no segment range fails with
    /// [`FetchError::InvalidState`] before anything is sent.
    pub async fn run<F>(mut self, mut on_segment: F) -> Result<FetchReport>
    where
        F: FnMut(u64, Bytes),
    {
        if self.engine.state() == EngineState::Idle {
            return Err(FetchError::InvalidState);
        }

        let started = Instant::now();
        let mut retx = Vec::new();
        let mut fresh = Vec::with_capacity(self.burst);
        let mut bytes_received = 0u64;

        while self.engine.state() == EngineState::Active {
            let now = Instant::now().into_std();
            retx.clear();
            fresh.clear();
            self.engine.trigger(now, &mut retx);
            self.engine.tx_interest_burst(now, self.burst, &mut fresh);

            for &segment in &retx {
                self.send(Request::retransmit(self.token, segment)).await?;
            }
            for &segment in &fresh {
                self.send(Request::new(self.token, segment)).await?;
            }

            let wake = self.engine.next_deadline().map(Instant::from_std);
            tokio::select! {
                response = self.responses.recv() => {
                    let Some(response) = response else {
                        return self.closed(started, bytes_received);
                    };
                    if response.token != self.token {
                        log::trace!(
                            "[fetch:{}] ignore response for task {}",
                            self.token,
                            response.token
                        );
                        continue;
                    }
                    let now = Instant::now().into_std();
                    if self
                        .engine
                        .rx_data(now, response.segment, response.congestion_mark)
                        .is_some()
                    {
                        bytes_received += response.payload.len() as u64;
                        on_segment(response.segment, response.payload);
                    }
                }
                _ = sleep_until(wake.unwrap_or(started)), if wake.is_some() => {}
            }
        }

        let report = self.report(started, bytes_received);
        log::debug!(
            "[fetch:{}] done in {:?}: {}",
            self.token,
            report.elapsed,
            report.counters
        );
        Ok(report)
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| FetchError::Closed)
    }

    fn closed(&self, started: Instant, bytes_received: u64) -> Result<FetchReport> {
        let unbounded = self.engine.range().is_some_and(|r| r.last.is_none());
        if unbounded {
            Ok(self.report(started, bytes_received))
        } else {
            log::warn!(
                "[fetch:{}] response channel closed: {}",
                self.token,
                self.engine.counters()
            );
            Err(FetchError::Closed)
        }
    }

    fn report(&self, started: Instant, bytes_received: u64) -> FetchReport {
        FetchReport {
            counters: self.engine.counters(),
            bytes_received,
            elapsed: started.elapsed(),
        }
    }
}
