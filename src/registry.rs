//! Token-based demultiplexing of responses onto fetch tasks.
//!
//! Every running [`crate::fetcher::Fetcher`] registers a token and gets back
//! the receiving half of a channel. Whoever reads the shared transport calls
//! [`TaskRegistry::dispatch`] to route each response to its task.
//!
//! The map sits behind a mutex, so once [`TaskRegistry::unregister`] returns
//! no dispatcher can still be holding the removed task's sender.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use tokio::sync::{mpsc, Mutex};

use crate::{constants::FETCH_RESPONSE_QUEUE, packet::Response};

/// Live fetch tasks keyed by token.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<u32, mpsc::Sender<Response>>>,
    next_token: AtomicU32,
    queue: usize,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_queue_capacity(FETCH_RESPONSE_QUEUE)
    }
}

impl TaskRegistry {
    /// Registry handing out queues of `FETCH_RESPONSE_QUEUE` responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry handing out queues of `queue` responses (at least one).
    pub fn with_queue_capacity(queue: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_token: AtomicU32::new(0),
            queue: queue.max(1),
        }
    }

    /// Depth of each queue returned by [`TaskRegistry::register`].
    pub fn queue_capacity(&self) -> usize {
        self.queue
    }

    /// Allocate a fresh token and the queue its responses will arrive on.
    pub async fn register(&self) -> (u32, mpsc::Receiver<Response>) {
        let (tx, rx) = mpsc::channel(self.queue);
        let mut tasks = self.tasks.lock().await;
        let token = loop {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            if !tasks.contains_key(&token) {
                break token;
            }
        };
        tasks.insert(token, tx);
        log::debug!("[registry] + task {token} ({} live)", tasks.len());
        (token, rx)
    }

    /// Remove a task. Returns `false` if the token was not registered.
    pub async fn unregister(&self, token: u32) -> bool {
        let mut tasks = self.tasks.lock().await;
        let removed = tasks.remove(&token).is_some();
        if removed {
            log::debug!("[registry] - task {token} ({} live)", tasks.len());
        }
        removed
    }

    /// Route a response to the task named by its token. Returns `false` when
    /// no live task claims it; such responses are dropped.
    pub async fn dispatch(&self, response: Response) -> bool {
        let sender = self.tasks.lock().await.get(&response.token).cloned();
        match sender {
            Some(sender) => sender.send(response).await.is_ok(),
            None => {
                log::trace!(
                    "[registry] drop response for unknown task {} seg={}",
                    response.token,
                    response.segment
                );
                false
            }
        }
    }

    /// Number of registered tasks.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// No task is registered.
    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}
