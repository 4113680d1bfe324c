//! Shared dispatch queue and worker pool. Multiple campaigns feed one
//! queue; a pool of tokio workers drains it concurrently. Cancellation is
//! checked at dequeue so queued requests for a dead campaign are dropped
//! before any rate-limit budget is spent.

use courier_core::types::DispatchRequest;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::campaign::CampaignRegistry;
use crate::dispatcher::Dispatcher;

/// FIFO queue of dispatch requests shared by all workers.
#[derive(Default)]
pub struct DispatchQueue {
    inner: Mutex<VecDeque<DispatchRequest>>,
    notify: Notify,
    closed: AtomicBool,
    in_flight: AtomicUsize,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request. Returns false if the queue is closed.
    pub fn push(&self, request: DispatchRequest) -> bool {
        if self.closed.load(Ordering::Acquire) {
            tracing::warn!(
                campaign_id = %request.campaign_id,
                "dispatch queue closed, request dropped"
            );
            return false;
        }
        self.inner.lock().push_back(request);
        self.notify.notify_one();
        true
    }

    /// Wait for the next request. Returns `None` once the queue is closed
    /// and drained.
    pub async fn pop(&self) -> Option<DispatchRequest> {
        loop {
            let notified = self.notify.notified();
            if let Some(request) = self.inner.lock().pop_front() {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                return Some(request);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Mark the request taken by the last `pop` as finished.
    pub fn done(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Queued plus in-flight work.
    pub fn pending(&self) -> usize {
        self.len() + self.in_flight.load(Ordering::Acquire)
    }
}

/// Spawn `count` workers draining the queue through the dispatcher.
pub fn spawn_workers(
    count: usize,
    queue: Arc<DispatchQueue>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<CampaignRegistry>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let queue = Arc::clone(&queue);
            let dispatcher = Arc::clone(&dispatcher);
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                tracing::debug!(worker_id, "dispatch worker started");
                while let Some(request) = queue.pop().await {
                    if registry.is_cancelled(request.campaign_id) {
                        dispatcher.suppress_cancelled(&request);
                    } else {
                        dispatcher.process(&request).await;
                    }
                    queue.done();
                }
                tracing::debug!(worker_id, "dispatch worker stopped");
            })
        })
        .collect()
}
