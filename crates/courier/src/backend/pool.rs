// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::{Error, Result};

/// Worker threads shared by blocking-async calls that do not use a bulkhead.
pub(crate) const DEFAULT_SHARED_POOL_SIZE: usize = 16;

/// A bounded pool running blocking calls on tokio's blocking threads.
///
/// At most `max_concurrent` calls run at a time and up to `queue_depth` more wait for a
/// slot. Calls beyond that are rejected at admission with
/// [`ErrorKind::BulkheadRejected`](crate::ErrorKind::BulkheadRejected).
#[derive(Debug)]
pub struct WorkerPool {
    tag: String,
    slots: Option<Arc<Semaphore>>,
    max_concurrent: Option<usize>,
    capacity: Option<usize>,
    pending: Arc<AtomicUsize>,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

/// Counters describing a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Calls admitted and not yet finished, running or queued.
    pub pending: usize,
    /// Calls that may run at the same time, or `None` when unbounded.
    pub max_concurrent: Option<usize>,
    /// Calls admitted so far.
    pub admitted: u64,
    /// Calls rejected at admission.
    pub rejected: u64,
}

impl WorkerPool {
    /// Creates a pool running at most `max_concurrent` calls with `queue_depth` waiting.
    pub fn new(tag: impl Into<String>, max_concurrent: usize, queue_depth: usize) -> Self {
        Self::build(
            tag.into(),
            Some(max_concurrent),
            Some(max_concurrent.saturating_add(queue_depth)),
        )
    }

    /// Creates a pool running at most `max_concurrent` calls with an unbounded queue.
    pub fn queueing(tag: impl Into<String>, max_concurrent: usize) -> Self {
        Self::build(tag.into(), Some(max_concurrent), None)
    }

    /// Creates a pool without any limit.
    pub fn unbounded(tag: impl Into<String>) -> Self {
        Self::build(tag.into(), None, None)
    }

    fn build(tag: String, max_concurrent: Option<usize>, capacity: Option<usize>) -> Self {
        Self {
            tag,
            slots: max_concurrent.map(|permits| Arc::new(Semaphore::new(permits))),
            max_concurrent,
            capacity,
            pending: Arc::new(AtomicUsize::new(0)),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// The bulkhead tag of the pool.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Admits one call into the pool.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BulkheadRejected`](crate::ErrorKind::BulkheadRejected) when
    /// the pool and its queue are full.
    pub fn try_admit(&self) -> Result<PoolTicket> {
        let admitted = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| match self.capacity {
                Some(capacity) if pending >= capacity => None,
                _ => Some(pending + 1),
            })
            .is_ok();

        if !admitted {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::event!(
                name: "courier.bulkhead.rejected",
                tracing::Level::WARN,
                message = "bulkhead rejected call",
                bulkhead.tag = self.tag.as_str(),
                bulkhead.kind = "worker_pool",
                bulkhead.max_concurrent = self.max_concurrent.unwrap_or_default(),
            );
            return Err(Error::bulkhead_rejected(&self.tag));
        }

        self.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(PoolTicket {
            slots: self.slots.clone(),
            pending: Arc::clone(&self.pending),
        })
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pending: self.pending.load(Ordering::Acquire),
            max_concurrent: self.max_concurrent,
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// A call admitted into a [`WorkerPool`]. Dropping the ticket gives up its place.
#[derive(Debug)]
#[must_use]
pub struct PoolTicket {
    slots: Option<Arc<Semaphore>>,
    pending: Arc<AtomicUsize>,
}

impl PoolTicket {
    /// Waits for a free slot and runs `work` on a blocking thread.
    ///
    /// The slot stays taken until `work` returns, even if the returned future is dropped.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, or a transport error when the blocking task panicked
    /// or was cancelled.
    pub async fn run<T, F>(self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let slot = match &self.slots {
            Some(slots) => Some(Arc::clone(slots).acquire_owned().await.map_err(Error::transport)?),
            None => None,
        };

        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let _ticket = self;
            work()
        })
        .await
        .map_err(Error::transport)?
    }
}

impl Drop for PoolTicket {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}
