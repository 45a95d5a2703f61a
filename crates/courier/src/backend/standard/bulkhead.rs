// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Semaphore;

use crate::backend::{Bulkhead, BulkheadPermit, BulkheadStats};
use crate::{Error, Result};

/// A bulkhead that admits up to `max_concurrent` calls and rejects the rest immediately.
#[derive(Debug)]
pub struct SemaphoreBulkhead {
    tag: String,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl SemaphoreBulkhead {
    /// Creates a bulkhead for `tag` with `max_concurrent` slots.
    pub fn new(tag: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            tag: tag.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }
}

impl Bulkhead for SemaphoreBulkhead {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn try_acquire(&self) -> Result<BulkheadPermit> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Ok(BulkheadPermit::new(permit));
        }

        self.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::event!(
            name: "courier.bulkhead.rejected",
            tracing::Level::WARN,
            message = "bulkhead rejected call",
            bulkhead.tag = self.tag.as_str(),
            bulkhead.kind = "semaphore",
            bulkhead.max_concurrent = self.max_concurrent,
        );
        Err(Error::bulkhead_rejected(&self.tag))
    }

    fn stats(&self) -> BulkheadStats {
        BulkheadStats {
            in_flight: self.max_concurrent.saturating_sub(self.semaphore.available_permits()),
            max_concurrent: Some(self.max_concurrent),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
