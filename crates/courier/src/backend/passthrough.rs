// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    Admission, AsyncCall, BlockingCall, BreakerStats, Bulkhead, BulkheadPermit, BulkheadStats, CircuitBreaker, CircuitState,
    ExecutionMode, Outcome, ResilienceBackend, StreamCall, WorkerPool,
};
use crate::Result;

/// A [`ResilienceBackend`] without admission control.
///
/// Breakers never open, bulkheads never reject, and every blocking-async call runs on one
/// unbounded pool. The decorators return the callable unchanged. Circuit breaker overrides
/// only reset the counters; forcing the shared breaker open or disabling it has no effect.
#[derive(Debug)]
pub struct PassThroughBackend {
    breaker: Arc<NeverOpen>,
    bulkhead: Arc<Unbounded>,
    pool: Arc<WorkerPool>,
}

impl PassThroughBackend {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            breaker: Arc::new(NeverOpen::default()),
            bulkhead: Arc::new(Unbounded::default()),
            pool: Arc::new(WorkerPool::unbounded("pass-through")),
        }
    }
}

impl Default for PassThroughBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceBackend for PassThroughBackend {
    fn circuit_breaker(&self, _tag: &str) -> Arc<dyn CircuitBreaker> {
        Arc::clone(&self.breaker) as Arc<dyn CircuitBreaker>
    }

    fn bulkhead(&self, _tag: &str) -> Arc<dyn Bulkhead> {
        Arc::clone(&self.bulkhead) as Arc<dyn Bulkhead>
    }

    fn worker_pool(&self, _tag: &str) -> Arc<WorkerPool> {
        Arc::clone(&self.pool)
    }

    fn reset_all(&self) {
        self.breaker.reset();
    }

    fn decorate_circuit_breaker<'a, T: Send + 'a>(&self, _tag: &str, call: BlockingCall<'a, T>) -> BlockingCall<'a, T> {
        call
    }

    fn decorate_bulkhead<'a, T: Send + 'a>(&self, _tag: &str, call: BlockingCall<'a, T>) -> BlockingCall<'a, T> {
        call
    }

    fn decorate_circuit_breaker_async<T: Send + 'static>(&self, _tag: &str, call: AsyncCall<T>) -> AsyncCall<T> {
        call
    }

    fn decorate_bulkhead_async<T: Send + 'static>(&self, _tag: &str, call: AsyncCall<T>) -> AsyncCall<T> {
        call
    }

    fn decorate_circuit_breaker_stream<T: Send + 'static>(&self, _tag: &str, call: StreamCall<T>) -> StreamCall<T> {
        call
    }

    fn decorate_bulkhead_stream<T: Send + 'static>(&self, _tag: &str, call: StreamCall<T>) -> StreamCall<T> {
        call
    }
}

#[derive(Debug, Default)]
struct NeverOpen {
    successes: AtomicU64,
    failures: AtomicU64,
}

impl CircuitBreaker for NeverOpen {
    fn tag(&self) -> &str {
        "pass-through"
    }

    fn enter(&self) -> Admission {
        Admission::Accepted(ExecutionMode::Normal)
    }

    fn exit(&self, outcome: Outcome, _mode: ExecutionMode) {
        match outcome {
            Outcome::Success => self.successes.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn stats(&self) -> BreakerStats {
        BreakerStats {
            state: CircuitState::Closed,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: 0,
        }
    }

    fn force_open(&self) {}

    fn disable(&self) {}

    fn reset(&self) {
        self.successes.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Unbounded {
    admitted: AtomicU64,
}

impl Bulkhead for Unbounded {
    fn tag(&self) -> &str {
        "pass-through"
    }

    fn try_acquire(&self) -> Result<BulkheadPermit> {
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(BulkheadPermit::unbounded())
    }

    fn stats(&self) -> BulkheadStats {
        BulkheadStats {
            in_flight: 0,
            max_concurrent: None,
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: 0,
        }
    }
}
