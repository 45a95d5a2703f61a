// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pluggable resilience backends.
//!
//! A [`ResilienceBackend`] owns the per-tag circuit breakers, bulkheads and worker pools
//! and knows how to wrap a callable with them. Executors are generic over the backend, so
//! one deployment uses exactly one backend's decorators.
//!
//! Two backends ship with the crate:
//!
//! - [`StandardBackend`]: sliding-window circuit breakers, semaphore bulkheads and bounded
//!   worker pools, configured through [`ResilienceConfig`](crate::ResilienceConfig).
//! - [`PassThroughBackend`]: applies no admission control at all.

mod passthrough;
mod pool;
mod standard;
mod stream;

use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
pub use passthrough::PassThroughBackend;
pub use pool::{PoolStats, PoolTicket, WorkerPool};
use recoverable::{Recovery, RecoveryKind};
pub use standard::{SemaphoreBulkhead, StandardBackend, StandardCircuitBreaker};
pub(crate) use stream::{BreakerStream, BulkheadStream};
use tokio::sync::OwnedSemaphorePermit;

use crate::{Error, Result};

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because security and privacy guarantees can no longer be upheld";

/// A synchronous callable, invoked at most once.
pub type BlockingCall<'a, T> = Box<dyn FnOnce() -> Result<T> + Send + 'a>;

/// An asynchronous callable. Nothing happens until it is polled.
pub type AsyncCall<T> = BoxFuture<'static, Result<T>>;

/// A lazy stream of results.
pub type StreamCall<T> = BoxStream<'static, Result<T>>;

/// Source of the policy state applied around calls.
///
/// Implementations hand out shared, per-tag [`CircuitBreaker`], [`Bulkhead`] and
/// [`WorkerPool`] instances. A tag without an explicit policy gets the default policy.
///
/// The provided `decorate_*` methods wrap a callable so that it passes through the
/// breaker or bulkhead of a tag. Executors apply the breaker first and the bulkhead
/// around it, so capacity rejections never reach the breaker.
pub trait ResilienceBackend: Send + Sync + Debug + 'static {
    /// Returns the circuit breaker for `tag`.
    fn circuit_breaker(&self, tag: &str) -> Arc<dyn CircuitBreaker>;

    /// Returns the bulkhead for `tag`.
    fn bulkhead(&self, tag: &str) -> Arc<dyn Bulkhead>;

    /// Returns the worker pool used for blocking-async calls with bulkhead `tag`.
    fn worker_pool(&self, tag: &str) -> Arc<WorkerPool>;

    /// The size of the worker pool shared by blocking-async calls without a bulkhead.
    fn shared_pool_size(&self) -> usize {
        pool::DEFAULT_SHARED_POOL_SIZE
    }

    /// Resets every circuit breaker created so far.
    fn reset_all(&self);

    /// Applies an operator override to the circuit breaker of `tag`.
    ///
    /// [`BreakerOverride::Reset`] with [`ALL_CIRCUIT_BREAKERS`] resets every breaker.
    fn override_circuit_breaker(&self, tag: &str, action: BreakerOverride) {
        tracing::event!(
            name: "courier.circuit_breaker.override",
            tracing::Level::WARN,
            message = "circuit breaker overridden",
            circuit_breaker.tag = tag,
            circuit_breaker.action = action.as_str(),
        );

        match action {
            BreakerOverride::ForceOpen => self.circuit_breaker(tag).force_open(),
            BreakerOverride::ForceClose => self.circuit_breaker(tag).disable(),
            BreakerOverride::Reset if tag == ALL_CIRCUIT_BREAKERS => self.reset_all(),
            BreakerOverride::Reset => self.circuit_breaker(tag).reset(),
        }
    }

    /// Wraps a blocking callable with the circuit breaker of `tag`.
    fn decorate_circuit_breaker<'a, T: Send + 'a>(&self, tag: &str, call: BlockingCall<'a, T>) -> BlockingCall<'a, T> {
        let breaker = self.circuit_breaker(tag);
        Box::new(move || {
            let permit = CircuitPermit::acquire(breaker)?;
            let result = call();
            permit.record(&result);
            result
        })
    }

    /// Wraps a blocking callable with the bulkhead of `tag`.
    fn decorate_bulkhead<'a, T: Send + 'a>(&self, tag: &str, call: BlockingCall<'a, T>) -> BlockingCall<'a, T> {
        let bulkhead = self.bulkhead(tag);
        Box::new(move || {
            let _permit = bulkhead.try_acquire()?;
            call()
        })
    }

    /// Wraps an asynchronous callable with the circuit breaker of `tag`.
    ///
    /// The breaker is consulted when the returned future is first polled.
    fn decorate_circuit_breaker_async<T: Send + 'static>(&self, tag: &str, call: AsyncCall<T>) -> AsyncCall<T> {
        let breaker = self.circuit_breaker(tag);
        async move {
            let permit = CircuitPermit::acquire(breaker)?;
            let result = call.await;
            permit.record(&result);
            result
        }
        .boxed()
    }

    /// Wraps an asynchronous callable with the bulkhead of `tag`.
    ///
    /// Capacity is checked when the returned future is first polled and held until it completes.
    fn decorate_bulkhead_async<T: Send + 'static>(&self, tag: &str, call: AsyncCall<T>) -> AsyncCall<T> {
        let bulkhead = self.bulkhead(tag);
        async move {
            let _permit = bulkhead.try_acquire()?;
            call.await
        }
        .boxed()
    }

    /// Wraps a stream with the circuit breaker of `tag`.
    ///
    /// The outcome is recorded once: as a failure at the first error, or as a success when
    /// the stream ends.
    fn decorate_circuit_breaker_stream<T: Send + 'static>(&self, tag: &str, call: StreamCall<T>) -> StreamCall<T> {
        BreakerStream::new(self.circuit_breaker(tag), call).boxed()
    }

    /// Wraps a stream with the bulkhead of `tag`, holding capacity for the stream's lifetime.
    fn decorate_bulkhead_stream<T: Send + 'static>(&self, tag: &str, call: StreamCall<T>) -> StreamCall<T> {
        BulkheadStream::new(self.bulkhead(tag), call).boxed()
    }
}

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected.
    Open,
    /// A probe call decides whether the circuit closes again.
    HalfOpen,
    /// An operator forced the circuit open. Calls are rejected until it is reset.
    ForcedOpen,
    /// An operator disabled the breaker. Calls pass and outcomes are not recorded.
    Disabled,
}

impl CircuitState {
    /// Returns the state name used in log events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
            Self::ForcedOpen => "forced_open",
            Self::Disabled => "disabled",
        }
    }
}

/// How an admitted call executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Regular execution in the closed state.
    Normal,
    /// Probe execution in the half-open state.
    Probe,
}

/// The answer of a circuit breaker to a call asking to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Accepted(ExecutionMode),
    /// The call must not proceed.
    Rejected,
}

/// The result of a call as seen by the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Counts towards healthy throughput.
    Success,
    /// Counts against the failure threshold.
    Failure,
}

impl Outcome {
    /// Classifies an error: transient and unavailable conditions are failures, anything
    /// else is a success for health purposes.
    pub fn from_recovery(error: &impl Recovery) -> Self {
        match error.recovery().kind() {
            RecoveryKind::Retry | RecoveryKind::Unavailable => Self::Failure,
            _ => Self::Success,
        }
    }

    /// Classifies a call result.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(error) => Self::from_recovery(error),
        }
    }

    /// Returns the outcome name used in log events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Counters describing a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    /// The current state.
    pub state: CircuitState,
    /// Outcomes recorded as successes.
    pub successes: u64,
    /// Outcomes recorded as failures.
    pub failures: u64,
    /// Calls rejected without executing.
    pub rejections: u64,
}

/// A circuit breaker guarding calls for one tag.
pub trait CircuitBreaker: Send + Sync + Debug {
    /// The tag this breaker guards.
    fn tag(&self) -> &str;

    /// Asks whether a call may proceed.
    fn enter(&self) -> Admission;

    /// Records the outcome of a call previously admitted by [`enter`](Self::enter).
    fn exit(&self, outcome: Outcome, mode: ExecutionMode);

    /// Returns the current counters.
    fn stats(&self) -> BreakerStats;

    /// Rejects every call until [`reset`](Self::reset).
    fn force_open(&self);

    /// Admits every call without recording outcomes until [`reset`](Self::reset).
    fn disable(&self);

    /// Returns to the closed state with an empty window and zeroed counters.
    fn reset(&self);
}

/// The tag that makes [`BreakerOverride::Reset`] apply to every circuit breaker.
pub const ALL_CIRCUIT_BREAKERS: &str = "all";

/// An operator override applied to a circuit breaker through
/// [`ResilienceBackend::override_circuit_breaker`].
///
/// Parses from `FORCE_OPEN_CB`, `FORCE_CLOSE_CB` and `RESET_CB`.
///
/// # Examples
///
/// ```
/// use courier::BreakerOverride;
///
/// let action: BreakerOverride = "FORCE_OPEN_CB".parse().unwrap();
/// assert_eq!(action, BreakerOverride::ForceOpen);
/// assert!("CLOSE".parse::<BreakerOverride>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerOverride {
    /// See [`CircuitBreaker::force_open`].
    ForceOpen,
    /// See [`CircuitBreaker::disable`].
    ForceClose,
    /// See [`CircuitBreaker::reset`].
    Reset,
}

impl BreakerOverride {
    /// Returns the name the override parses from.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForceOpen => "FORCE_OPEN_CB",
            Self::ForceClose => "FORCE_CLOSE_CB",
            Self::Reset => "RESET_CB",
        }
    }
}

impl fmt::Display for BreakerOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreakerOverride {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FORCE_OPEN_CB" => Ok(Self::ForceOpen),
            "FORCE_CLOSE_CB" => Ok(Self::ForceClose),
            "RESET_CB" => Ok(Self::Reset),
            other => Err(Error::configuration(format!("unknown circuit breaker override '{other}'"))),
        }
    }
}

/// Admission into a circuit breaker, recording the call outcome at most once.
///
/// Dropping the permit without calling [`record`](Self::record), for example because the
/// call was cancelled, records nothing.
#[must_use]
pub struct CircuitPermit {
    breaker: Arc<dyn CircuitBreaker>,
    mode: ExecutionMode,
}

impl CircuitPermit {
    /// Enters `breaker`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CircuitOpen`](crate::ErrorKind::CircuitOpen) when the breaker rejects the call.
    pub fn acquire(breaker: Arc<dyn CircuitBreaker>) -> Result<Self> {
        match breaker.enter() {
            Admission::Accepted(mode) => Ok(Self { breaker, mode }),
            Admission::Rejected => Err(Error::circuit_open(breaker.tag())),
        }
    }

    /// How the admitted call executes.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Records the outcome of `result` and releases the permit.
    pub fn record<T>(self, result: &Result<T>) {
        self.record_outcome(Outcome::from_result(result));
    }

    /// Records `outcome` and releases the permit.
    pub fn record_outcome(self, outcome: Outcome) {
        self.breaker.exit(outcome, self.mode);
    }
}

impl Debug for CircuitPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitPermit")
            .field("tag", &self.breaker.tag())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Counters describing a bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadStats {
    /// Calls currently holding capacity.
    pub in_flight: usize,
    /// The capacity, or `None` when unbounded.
    pub max_concurrent: Option<usize>,
    /// Calls admitted so far.
    pub admitted: u64,
    /// Calls rejected for lack of capacity.
    pub rejected: u64,
}

/// Admission control limiting concurrent calls for one tag.
pub trait Bulkhead: Send + Sync + Debug {
    /// The tag this bulkhead guards.
    fn tag(&self) -> &str;

    /// Takes one unit of capacity without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BulkheadRejected`](crate::ErrorKind::BulkheadRejected) when no
    /// capacity is left.
    fn try_acquire(&self) -> Result<BulkheadPermit>;

    /// Returns the current counters.
    fn stats(&self) -> BulkheadStats;
}

/// One unit of bulkhead capacity, released on drop.
#[derive(Debug)]
#[must_use]
pub struct BulkheadPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl BulkheadPermit {
    /// Creates a permit backed by a semaphore permit.
    pub fn new(permit: OwnedSemaphorePermit) -> Self {
        Self { _permit: Some(permit) }
    }

    /// Creates a permit that holds no capacity.
    pub fn unbounded() -> Self {
        Self { _permit: None }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;
    use futures::stream;
    use http::StatusCode;
    use rstest::rstest;
    use tick::Clock;

    use super::*;
    use crate::{BreakerPolicy, BulkheadPolicy, ErrorKind, ResilienceConfig};

    static_assertions::assert_impl_all!(StandardBackend: Send, Sync);
    static_assertions::assert_impl_all!(PassThroughBackend: Send, Sync);
    static_assertions::assert_impl_all!(CircuitPermit: Send);

    fn backend() -> StandardBackend {
        let config = ResilienceConfig::default()
            .with_breaker(
                "tight",
                BreakerPolicy {
                    min_throughput: 1,
                    failure_threshold: 0.5,
                    ..BreakerPolicy::default()
                },
            )
            .with_bulkhead(
                "single",
                BulkheadPolicy {
                    max_concurrent: 1,
                    queue_depth: 0,
                },
            );
        StandardBackend::new(config, Clock::new_frozen()).unwrap()
    }

    #[rstest]
    #[case(Error::server(StatusCode::INTERNAL_SERVER_ERROR), Outcome::Failure)]
    #[case(Error::timeout("slow"), Outcome::Failure)]
    #[case(Error::transport("reset"), Outcome::Failure)]
    #[case(Error::client(StatusCode::NOT_FOUND), Outcome::Success)]
    #[case(Error::codec("bad body"), Outcome::Success)]
    fn outcome_follows_recovery(#[case] error: Error, #[case] expected: Outcome) {
        assert_eq!(Outcome::from_recovery(&error), expected);
        assert_eq!(Outcome::from_result::<()>(&Err(error)), expected);
    }

    #[rstest]
    #[case("FORCE_OPEN_CB", BreakerOverride::ForceOpen)]
    #[case("FORCE_CLOSE_CB", BreakerOverride::ForceClose)]
    #[case("RESET_CB", BreakerOverride::Reset)]
    fn breaker_override_parses(#[case] name: &str, #[case] expected: BreakerOverride) {
        assert_eq!(name.parse::<BreakerOverride>().unwrap(), expected);
        assert_eq!(expected.to_string(), name);
    }

    #[test]
    fn unknown_breaker_override_is_a_configuration_error() {
        let error = "force_open_cb".parse::<BreakerOverride>().unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.to_string().contains("unknown circuit breaker override 'force_open_cb'"));
    }

    #[test]
    fn forced_open_breaker_short_circuits() {
        let backend = backend();
        backend.override_circuit_breaker("svc", BreakerOverride::ForceOpen);
        let call: BlockingCall<'_, u32> = Box::new(|| Ok(7));

        let error = backend.decorate_circuit_breaker("svc", call)().unwrap_err();

        assert_eq!(error.kind(), ErrorKind::CircuitOpen);
    }

    #[test]
    fn decorate_circuit_breaker_records_once() {
        let backend = backend();
        let call: BlockingCall<'_, u32> = Box::new(|| Ok(7));

        let result = backend.decorate_circuit_breaker("svc", call)();

        assert_eq!(result.unwrap(), 7);
        let stats = backend.circuit_breaker("svc").stats();
        assert_eq!((stats.successes, stats.failures), (1, 0));
    }

    #[test]
    fn open_breaker_short_circuits_without_invoking() {
        let backend = backend();
        let invoked = AtomicUsize::new(0);

        let failing: BlockingCall<'_, ()> = Box::new(|| Err(Error::server(StatusCode::BAD_GATEWAY)));
        let _ = backend.decorate_circuit_breaker("tight", failing)();

        let counted: BlockingCall<'_, ()> = Box::new(|| {
            invoked.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let error = backend.decorate_circuit_breaker("tight", counted)().unwrap_err();

        assert_eq!(error.kind(), ErrorKind::CircuitOpen);
        assert_eq!(invoked.load(Ordering::Relaxed), 0);
        assert_eq!(backend.circuit_breaker("tight").stats().rejections, 1);
    }

    #[test]
    fn full_bulkhead_rejects_before_breaker() {
        let backend = backend();
        let held = backend.bulkhead("single").try_acquire().unwrap();

        for _ in 0..5 {
            let call: BlockingCall<'_, ()> = Box::new(|| Ok(()));
            let breaker_wrapped = backend.decorate_circuit_breaker("tight", call);
            let error = backend.decorate_bulkhead("single", breaker_wrapped)().unwrap_err();
            assert_eq!(error.kind(), ErrorKind::BulkheadRejected);
        }

        let stats = backend.circuit_breaker("tight").stats();
        assert_eq!((stats.successes, stats.failures, stats.rejections), (0, 0, 0));
        assert_eq!(backend.bulkhead("single").stats().rejected, 5);
        drop(held);
    }

    #[tokio::test]
    async fn async_decoration_is_lazy() {
        let backend = backend();

        let decorated = backend.decorate_circuit_breaker_async("lazy", async { Ok(1) }.boxed());
        assert_eq!(backend.circuit_breaker("lazy").stats().successes, 0);

        assert_eq!(decorated.await.unwrap(), 1);
        assert_eq!(backend.circuit_breaker("lazy").stats().successes, 1);
    }

    #[tokio::test]
    async fn async_bulkhead_holds_capacity_until_done() {
        let backend = backend();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let first = tokio::spawn(backend.decorate_bulkhead_async(
            "single",
            async move {
                let _ = wait.await;
                Ok(())
            }
            .boxed(),
        ));
        tokio::task::yield_now().await;
        while backend.bulkhead("single").stats().in_flight == 0 {
            tokio::task::yield_now().await;
        }

        let second = backend.decorate_bulkhead_async("single", async { Ok(()) }.boxed()).await;
        assert_eq!(second.unwrap_err().kind(), ErrorKind::BulkheadRejected);

        release.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert_eq!(backend.bulkhead("single").stats().in_flight, 0);
    }

    #[tokio::test]
    async fn stream_decoration_records_success_at_end() {
        let backend = backend();
        let call: StreamCall<u32> = stream::iter([Ok(1), Ok(2), Ok(3)]).boxed();

        let items: Vec<_> = backend.decorate_circuit_breaker_stream("stream", call).collect().await;

        assert_eq!(items.len(), 3);
        let stats = backend.circuit_breaker("stream").stats();
        assert_eq!((stats.successes, stats.failures), (1, 0));
    }

    #[test]
    fn dropped_permit_records_nothing() {
        let backend = backend();
        let permit = CircuitPermit::acquire(backend.circuit_breaker("svc")).unwrap();

        assert_eq!(permit.mode(), ExecutionMode::Normal);
        drop(permit);

        let stats = backend.circuit_breaker("svc").stats();
        assert_eq!((stats.successes, stats.failures), (0, 0));
    }
}
