// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Return shapes of generated client methods.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt, stream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// A lazy, asynchronous single value.
///
/// Nothing is sent until the value is awaited. Resolves to `Ok(None)` when the response
/// had no body or a failure was silenced.
#[must_use = "a `Single` does nothing unless awaited"]
pub struct Single<T> {
    inner: BoxFuture<'static, Result<Option<T>>>,
}

impl<T> Single<T> {
    /// Wraps a future.
    pub fn new(future: impl Future<Output = Result<Option<T>>> + Send + 'static) -> Self {
        Self { inner: future.boxed() }
    }
}

impl<T: Send + 'static> Single<T> {
    /// A single that resolves to `value`.
    pub fn just(value: T) -> Self {
        Self::new(futures::future::ready(Ok(Some(value))))
    }

    /// A single that resolves to no value.
    pub fn empty() -> Self {
        Self::new(futures::future::ready(Ok(None)))
    }

    /// A single that fails with `error`.
    pub fn error(error: Error) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }
}

impl<T> Future for Single<T> {
    type Output = Result<Option<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for Single<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Single").finish_non_exhaustive()
    }
}

/// A lazy stream of values.
///
/// Nothing is sent until the stream is first polled. A silenced failure ends the stream
/// early; an error that is not handled is yielded as the last item.
#[must_use = "a `Multi` does nothing unless polled"]
pub struct Multi<T> {
    inner: BoxStream<'static, Result<T>>,
}

impl<T> Multi<T> {
    /// Wraps a stream.
    pub fn new(stream: impl Stream<Item = Result<T>> + Send + 'static) -> Self {
        Self { inner: stream.boxed() }
    }
}

impl<T: Send + 'static> Multi<T> {
    /// A stream yielding `value` once.
    pub fn just(value: T) -> Self {
        Self::new(stream::once(futures::future::ready(Ok(value))))
    }

    /// A stream yielding nothing.
    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    /// A stream yielding `error` and ending.
    pub fn error(error: Error) -> Self {
        Self::new(stream::once(futures::future::ready(Err(error))))
    }
}

impl<T: Send + 'static> FromIterator<T> for Multi<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<_> = iter.into_iter().map(Ok).collect();
        Self::new(stream::iter(items))
    }
}

impl<T> Stream for Multi<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl<T> fmt::Debug for Multi<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multi").finish_non_exhaustive()
    }
}

/// The eventual result of a call that is already running.
///
/// Unlike [`Single`], the call starts immediately on a worker. Awaiting the `Pending`
/// waits for it; dropping it does not stop it.
#[must_use = "a `Pending` should be awaited to observe the result of the call"]
pub struct Pending<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    Ready(Option<Result<Option<T>>>),
    Task(JoinHandle<Result<Option<T>>>),
}

impl<T> Unpin for Pending<T> {}

impl<T> Pending<T> {
    /// A pending result that is already known.
    pub fn ready(result: Result<Option<T>>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    /// A pending result holding `value`.
    pub fn just(value: T) -> Self {
        Self::ready(Ok(Some(value)))
    }

    /// A pending result holding no value.
    pub fn empty() -> Self {
        Self::ready(Ok(None))
    }

    /// A pending result holding `error`.
    pub fn error(error: Error) -> Self {
        Self::ready(Err(error))
    }

    pub(crate) fn spawn<F>(runtime: &Handle, future: F) -> Self
    where
        T: Send + 'static,
        F: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        Self {
            state: PendingState::Task(runtime.spawn(future)),
        }
    }

    /// Requests cancellation of the call.
    ///
    /// Cancellation is best-effort: a blocking transport call that already started runs to
    /// completion, but its result is discarded and the `Pending` resolves to a transport error.
    pub fn cancel(&self) {
        if let PendingState::Task(handle) = &self.state {
            handle.abort();
        }
    }

    /// Returns whether the result is available without waiting.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.state {
            PendingState::Ready(_) => true,
            PendingState::Task(handle) => handle.is_finished(),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<Option<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or_else(|| Err(Error::configuration("`Pending` polled after completion"))))
            }
            PendingState::Task(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.unwrap_or_else(|error| Err(Error::transport(error)))),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("finished", &self.is_finished()).finish()
    }
}

/// Builds a return value that reports `error`.
///
/// Generated clients use this to surface errors raised while preparing a call through the
/// method's own return shape.
#[doc(hidden)]
pub trait FromFailure {
    fn from_failure(error: Error) -> Self;
}

impl<T: Send + 'static> FromFailure for Single<T> {
    fn from_failure(error: Error) -> Self {
        Self::error(error)
    }
}

impl<T: Send + 'static> FromFailure for Multi<T> {
    fn from_failure(error: Error) -> Self {
        Self::error(error)
    }
}

impl<T> FromFailure for Pending<T> {
    fn from_failure(error: Error) -> Self {
        Self::error(error)
    }
}

impl<T> FromFailure for Result<Option<T>> {
    fn from_failure(error: Error) -> Self {
        Err(error)
    }
}
