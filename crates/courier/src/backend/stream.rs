// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use super::{Bulkhead, BulkheadPermit, CircuitBreaker, CircuitPermit, Outcome, StreamCall};

/// Passes a stream through a circuit breaker.
///
/// The breaker is entered on first poll. The stream ends after the first error.
pub(crate) struct BreakerStream<T> {
    breaker: Option<Arc<dyn CircuitBreaker>>,
    permit: Option<CircuitPermit>,
    inner: Option<StreamCall<T>>,
}

impl<T> BreakerStream<T> {
    pub fn new(breaker: Arc<dyn CircuitBreaker>, inner: StreamCall<T>) -> Self {
        Self {
            breaker: Some(breaker),
            permit: None,
            inner: Some(inner),
        }
    }
}

impl<T> Stream for BreakerStream<T> {
    type Item = crate::Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        if let Some(breaker) = this.breaker.take() {
            match CircuitPermit::acquire(breaker) {
                Ok(permit) => this.permit = Some(permit),
                Err(error) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(error)));
                }
            }
        }

        match inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(item))) => Poll::Ready(Some(Ok(item))),
            Poll::Ready(Some(Err(error))) => {
                if let Some(permit) = this.permit.take() {
                    permit.record_outcome(Outcome::from_recovery(&error));
                }
                this.inner = None;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                if let Some(permit) = this.permit.take() {
                    permit.record_outcome(Outcome::Success);
                }
                this.inner = None;
                Poll::Ready(None)
            }
        }
    }
}

/// Passes a stream through a bulkhead, holding capacity until the stream ends or is dropped.
pub(crate) struct BulkheadStream<T> {
    bulkhead: Option<Arc<dyn Bulkhead>>,
    permit: Option<BulkheadPermit>,
    inner: Option<StreamCall<T>>,
}

impl<T> BulkheadStream<T> {
    pub fn new(bulkhead: Arc<dyn Bulkhead>, inner: StreamCall<T>) -> Self {
        Self {
            bulkhead: Some(bulkhead),
            permit: None,
            inner: Some(inner),
        }
    }
}

impl<T> Stream for BulkheadStream<T> {
    type Item = crate::Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        if let Some(bulkhead) = this.bulkhead.take() {
            match bulkhead.try_acquire() {
                Ok(permit) => this.permit = Some(permit),
                Err(error) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(error)));
                }
            }
        }

        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.inner = None;
                this.permit = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
