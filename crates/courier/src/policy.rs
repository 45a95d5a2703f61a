// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::future::IntoFuture;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::backend::StreamCall;
use crate::{CallDescription, Error, ErrorKind, Multi, Params, Result};

/// A substitute producing the result of a failed call.
///
/// The closure receives the original payload and headers of the call.
#[must_use]
pub struct Fallback<R> {
    call: Box<dyn FnOnce(Option<Value>, Params) -> R + Send>,
}

impl<R> Fallback<R> {
    /// Wraps `call`.
    pub fn new(call: impl FnOnce(Option<Value>, Params) -> R + Send + 'static) -> Self {
        Self { call: Box::new(call) }
    }

    fn invoke(self, description: &CallDescription) -> R {
        (self.call)(description.payload().cloned(), description.headers().clone())
    }
}

impl<R> fmt::Debug for Fallback<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").finish_non_exhaustive()
    }
}

pub(crate) enum Decision<R> {
    Silence,
    Fallback(R),
    Propagate(Error),
}

/// Applies the failure policy of `description` to `error`.
///
/// Configuration errors always propagate. Otherwise a silent call swallows the error. A
/// client error never reaches the fallback.
pub(crate) fn decide<R>(error: Error, description: &CallDescription, fallback: Option<Fallback<R>>) -> Decision<R> {
    if error.kind() == ErrorKind::Configuration {
        return Decision::Propagate(error);
    }

    if description.is_silent() {
        tracing::event!(
            name: "courier.silenced",
            tracing::Level::DEBUG,
            message = "call failed, failure silenced",
            courier.service = description.service(),
            courier.request = %description.request_line(),
            error.kind = error.kind().as_str(),
            error.message = %error,
        );
        return Decision::Silence;
    }

    if error.kind() == ErrorKind::Client {
        return Decision::Propagate(error);
    }

    match fallback {
        Some(fallback) => {
            tracing::event!(
                name: "courier.fallback",
                tracing::Level::WARN,
                message = "call failed, invoking fallback",
                courier.service = description.service(),
                courier.request = %description.request_line(),
                courier.fallback = description.fallback().unwrap_or_default(),
                error.kind = error.kind().as_str(),
                error.message = %error,
            );
            Decision::Fallback(fallback.invoke(description))
        }
        None => Decision::Propagate(error),
    }
}

pub(crate) fn resolve_blocking<T>(
    result: Result<Option<T>>,
    description: &CallDescription,
    fallback: Option<Fallback<Result<Option<T>>>>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(value),
        Err(error) => match decide(error, description, fallback) {
            Decision::Silence => Ok(None),
            Decision::Fallback(result) => result,
            Decision::Propagate(error) => Err(error),
        },
    }
}

pub(crate) async fn resolve_async<T, R>(
    result: Result<Option<T>>,
    description: &CallDescription,
    fallback: Option<Fallback<R>>,
) -> Result<Option<T>>
where
    R: IntoFuture<Output = Result<Option<T>>>,
{
    match result {
        Ok(value) => Ok(value),
        Err(error) => match decide(error, description, fallback) {
            Decision::Silence => Ok(None),
            Decision::Fallback(substitute) => substitute.await,
            Decision::Propagate(error) => Err(error),
        },
    }
}

/// Applies the failure policy to the first error of a stream.
pub(crate) struct PolicyStream<T> {
    state: StreamState<T>,
    description: CallDescription,
    fallback: Option<Fallback<Multi<T>>>,
}

enum StreamState<T> {
    Primary(StreamCall<T>),
    Fallback(Multi<T>),
    Done,
}

impl<T> PolicyStream<T> {
    pub fn new(inner: StreamCall<T>, description: CallDescription, fallback: Option<Fallback<Multi<T>>>) -> Self {
        Self {
            state: StreamState::Primary(inner),
            description,
            fallback,
        }
    }
}

impl<T> Stream for PolicyStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                StreamState::Primary(inner) => match ready!(inner.poll_next_unpin(cx)) {
                    Some(Ok(item)) => return Poll::Ready(Some(Ok(item))),
                    None => {
                        this.state = StreamState::Done;
                        return Poll::Ready(None);
                    }
                    Some(Err(error)) => match decide(error, &this.description, this.fallback.take()) {
                        Decision::Silence => {
                            this.state = StreamState::Done;
                            return Poll::Ready(None);
                        }
                        Decision::Fallback(substitute) => this.state = StreamState::Fallback(substitute),
                        Decision::Propagate(error) => {
                            this.state = StreamState::Done;
                            return Poll::Ready(Some(Err(error)));
                        }
                    },
                },
                StreamState::Fallback(substitute) => {
                    let item = ready!(substitute.poll_next_unpin(cx));
                    if item.is_none() {
                        this.state = StreamState::Done;
                    }
                    return Poll::Ready(item);
                }
                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}
