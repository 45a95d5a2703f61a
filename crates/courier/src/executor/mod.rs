// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Executors dispatch a [`CallDescription`] through a transport client and the resilience
//! backend, then apply the failure policy of the call.
//!
//! Every executor follows the same steps:
//!
//! 1. build the base callable, which invokes the transport and turns error statuses into errors;
//! 2. wrap it with the circuit breaker of the call, if enabled;
//! 3. wrap the result with the bulkhead of the call, if enabled, so capacity is checked first;
//! 4. invoke it and decode the response body;
//! 5. on failure, silence the error, run the fallback, or propagate.

mod blocking;
mod reactive;
mod rpc;

use std::fmt;

pub use blocking::BlockingExecutor;
pub use reactive::ReactiveExecutor;
pub use rpc::RpcExecutor;
use serde::de::DeserializeOwned;

use crate::backend::{AsyncCall, BlockingCall, ResilienceBackend, StreamCall};
use crate::transport::Response;
use crate::{CallDescription, Result};

/// The six ways a declared method can be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Paradigm {
    /// HTTP, lazy asynchronous single value.
    ReactiveSingle,
    /// HTTP, lazy asynchronous stream.
    ReactiveMulti,
    /// HTTP, synchronous.
    Blocking,
    /// HTTP, synchronous transport run on a worker pool.
    BlockingAsync,
    /// RPC, synchronous.
    RpcBlocking,
    /// RPC, asynchronous.
    RpcFuture,
}

impl Paradigm {
    /// Returns the paradigm name used in log events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReactiveSingle => "reactive_single",
            Self::ReactiveMulti => "reactive_multi",
            Self::Blocking => "blocking",
            Self::BlockingAsync => "blocking_async",
            Self::RpcBlocking => "rpc_blocking",
            Self::RpcFuture => "rpc_future",
        }
    }
}

impl fmt::Display for Paradigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn trace_call(description: &CallDescription, paradigm: Paradigm) {
    tracing::event!(
        name: "courier.call",
        tracing::Level::DEBUG,
        message = "dispatching call",
        courier.service = description.service(),
        courier.paradigm = paradigm.as_str(),
        courier.request = %description.request_line(),
        courier.headers = ?description.headers(),
        courier.path_params = ?description.path_params(),
        courier.query_params = ?description.query_params(),
        courier.payload = ?description.payload(),
    );
}

pub(crate) fn decorate_blocking<'a, B, T>(backend: &B, description: &CallDescription, call: BlockingCall<'a, T>) -> BlockingCall<'a, T>
where
    B: ResilienceBackend,
    T: Send + 'a,
{
    let call = if description.circuit_breaker_enabled() {
        backend.decorate_circuit_breaker(description.circuit_breaker_tag(), call)
    } else {
        call
    };

    if description.bulkhead_enabled() {
        backend.decorate_bulkhead(description.bulkhead_tag(), call)
    } else {
        call
    }
}

pub(crate) fn decorate_async<B, T>(backend: &B, description: &CallDescription, call: AsyncCall<T>) -> AsyncCall<T>
where
    B: ResilienceBackend,
    T: Send + 'static,
{
    let call = if description.circuit_breaker_enabled() {
        backend.decorate_circuit_breaker_async(description.circuit_breaker_tag(), call)
    } else {
        call
    };

    if description.bulkhead_enabled() {
        backend.decorate_bulkhead_async(description.bulkhead_tag(), call)
    } else {
        call
    }
}

pub(crate) fn decorate_stream<B, T>(backend: &B, description: &CallDescription, call: StreamCall<T>) -> StreamCall<T>
where
    B: ResilienceBackend,
    T: Send + 'static,
{
    let call = if description.circuit_breaker_enabled() {
        backend.decorate_circuit_breaker_stream(description.circuit_breaker_tag(), call)
    } else {
        call
    };

    if description.bulkhead_enabled() {
        backend.decorate_bulkhead_stream(description.bulkhead_tag(), call)
    } else {
        call
    }
}

pub(crate) fn decode<T: DeserializeOwned>(response: Result<Response>) -> Result<Option<T>> {
    response.and_then(|response| response.json())
}
