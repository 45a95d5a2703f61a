// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stub transports for exercising generated clients.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use courier::{BlockingClient, ReactiveClient, Response, RestRequestSpec, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
}

impl User {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_owned() }
    }
}

/// An HTTP transport answering from a script, usable as both a blocking and a reactive client.
///
/// Clones share state, so a test can keep a handle to a stub it registered.
#[derive(Debug, Clone, Default)]
pub struct Stub {
    inner: Arc<StubState>,
}

#[derive(Debug, Default)]
struct StubState {
    script: Mutex<VecDeque<Result<Response>>>,
    fallback: Mutex<Option<(StatusCode, String)>>,
    requests: Mutex<Vec<RestRequestSpec>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    calls: AtomicUsize,
}

impl Stub {
    /// A stub answering every request with `status` and `body`.
    pub fn always(status: StatusCode, body: &str) -> Self {
        let stub = Self::default();
        *stub.inner.fallback.lock().unwrap() = Some((status, body.to_owned()));
        stub
    }

    /// A stub answering with `responses` in order.
    pub fn scripted(responses: impl IntoIterator<Item = Result<Response>>) -> Self {
        let stub = Self::default();
        stub.inner.script.lock().unwrap().extend(responses);
        stub
    }

    /// Makes the next request wait until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.inner.gate.lock().unwrap() = Some(gate);
        release
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RestRequestSpec> {
        self.inner.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &RestRequestSpec) -> Result<Response> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.requests.lock().unwrap().push(request.clone());

        if let Some(response) = self.inner.script.lock().unwrap().pop_front() {
            return response;
        }

        let fallback = self.inner.fallback.lock().unwrap().clone();
        let (status, body) = fallback.unwrap_or((StatusCode::NO_CONTENT, String::new()));
        Ok(Response::new(status, body))
    }

    fn respond_async(&self, request: &RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        let response = self.next(request);
        let gate = self.inner.gate.lock().unwrap().take();

        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            response
        }
        .boxed()
    }
}

impl BlockingClient for Stub {
    fn get(&self, request: &RestRequestSpec) -> Result<Response> {
        self.next(request)
    }

    fn post(&self, request: &RestRequestSpec) -> Result<Response> {
        self.next(request)
    }

    fn put(&self, request: &RestRequestSpec) -> Result<Response> {
        self.next(request)
    }

    fn delete(&self, request: &RestRequestSpec) -> Result<Response> {
        self.next(request)
    }

    fn options(&self, request: &RestRequestSpec) -> Result<Response> {
        self.next(request)
    }

    fn patch(&self, request: &RestRequestSpec) -> Result<Response> {
        self.next(request)
    }
}

impl ReactiveClient for Stub {
    fn get(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        self.respond_async(&request)
    }

    fn post(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        self.respond_async(&request)
    }

    fn put(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        self.respond_async(&request)
    }

    fn delete(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        self.respond_async(&request)
    }

    fn options(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        self.respond_async(&request)
    }

    fn patch(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        self.respond_async(&request)
    }
}
