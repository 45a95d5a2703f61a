// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use futures::{FutureExt, StreamExt, stream};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Paradigm, decode, decorate_async, decorate_stream, trace_call};
use crate::backend::{AsyncCall, ResilienceBackend, StreamCall};
use crate::policy::{PolicyStream, resolve_async};
use crate::transport::{ReactiveClient, Response};
use crate::{CallDescription, Error, Fallback, Multi, Result, Single};

/// Dispatches HTTP calls returning [`Single`] or [`Multi`].
///
/// Both shapes are lazy: the transport is invoked when the result is first polled.
pub struct ReactiveExecutor<B> {
    backend: Arc<B>,
}

impl<B: ResilienceBackend> ReactiveExecutor<B> {
    /// Creates an executor using `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Dispatches a call yielding at most one value.
    pub fn execute_single<T>(
        &self,
        client: Arc<dyn ReactiveClient>,
        description: CallDescription,
        fallback: Option<Fallback<Single<T>>>,
    ) -> Single<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        trace_call(&description, Paradigm::ReactiveSingle);

        let request = match description.rest_request() {
            Ok(request) => request,
            Err(error) => return Single::error(error),
        };

        let call: AsyncCall<Response> = async move { client.call(request).await?.error_for_status() }.boxed();
        let call = decorate_async(&*self.backend, &description, call);

        Single::new(async move {
            let result = decode(call.await);
            resolve_async(result, &description, fallback).await
        })
    }

    /// Dispatches a call yielding a stream of values.
    ///
    /// A response whose body is a JSON array yields one item per element; any other body
    /// yields a single item, and an empty body none.
    pub fn execute_multi<T>(
        &self,
        client: Arc<dyn ReactiveClient>,
        description: CallDescription,
        fallback: Option<Fallback<Multi<T>>>,
    ) -> Multi<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        trace_call(&description, Paradigm::ReactiveMulti);

        let request = match description.rest_request() {
            Ok(request) => request,
            Err(error) => return Multi::error(error),
        };

        let call: StreamCall<Response> = stream::once(async move { client.stream(request) })
            .flatten()
            .map(|response| response.and_then(Response::error_for_status))
            .boxed();
        let call = decorate_stream(&*self.backend, &description, call);
        let decoded = call.flat_map(|response| stream::iter(decode_elements::<T>(response))).boxed();

        Multi::new(PolicyStream::new(decoded, description, fallback))
    }
}

fn decode_elements<T: DeserializeOwned>(response: Result<Response>) -> Vec<Result<T>> {
    match decode::<Value>(response) {
        Ok(None) => Vec::new(),
        Ok(Some(Value::Array(elements))) => elements.into_iter().map(from_value).collect(),
        Ok(Some(value)) => vec![from_value(value)],
        Err(error) => vec![Err(error)],
    }
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(Error::codec)
}

impl<B> Clone for ReactiveExecutor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: fmt::Debug> fmt::Debug for ReactiveExecutor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveExecutor").field("backend", &self.backend).finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use futures::stream::BoxStream;
    use http::StatusCode;
    use serde::Deserialize;
    use tick::Clock;

    use super::*;
    use crate::transport::RestRequestSpec;
    use crate::{BulkheadPolicy, ErrorKind, HttpMethod, ResilienceConfig, StandardBackend};

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: String,
    }

    #[derive(Debug)]
    struct Scripted {
        responses: Mutex<Vec<Result<Response>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: impl IntoIterator<Item = Result<Response>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn next(&self) -> BoxFuture<'static, Result<Response>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let response = self.responses.lock().unwrap().remove(0);
            futures::future::ready(response).boxed()
        }
    }

    impl ReactiveClient for Scripted {
        fn get(&self, _: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
            self.next()
        }

        fn post(&self, _: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
            self.next()
        }

        fn put(&self, _: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
            self.next()
        }

        fn delete(&self, _: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
            self.next()
        }

        fn options(&self, _: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
            self.next()
        }

        fn patch(&self, _: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
            self.next()
        }

        fn stream(&self, _: RestRequestSpec) -> BoxStream<'static, Result<Response>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let responses: Vec<_> = self.responses.lock().unwrap().drain(..).collect();
            stream::iter(responses).boxed()
        }
    }

    fn ok(body: &str) -> Result<Response> {
        Ok(Response::new(StatusCode::OK, body.to_owned()))
    }

    fn backend() -> Arc<StandardBackend> {
        let config = ResilienceConfig::default().with_bulkhead(
            "users",
            BulkheadPolicy {
                max_concurrent: 1,
                queue_depth: 0,
            },
        );
        Arc::new(StandardBackend::new(config, Clock::new_frozen()).unwrap())
    }

    fn description(silent: bool, cb: bool, bh: bool) -> CallDescription {
        CallDescription::builder()
            .service("users")
            .http(HttpMethod::Get, "/users")
            .silent(silent)
            .circuit_breaker(cb, "")
            .bulkhead(bh, "")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn single_is_lazy_and_decodes() {
        let backend = backend();
        let client = Scripted::new([ok(r#"{"id":"1"}"#)]);
        let executor = ReactiveExecutor::new(Arc::clone(&backend));

        let single = executor.execute_single::<User>(client.clone(), description(false, true, false), None);
        assert_eq!(client.calls.load(Ordering::Relaxed), 0);

        assert_eq!(single.await.unwrap(), Some(User { id: "1".to_owned() }));
        assert_eq!(client.calls.load(Ordering::Relaxed), 1);
        let stats = backend.circuit_breaker("users").stats();
        assert_eq!((stats.successes, stats.failures), (1, 0));
    }

    #[tokio::test]
    async fn single_silences_server_error() {
        let client = Scripted::new([Ok(Response::new(StatusCode::INTERNAL_SERVER_ERROR, ""))]);
        let executor = ReactiveExecutor::new(backend());

        let result = executor.execute_single::<User>(client, description(true, false, false), None).await;

        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn single_uses_fallback() {
        let client = Scripted::new([Err(Error::timeout("slow"))]);
        let executor = ReactiveExecutor::new(backend());
        let fallback = Fallback::new(|_, _| Single::just(User { id: "cached".to_owned() }));

        let result = executor
            .execute_single::<User>(client, description(false, false, false), Some(fallback))
            .await;

        assert_eq!(result.unwrap().unwrap().id, "cached");
    }

    #[tokio::test]
    async fn rpc_description_is_configuration_error() {
        let description = CallDescription::builder()
            .service("users")
            .rpc(crate::RpcPath::new("a", "B", "C"), crate::RpcMethod::Unary)
            .build()
            .unwrap();
        let executor = ReactiveExecutor::new(backend());

        let error = executor
            .execute_single::<User>(Scripted::new([]), description, None)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn multi_flattens_arrays_and_records_once() {
        let backend = backend();
        let client = Scripted::new([ok(r#"[{"id":"1"},{"id":"2"}]"#), ok(r#"{"id":"3"}"#), ok("")]);
        let executor = ReactiveExecutor::new(Arc::clone(&backend));

        let users: Vec<_> = executor
            .execute_multi::<User>(client, description(false, true, true), None)
            .map(|user| user.unwrap().id)
            .collect()
            .await;

        assert_eq!(users, ["1", "2", "3"]);
        let stats = backend.circuit_breaker("users").stats();
        assert_eq!((stats.successes, stats.failures), (1, 0));
        assert_eq!(backend.bulkhead("users").stats().in_flight, 0);
    }

    #[tokio::test]
    async fn multi_error_falls_back() {
        let client = Scripted::new([ok(r#"{"id":"1"}"#), Ok(Response::new(StatusCode::BAD_GATEWAY, ""))]);
        let executor = ReactiveExecutor::new(backend());
        let fallback = Fallback::new(|_, _| Multi::just(User { id: "fb".to_owned() }));

        let users: Vec<_> = executor
            .execute_multi::<User>(client, description(false, false, false), Some(fallback))
            .map(|user| user.unwrap().id)
            .collect()
            .await;

        assert_eq!(users, ["1", "fb"]);
    }
}
