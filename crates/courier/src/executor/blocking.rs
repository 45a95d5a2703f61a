// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use super::{Paradigm, decode, decorate_blocking, trace_call};
use crate::backend::{BlockingCall, ResilienceBackend, WorkerPool};
use crate::policy::{resolve_async, resolve_blocking};
use crate::transport::{BlockingClient, Response};
use crate::{CallDescription, Error, Fallback, Pending, Result};

/// Dispatches HTTP calls over a [`BlockingClient`].
///
/// [`execute`](Self::execute) runs on the calling thread. [`execute_async`](Self::execute_async)
/// runs the same call on a worker pool and returns immediately: the bulkhead's worker pool
/// when the call has a bulkhead, the shared pool otherwise.
pub struct BlockingExecutor<B> {
    backend: Arc<B>,
    pool: Arc<WorkerPool>,
    runtime: Option<Handle>,
}

impl<B: ResilienceBackend> BlockingExecutor<B> {
    /// Creates an executor.
    ///
    /// `pool` runs blocking-async calls without a bulkhead. `runtime` hosts the tasks that
    /// wait for the pool; without it, blocking-async calls fail with a configuration error.
    pub fn new(backend: Arc<B>, pool: Arc<WorkerPool>, runtime: Option<Handle>) -> Self {
        Self { backend, pool, runtime }
    }

    /// Dispatches a call on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the failure of the call unless it was silenced or replaced by the fallback.
    pub fn execute<T>(
        &self,
        client: Arc<dyn BlockingClient>,
        description: CallDescription,
        fallback: Option<Fallback<Result<Option<T>>>>,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        trace_call(&description, Paradigm::Blocking);

        let request = description.rest_request()?;
        let call: BlockingCall<'_, Response> = Box::new(|| client.call(&request)?.error_for_status());
        let call = decorate_blocking(&*self.backend, &description, call);

        let result = decode(call());
        resolve_blocking(result, &description, fallback)
    }

    /// Submits a call to a worker pool.
    ///
    /// Admission into the pool is decided before this returns; a full pool yields a
    /// [`Pending`] holding a bulkhead rejection. The circuit breaker is entered on the worker.
    pub fn execute_async<T>(
        &self,
        client: Arc<dyn BlockingClient>,
        description: CallDescription,
        fallback: Option<Fallback<Pending<T>>>,
    ) -> Pending<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        trace_call(&description, Paradigm::BlockingAsync);

        let Some(runtime) = self.runtime.as_ref() else {
            return Pending::error(Error::configuration(
                "blocking-async calls require a tokio runtime; register one with `ContextBuilder::runtime`",
            ));
        };

        let request = match description.rest_request() {
            Ok(request) => request,
            Err(error) => return Pending::error(error),
        };

        let pool = if description.bulkhead_enabled() {
            self.backend.worker_pool(description.bulkhead_tag())
        } else {
            Arc::clone(&self.pool)
        };
        let admission = pool.try_admit();

        let backend = Arc::clone(&self.backend);
        let call_description = description.clone();

        Pending::spawn(runtime, async move {
            let result = match admission {
                Ok(ticket) => {
                    ticket
                        .run(move || {
                            let call: BlockingCall<'_, Response> = Box::new(|| client.call(&request)?.error_for_status());
                            let call = if call_description.circuit_breaker_enabled() {
                                backend.decorate_circuit_breaker(call_description.circuit_breaker_tag(), call)
                            } else {
                                call
                            };
                            decode(call())
                        })
                        .await
                }
                Err(error) => Err(error),
            };

            resolve_async(result, &description, fallback).await
        })
    }
}

impl<B> Clone for BlockingExecutor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            pool: Arc::clone(&self.pool),
            runtime: self.runtime.clone(),
        }
    }
}

impl<B: fmt::Debug> fmt::Debug for BlockingExecutor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingExecutor")
            .field("backend", &self.backend)
            .field("pool", &self.pool)
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, mpsc};

    use http::StatusCode;
    use serde::Deserialize;
    use tick::Clock;

    use super::*;
    use crate::transport::RestRequestSpec;
    use crate::{BreakerPolicy, BulkheadPolicy, ErrorKind, HttpMethod, ResilienceConfig, StandardBackend};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        sku: String,
    }

    #[derive(Debug)]
    struct Fixed {
        status: StatusCode,
        body: &'static str,
        calls: AtomicUsize,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl Fixed {
        fn new(status: StatusCode, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                calls: AtomicUsize::new(0),
                gate: Mutex::new(None),
            })
        }

        fn respond(&self) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            Ok(Response::new(self.status, self.body))
        }
    }

    impl BlockingClient for Fixed {
        fn get(&self, _: &RestRequestSpec) -> Result<Response> {
            self.respond()
        }

        fn post(&self, _: &RestRequestSpec) -> Result<Response> {
            self.respond()
        }

        fn put(&self, _: &RestRequestSpec) -> Result<Response> {
            self.respond()
        }

        fn delete(&self, _: &RestRequestSpec) -> Result<Response> {
            self.respond()
        }

        fn options(&self, _: &RestRequestSpec) -> Result<Response> {
            self.respond()
        }

        fn patch(&self, _: &RestRequestSpec) -> Result<Response> {
            self.respond()
        }
    }

    fn backend() -> Arc<StandardBackend> {
        let config = ResilienceConfig::default()
            .with_breaker(
                "inventory",
                BreakerPolicy {
                    min_throughput: 1,
                    ..BreakerPolicy::default()
                },
            )
            .with_bulkhead(
                "inventory",
                BulkheadPolicy {
                    max_concurrent: 1,
                    queue_depth: 0,
                },
            );
        Arc::new(StandardBackend::new(config, Clock::new_frozen()).unwrap())
    }

    fn executor(backend: &Arc<StandardBackend>, runtime: Option<Handle>) -> BlockingExecutor<StandardBackend> {
        BlockingExecutor::new(Arc::clone(backend), Arc::new(WorkerPool::queueing("shared", 2)), runtime)
    }

    fn description(silent: bool, cb: bool, bh: bool) -> CallDescription {
        CallDescription::builder()
            .service("inventory")
            .http(HttpMethod::Get, "/items/{sku}")
            .path_param("sku", "A-1")
            .silent(silent)
            .circuit_breaker(cb, "")
            .bulkhead(bh, "")
            .build()
            .unwrap()
    }

    #[test]
    fn execute_decodes_on_calling_thread() {
        let backend = backend();
        let client = Fixed::new(StatusCode::OK, r#"{"sku":"A-1"}"#);

        let item = executor(&backend, None)
            .execute::<Item>(client, description(false, true, true), None)
            .unwrap();

        assert_eq!(item, Some(Item { sku: "A-1".to_owned() }));
        assert_eq!(backend.circuit_breaker("inventory").stats().successes, 1);
        assert_eq!(backend.bulkhead("inventory").stats().admitted, 1);
    }

    #[test]
    fn silent_server_error_is_none() {
        let backend = backend();
        let client = Fixed::new(StatusCode::INTERNAL_SERVER_ERROR, "");

        let result = executor(&backend, None).execute::<Item>(client, description(true, false, false), None);

        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn open_circuit_skips_transport() {
        let backend = backend();
        let client = Fixed::new(StatusCode::SERVICE_UNAVAILABLE, "");
        let executor = executor(&backend, None);

        let first = executor.execute::<Item>(client.clone(), description(false, true, false), None);
        let second = executor.execute::<Item>(client.clone(), description(false, true, false), None);

        assert_eq!(first.unwrap_err().kind(), ErrorKind::Server);
        assert_eq!(second.unwrap_err().kind(), ErrorKind::CircuitOpen);
        assert_eq!(client.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn four_xx_counts_as_breaker_success() {
        let backend = backend();
        let client = Fixed::new(StatusCode::NOT_FOUND, "");

        let result = executor(&backend, None).execute::<Item>(client, description(false, true, false), None);

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Client);
        let stats = backend.circuit_breaker("inventory").stats();
        assert_eq!((stats.successes, stats.failures), (1, 0));
    }

    #[test]
    fn execute_async_without_runtime_is_configuration_error() {
        let backend = backend();
        let pending = executor(&backend, None).execute_async::<Item>(
            Fixed::new(StatusCode::OK, "{}"),
            description(true, false, false),
            None,
        );

        let error = futures::executor::block_on(pending).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_async_runs_on_pool() {
        let backend = backend();
        let client = Fixed::new(StatusCode::OK, r#"{"sku":"B-2"}"#);

        let item = executor(&backend, Some(Handle::current()))
            .execute_async::<Item>(client, description(false, true, false), None)
            .await
            .unwrap();

        assert_eq!(item.unwrap().sku, "B-2");
        assert_eq!(backend.circuit_breaker("inventory").stats().successes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_worker_pool_rejects_without_touching_breaker() {
        let backend = backend();
        let (release, gate) = mpsc::channel();
        let slow = Fixed::new(StatusCode::OK, r#"{"sku":"C-3"}"#);
        *slow.gate.lock().unwrap() = Some(gate);
        let executor = executor(&backend, Some(Handle::current()));

        let first = executor.execute_async::<Item>(slow.clone(), description(false, true, true), None);
        let rejected: Vec<_> = (0..3)
            .map(|_| executor.execute_async::<Item>(slow.clone(), description(false, true, true), None))
            .collect();

        for pending in rejected {
            assert_eq!(pending.await.unwrap_err().kind(), ErrorKind::BulkheadRejected);
        }
        let stats = backend.circuit_breaker("inventory").stats();
        assert_eq!((stats.successes, stats.failures, stats.rejections), (0, 0, 0));

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap().sku, "C-3");
        assert_eq!(backend.worker_pool("inventory").stats().rejected, 3);
    }
}
