// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::backend::{ResilienceBackend, WorkerPool};
use crate::executor::{BlockingExecutor, ReactiveExecutor, RpcExecutor};
use crate::registry::{BlockingClients, ClientRegistry, ClientRegistryBuilder, ReactiveClients, RpcClients};
use crate::transport::{BlockingClient, ReactiveClient, RpcClient};
use crate::{Error, Result, RpcPath, StandardBackend};

/// Everything generated clients need at run time: the transport registries, the
/// resilience backend and the executors built on it.
///
/// A context is built once at startup and cloned into every generated client. Cloning is
/// cheap.
///
/// # Examples
///
/// ```
/// use courier::{BoundRpcClient, Context, PassThroughBackend};
///
/// let context = Context::builder(PassThroughBackend::new())
///     .rpc_client("billing", BoundRpcClient::builder().build())
///     .build();
///
/// assert!(context.rpc_clients().contains("billing"));
/// ```
pub struct Context<B = StandardBackend> {
    inner: Arc<Inner<B>>,
}

struct Inner<B> {
    backend: Arc<B>,
    blocking_clients: BlockingClients,
    reactive_clients: ReactiveClients,
    rpc_clients: RpcClients,
    reactive: ReactiveExecutor<B>,
    blocking: BlockingExecutor<B>,
    rpc: RpcExecutor<B>,
}

impl<B: ResilienceBackend> Context<B> {
    /// Starts building a context around `backend`.
    pub fn builder(backend: B) -> ContextBuilder<B> {
        ContextBuilder {
            backend,
            blocking_clients: ClientRegistry::builder(),
            reactive_clients: ClientRegistry::builder(),
            rpc_clients: ClientRegistry::builder(),
            runtime: None,
            worker_pool: None,
        }
    }

    /// The resilience backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Clients used by blocking and blocking-async calls.
    #[must_use]
    pub fn blocking_clients(&self) -> &BlockingClients {
        &self.inner.blocking_clients
    }

    /// Clients used by single and multi reactive calls.
    #[must_use]
    pub fn reactive_clients(&self) -> &ReactiveClients {
        &self.inner.reactive_clients
    }

    /// Clients used by RPC calls.
    #[must_use]
    pub fn rpc_clients(&self) -> &RpcClients {
        &self.inner.rpc_clients
    }

    /// The executor for [`Single`](crate::Single) and [`Multi`](crate::Multi) calls.
    #[must_use]
    pub fn reactive(&self) -> &ReactiveExecutor<B> {
        &self.inner.reactive
    }

    /// The executor for blocking and blocking-async calls.
    #[must_use]
    pub fn blocking(&self) -> &BlockingExecutor<B> {
        &self.inner.blocking
    }

    /// The executor for RPC calls.
    #[must_use]
    pub fn rpc(&self) -> &RpcExecutor<B> {
        &self.inner.rpc
    }
}

impl<B> Clone for Context<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: fmt::Debug> fmt::Debug for Context<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.inner.backend)
            .field("blocking_clients", &self.inner.blocking_clients)
            .field("reactive_clients", &self.inner.reactive_clients)
            .field("rpc_clients", &self.inner.rpc_clients)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder<B> {
    backend: B,
    blocking_clients: ClientRegistryBuilder<dyn BlockingClient>,
    reactive_clients: ClientRegistryBuilder<dyn ReactiveClient>,
    rpc_clients: ClientRegistryBuilder<dyn RpcClient>,
    runtime: Option<Handle>,
    worker_pool: Option<(usize, usize)>,
}

impl<B: ResilienceBackend> ContextBuilder<B> {
    /// Registers the blocking client of `service`.
    #[must_use]
    pub fn blocking_client(mut self, service: impl Into<String>, client: impl BlockingClient + 'static) -> Self {
        self.blocking_clients = self.blocking_clients.client(service, Arc::new(client));
        self
    }

    /// Registers the reactive client of `service`.
    #[must_use]
    pub fn reactive_client(mut self, service: impl Into<String>, client: impl ReactiveClient + 'static) -> Self {
        self.reactive_clients = self.reactive_clients.client(service, Arc::new(client));
        self
    }

    /// Registers the RPC client of `service`.
    #[must_use]
    pub fn rpc_client(mut self, service: impl Into<String>, client: impl RpcClient + 'static) -> Self {
        self.rpc_clients = self.rpc_clients.client(service, Arc::new(client));
        self
    }

    /// Sets the runtime that hosts blocking-async and RPC future calls.
    ///
    /// Defaults to the runtime active when [`build`](Self::build) is called, if any.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sizes the worker pool shared by blocking-async calls without a bulkhead.
    ///
    /// By default the pool runs as many calls as the backend's shared pool size and queues
    /// the rest without limit.
    #[must_use]
    pub fn worker_pool(mut self, max_concurrent: usize, queue_depth: usize) -> Self {
        self.worker_pool = Some((max_concurrent, queue_depth));
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> Context<B> {
        let backend = Arc::new(self.backend);
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        let pool = Arc::new(match self.worker_pool {
            Some((max_concurrent, queue_depth)) => WorkerPool::new(SHARED_POOL_TAG, max_concurrent, queue_depth),
            None => WorkerPool::queueing(SHARED_POOL_TAG, backend.shared_pool_size()),
        });

        Context {
            inner: Arc::new(Inner {
                reactive: ReactiveExecutor::new(Arc::clone(&backend)),
                blocking: BlockingExecutor::new(Arc::clone(&backend), pool, runtime.clone()),
                rpc: RpcExecutor::new(Arc::clone(&backend), runtime),
                blocking_clients: self.blocking_clients.build(),
                reactive_clients: self.reactive_clients.build(),
                rpc_clients: self.rpc_clients.build(),
                backend,
            }),
        }
    }
}

impl<B: fmt::Debug> fmt::Debug for ContextBuilder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("backend", &self.backend)
            .field("runtime", &self.runtime.is_some())
            .field("worker_pool", &self.worker_pool)
            .finish_non_exhaustive()
    }
}

const SHARED_POOL_TAG: &str = "shared";

/// Checks that `service` has an RPC client bound to `path`.
///
/// # Errors
///
/// Returns a configuration error if the service has no RPC client or the client has no
/// binding for `path`.
pub fn require_rpc(clients: &RpcClients, service: &str, path: &RpcPath) -> Result<()> {
    let client = clients.client(service)?;
    if client.supports(path) {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "RPC client of service '{service}' has no binding for '{path}'"
        )))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use tick::Clock;

    use super::*;
    use crate::{BoundRpcClient, ErrorKind, PassThroughBackend};

    static_assertions::assert_impl_all!(Context: Send, Sync, Clone);
    static_assertions::assert_impl_all!(Context<PassThroughBackend>: Send, Sync, Clone);

    #[test]
    fn clones_share_state() {
        let context = Context::builder(StandardBackend::with_defaults(Clock::new_frozen()))
            .rpc_client("billing", BoundRpcClient::builder().build())
            .build();
        let clone = context.clone();

        assert!(std::ptr::eq(context.backend(), clone.backend()));
        assert_eq!(clone.rpc_clients().len(), 1);
        assert!(context.blocking_clients().is_empty());
    }

    #[test]
    fn require_rpc_checks_binding() {
        let path = RpcPath::new("acme.v1", "Users", "Get");
        let context = Context::builder(PassThroughBackend::new())
            .rpc_client(
                "users",
                BoundRpcClient::builder()
                    .bind(path.clone(), |_| async { Err(crate::Error::transport("unused")) })
                    .build(),
            )
            .build();

        require_rpc(context.rpc_clients(), "users", &path).unwrap();
        let unbound = require_rpc(context.rpc_clients(), "users", &RpcPath::new("acme.v1", "Users", "Delete")).unwrap_err();
        let unknown = require_rpc(context.rpc_clients(), "orders", &path).unwrap_err();

        assert_eq!(unbound.kind(), ErrorKind::Configuration);
        assert!(unbound.to_string().contains("Delete"));
        assert_eq!(unknown.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn build_picks_up_current_runtime() {
        let context = Context::builder(PassThroughBackend::new()).build();

        assert!(format!("{:?}", context.blocking()).contains("runtime: true"));
    }

    #[test]
    fn build_without_runtime() {
        let context = Context::builder(PassThroughBackend::new()).worker_pool(2, 2).build();

        assert!(format!("{:?}", context.rpc()).contains("runtime: false"));
    }
}
