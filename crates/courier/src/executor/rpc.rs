// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use super::{Paradigm, decode, decorate_async, decorate_blocking, trace_call};
use crate::backend::{AsyncCall, BlockingCall, ResilienceBackend};
use crate::policy::{resolve_async, resolve_blocking};
use crate::transport::{Response, RpcClient};
use crate::{CallDescription, Error, Fallback, Pending, Result};

/// Dispatches unary RPC calls over an [`RpcClient`].
pub struct RpcExecutor<B> {
    backend: Arc<B>,
    runtime: Option<Handle>,
}

impl<B: ResilienceBackend> RpcExecutor<B> {
    /// Creates an executor. Future calls are spawned onto `runtime`.
    pub fn new(backend: Arc<B>, runtime: Option<Handle>) -> Self {
        Self { backend, runtime }
    }

    /// Invokes a unary method on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the failure of the call unless it was silenced or replaced by the fallback.
    pub fn execute<T>(
        &self,
        client: Arc<dyn RpcClient>,
        description: CallDescription,
        fallback: Option<Fallback<Result<Option<T>>>>,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        trace_call(&description, Paradigm::RpcBlocking);

        let request = description.rpc_request()?;
        let call: BlockingCall<'_, Response> = Box::new(|| client.blocking_unary(&request)?.error_for_status());
        let call = decorate_blocking(&*self.backend, &description, call);

        let result = decode(call());
        resolve_blocking(result, &description, fallback)
    }

    /// Invokes a unary method as a task on the runtime.
    pub fn execute_future<T>(
        &self,
        client: Arc<dyn RpcClient>,
        description: CallDescription,
        fallback: Option<Fallback<Pending<T>>>,
    ) -> Pending<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        trace_call(&description, Paradigm::RpcFuture);

        let Some(runtime) = self.runtime.as_ref() else {
            return Pending::error(Error::configuration(
                "RPC future calls require a tokio runtime; register one with `ContextBuilder::runtime`",
            ));
        };

        let request = match description.rpc_request() {
            Ok(request) => request,
            Err(error) => return Pending::error(error),
        };

        let call: AsyncCall<Response> = async move { client.future_unary(request).await?.error_for_status() }.boxed();
        let call = decorate_async(&*self.backend, &description, call);

        Pending::spawn(runtime, async move {
            let result = decode(call.await);
            resolve_async(result, &description, fallback).await
        })
    }
}

impl<B> Clone for RpcExecutor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            runtime: self.runtime.clone(),
        }
    }
}

impl<B: fmt::Debug> fmt::Debug for RpcExecutor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcExecutor")
            .field("backend", &self.backend)
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}
