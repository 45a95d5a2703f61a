// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::description::RpcPath;
use crate::transport::{Response, RpcClient, RpcRequestSpec};
use crate::{Error, Result};

type Handler = Arc<dyn Fn(RpcRequestSpec) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// An [`RpcClient`] that serves a fixed set of methods with user-supplied handlers.
///
/// Each bound method maps its coordinates to an asynchronous handler. Blocking calls
/// drive the handler to completion on the calling thread.
///
/// # Examples
///
/// ```
/// use courier::{BoundRpcClient, Response, RpcClient, RpcPath};
/// use http::StatusCode;
///
/// let client = BoundRpcClient::builder()
///     .bind(RpcPath::new("acme.v1", "Users", "Get"), |_request| async {
///         Ok(Response::new(StatusCode::OK, r#"{"id":"1"}"#))
///     })
///     .build();
///
/// assert!(client.supports(&RpcPath::new("acme.v1", "Users", "Get")));
/// ```
#[derive(Clone)]
pub struct BoundRpcClient {
    handlers: Arc<HashMap<RpcPath, Handler>>,
}

impl BoundRpcClient {
    /// Starts binding methods.
    #[must_use]
    pub fn builder() -> BoundRpcClientBuilder {
        BoundRpcClientBuilder {
            handlers: HashMap::new(),
        }
    }

    fn handler(&self, path: &RpcPath) -> Result<&Handler> {
        self.handlers
            .get(path)
            .ok_or_else(|| Error::configuration(format!("no handler bound for RPC method '{path}'")))
    }
}

impl RpcClient for BoundRpcClient {
    fn supports(&self, path: &RpcPath) -> bool {
        self.handlers.contains_key(path)
    }

    fn blocking_unary(&self, request: &RpcRequestSpec) -> Result<Response> {
        let handler = self.handler(request.path())?;
        futures::executor::block_on(handler(request.clone()))
    }

    fn future_unary(&self, request: RpcRequestSpec) -> BoxFuture<'static, Result<Response>> {
        match self.handler(request.path()) {
            Ok(handler) => handler(request),
            Err(error) => futures::future::ready(Err(error)).boxed(),
        }
    }
}

impl fmt::Debug for BoundRpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.handlers.keys().map(ToString::to_string).collect();
        methods.sort_unstable();
        f.debug_struct("BoundRpcClient").field("methods", &methods).finish()
    }
}

/// Builder for [`BoundRpcClient`].
pub struct BoundRpcClientBuilder {
    handlers: HashMap<RpcPath, Handler>,
}

impl BoundRpcClientBuilder {
    /// Binds `handler` to the method at `path`.
    #[must_use]
    pub fn bind<F, Fut>(mut self, path: RpcPath, handler: F) -> Self
    where
        F: Fn(RpcRequestSpec) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.handlers.insert(path, Arc::new(move |request| handler(request).boxed()));
        self
    }

    /// Builds the client.
    #[must_use]
    pub fn build(self) -> BoundRpcClient {
        BoundRpcClient {
            handlers: Arc::new(self.handlers),
        }
    }
}

impl fmt::Debug for BoundRpcClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRpcClientBuilder")
            .field("methods", &self.handlers.len())
            .finish()
    }
}
