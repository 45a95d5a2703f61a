// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The transport-facing side of a call: request specifications, responses, and the
//! client traits that move them over the wire.

use std::fmt::Debug;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::description::{HttpMethod, Params, ResponseType, RpcMethod, RpcPath};
use crate::{Error, Result};

/// A REST request, projected from a [`CallDescription`](crate::CallDescription).
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequestSpec {
    pub(crate) method: HttpMethod,
    pub(crate) path: String,
    pub(crate) headers: Params,
    pub(crate) path_params: Params,
    pub(crate) query_params: Params,
    pub(crate) payload: Option<Value>,
    pub(crate) response_type: ResponseType,
    pub(crate) retryable: bool,
    pub(crate) retry_tag: String,
}

impl RestRequestSpec {
    /// The HTTP verb.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The path template, with `{name}` placeholders left in place.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path with every `{name}` placeholder replaced by its path parameter.
    ///
    /// Placeholders without a matching parameter are kept verbatim.
    #[must_use]
    pub fn expanded_path(&self) -> String {
        let mut expanded = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|i| open + i) else {
                break;
            };

            expanded.push_str(&rest[..open]);
            let name = &rest[open + 1..close];
            match self.path_params.get(name) {
                Some(value) => expanded.push_str(value),
                None => expanded.push_str(&rest[open..=close]),
            }
            rest = &rest[close + 1..];
        }

        expanded.push_str(rest);
        expanded
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Params {
        &self.headers
    }

    /// Path parameters.
    #[must_use]
    pub fn path_params(&self) -> &Params {
        &self.path_params
    }

    /// Query string parameters.
    #[must_use]
    pub fn query_params(&self) -> &Params {
        &self.query_params
    }

    /// The serialized request body.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// The descriptor of the type the response decodes into.
    #[must_use]
    pub fn response_type(&self) -> &ResponseType {
        &self.response_type
    }

    /// Whether the transport may retry the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// The retry tag the transport should use.
    #[must_use]
    pub fn retry_tag(&self) -> &str {
        &self.retry_tag
    }
}

/// An RPC request, projected from a [`CallDescription`](crate::CallDescription).
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequestSpec {
    pub(crate) path: RpcPath,
    pub(crate) method: RpcMethod,
    pub(crate) headers: Params,
    pub(crate) payload: Option<Value>,
    pub(crate) response_type: ResponseType,
    pub(crate) retryable: bool,
    pub(crate) retry_tag: String,
}

impl RpcRequestSpec {
    /// The method coordinates.
    #[must_use]
    pub fn path(&self) -> &RpcPath {
        &self.path
    }

    /// The method kind.
    #[must_use]
    pub fn method(&self) -> RpcMethod {
        self.method
    }

    /// Request metadata.
    #[must_use]
    pub fn headers(&self) -> &Params {
        &self.headers
    }

    /// The serialized request message.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// The descriptor of the type the response decodes into.
    #[must_use]
    pub fn response_type(&self) -> &ResponseType {
        &self.response_type
    }

    /// Whether the transport may retry the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// The retry tag the transport should use.
    #[must_use]
    pub fn retry_tag(&self) -> &str {
        &self.retry_tag
    }
}

/// A raw response as returned by a transport.
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Creates a response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a response whose body is `value` encoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns a codec error when `value` cannot be serialized.
    pub fn json_body<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(Error::codec)?;
        Ok(Self::new(status, body))
    }

    /// Replaces the response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// The response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw response body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Turns 4xx and 5xx responses into client and server errors.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Client`](crate::ErrorKind::Client) or
    /// [`ErrorKind::Server`](crate::ErrorKind::Server) for error statuses.
    pub fn error_for_status(self) -> Result<Self> {
        match Error::from_status(self.status) {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    /// Decodes the body as JSON. An empty body decodes to `None`.
    ///
    /// # Errors
    ///
    /// Returns a codec error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&self.body).map(Some).map_err(Error::codec)
    }
}

/// A transport issuing HTTP requests synchronously.
///
/// Implementations map transport failures to [`Error::transport`] or [`Error::timeout`];
/// status checking is left to the caller.
pub trait BlockingClient: Send + Sync + Debug {
    /// Issues a `GET` request.
    fn get(&self, request: &RestRequestSpec) -> Result<Response>;

    /// Issues a `POST` request.
    fn post(&self, request: &RestRequestSpec) -> Result<Response>;

    /// Issues a `PUT` request.
    fn put(&self, request: &RestRequestSpec) -> Result<Response>;

    /// Issues a `DELETE` request.
    fn delete(&self, request: &RestRequestSpec) -> Result<Response>;

    /// Issues an `OPTIONS` request.
    fn options(&self, request: &RestRequestSpec) -> Result<Response>;

    /// Issues a `PATCH` request.
    fn patch(&self, request: &RestRequestSpec) -> Result<Response>;

    /// Dispatches `request` to the method matching its verb.
    fn call(&self, request: &RestRequestSpec) -> Result<Response> {
        match request.method() {
            HttpMethod::Get => self.get(request),
            HttpMethod::Post => self.post(request),
            HttpMethod::Put => self.put(request),
            HttpMethod::Delete => self.delete(request),
            HttpMethod::Options => self.options(request),
            HttpMethod::Patch => self.patch(request),
        }
    }
}

/// A transport issuing HTTP requests asynchronously.
pub trait ReactiveClient: Send + Sync + Debug {
    /// Issues a `GET` request.
    fn get(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>>;

    /// Issues a `POST` request.
    fn post(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>>;

    /// Issues a `PUT` request.
    fn put(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>>;

    /// Issues a `DELETE` request.
    fn delete(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>>;

    /// Issues an `OPTIONS` request.
    fn options(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>>;

    /// Issues a `PATCH` request.
    fn patch(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>>;

    /// Dispatches `request` to the method matching its verb.
    fn call(&self, request: RestRequestSpec) -> BoxFuture<'static, Result<Response>> {
        match request.method() {
            HttpMethod::Get => self.get(request),
            HttpMethod::Post => self.post(request),
            HttpMethod::Put => self.put(request),
            HttpMethod::Delete => self.delete(request),
            HttpMethod::Options => self.options(request),
            HttpMethod::Patch => self.patch(request),
        }
    }

    /// Issues `request` and yields the responses of a streaming endpoint.
    ///
    /// The default yields the single response of [`call`](Self::call). Transports that
    /// understand chunked or event-stream bodies override this.
    fn stream(&self, request: RestRequestSpec) -> BoxStream<'static, Result<Response>> {
        self.call(request).into_stream().boxed()
    }
}

/// A transport for RPC methods.
pub trait RpcClient: Send + Sync + Debug {
    /// Returns whether the client can serve `path`.
    fn supports(&self, path: &RpcPath) -> bool;

    /// Invokes a unary method synchronously.
    fn blocking_unary(&self, request: &RpcRequestSpec) -> Result<Response>;

    /// Invokes a unary method asynchronously.
    fn future_unary(&self, request: RpcRequestSpec) -> BoxFuture<'static, Result<Response>>;
}
