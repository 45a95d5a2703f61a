// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;

use serde::Serialize;
use serde_json::Value;

use crate::transport::{RestRequestSpec, RpcRequestSpec};
use crate::{Error, Result};

/// Named string values such as headers, path parameters or query parameters.
pub type Params = BTreeMap<String, String>;

/// Conversion into [`Params`], used by the [`CallDescriptionBuilder`] merge methods.
pub trait IntoParams {
    /// Converts `self` into a parameter map.
    fn into_params(self) -> Params;
}

impl IntoParams for Params {
    fn into_params(self) -> Params {
        self
    }
}

impl IntoParams for &Params {
    fn into_params(self) -> Params {
        self.clone()
    }
}

impl<S: BuildHasher> IntoParams for HashMap<String, String, S> {
    fn into_params(self) -> Params {
        self.into_iter().collect()
    }
}

impl<S: BuildHasher> IntoParams for &HashMap<String, String, S> {
    fn into_params(self) -> Params {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> IntoParams for [(K, V); N] {
    fn into_params(self) -> Params {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

/// The protocol a call travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// REST-style HTTP.
    Http,
    /// Remote procedure call.
    Rpc,
}

impl Protocol {
    /// Returns the protocol name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Rpc => "RPC",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP verbs a declared call can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
    /// `OPTIONS`
    Options,
}

impl HttpMethod {
    /// Returns the verb as it appears on the request line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Options => Self::OPTIONS,
        }
    }
}

/// The streaming kind of an RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    /// One request, one response.
    Unary,
    /// One request, a stream of responses.
    ServerStreaming,
    /// A stream of requests, one response.
    ClientStreaming,
    /// Streams in both directions.
    BidiStreaming,
}

impl RpcMethod {
    /// Returns the method kind name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "UNARY",
            Self::ServerStreaming => "SERVER_STREAMING",
            Self::ClientStreaming => "CLIENT_STREAMING",
            Self::BidiStreaming => "BIDI_STREAMING",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinates of an RPC method: package, service class and method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RpcPath {
    package: String,
    service: String,
    method: String,
}

impl RpcPath {
    /// Creates RPC coordinates.
    pub fn new(package: impl Into<String>, service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            service: service.into(),
            method: method.into(),
        }
    }

    /// The fully-qualified package, for example `acme.billing.v1`.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// The service class name, for example `Invoices`.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The method name, for example `GetInvoice`.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    fn is_complete(&self) -> bool {
        !self.package.is_empty() && !self.service.is_empty() && !self.method.is_empty()
    }
}

impl fmt::Display for RpcPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.package, self.service, self.method)
    }
}

/// Structural descriptor of the type a response decodes into.
///
/// Type arguments are kept, so `Vec<User>` is described as `Vec` with the argument `User`
/// rather than by its erased container name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResponseType {
    name: String,
    args: Vec<Self>,
}

impl ResponseType {
    /// Creates a descriptor without type arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends a type argument.
    #[must_use]
    pub fn with_arg(mut self, arg: Self) -> Self {
        self.args.push(arg);
        self
    }

    /// The outermost type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type arguments, in declaration order.
    #[must_use]
    pub fn args(&self) -> &[Self] {
        &self.args
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some((first, rest)) = self.args.split_first() {
            write!(f, "<{first}")?;
            for arg in rest {
                write!(f, ", {arg}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Http { method: HttpMethod, path: String },
    Rpc { path: RpcPath, method: RpcMethod },
}

/// Everything needed to issue one call.
///
/// A description is built fresh for every invocation through [`CallDescription::builder`]
/// and is immutable afterwards.
///
/// # Examples
///
/// ```
/// use courier::{CallDescription, HttpMethod, Protocol};
///
/// let description = CallDescription::builder()
///     .service("users")
///     .http(HttpMethod::Get, "/users/{id}")
///     .path_param("id", "42")
///     .header("X-Request-Id", "r-1")
///     .build()
///     .unwrap();
///
/// assert_eq!(description.protocol(), Protocol::Http);
/// assert_eq!(description.circuit_breaker_tag(), "users");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescription {
    service: String,
    target: Target,
    response_type: ResponseType,
    payload: Option<Value>,
    headers: Params,
    path_params: Params,
    query_params: Params,
    silent: bool,
    retryable: bool,
    circuit_breaker_enabled: bool,
    bulkhead_enabled: bool,
    circuit_breaker_tag: String,
    bulkhead_tag: String,
    retry_tag: String,
    fallback: Option<String>,
}

impl CallDescription {
    /// Starts building a description.
    #[must_use]
    pub fn builder() -> CallDescriptionBuilder {
        CallDescriptionBuilder::default()
    }

    /// The target service name, used to look up the transport client.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The protocol of the call.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        match self.target {
            Target::Http { .. } => Protocol::Http,
            Target::Rpc { .. } => Protocol::Rpc,
        }
    }

    /// The HTTP verb, for HTTP calls.
    #[must_use]
    pub fn http_method(&self) -> Option<HttpMethod> {
        match &self.target {
            Target::Http { method, .. } => Some(*method),
            Target::Rpc { .. } => None,
        }
    }

    /// The path template, for HTTP calls.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match &self.target {
            Target::Http { path, .. } => Some(path),
            Target::Rpc { .. } => None,
        }
    }

    /// The RPC coordinates, for RPC calls.
    #[must_use]
    pub fn rpc_path(&self) -> Option<&RpcPath> {
        match &self.target {
            Target::Rpc { path, .. } => Some(path),
            Target::Http { .. } => None,
        }
    }

    /// The RPC method kind, for RPC calls.
    #[must_use]
    pub fn rpc_method(&self) -> Option<RpcMethod> {
        match &self.target {
            Target::Rpc { method, .. } => Some(*method),
            Target::Http { .. } => None,
        }
    }

    /// The descriptor of the type the response decodes into.
    #[must_use]
    pub fn response_type(&self) -> &ResponseType {
        &self.response_type
    }

    /// The serialized request payload.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Params {
        &self.headers
    }

    /// Values substituted into the path template.
    #[must_use]
    pub fn path_params(&self) -> &Params {
        &self.path_params
    }

    /// Query string parameters.
    #[must_use]
    pub fn query_params(&self) -> &Params {
        &self.query_params
    }

    /// Whether a failure yields an empty result instead of an error.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Whether the call may be retried by the transport.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Whether the call goes through the circuit breaker.
    #[must_use]
    pub fn circuit_breaker_enabled(&self) -> bool {
        self.circuit_breaker_enabled
    }

    /// Whether the call goes through the bulkhead.
    #[must_use]
    pub fn bulkhead_enabled(&self) -> bool {
        self.bulkhead_enabled
    }

    /// The circuit breaker tag; defaults to the service name.
    #[must_use]
    pub fn circuit_breaker_tag(&self) -> &str {
        &self.circuit_breaker_tag
    }

    /// The bulkhead tag; defaults to the service name.
    #[must_use]
    pub fn bulkhead_tag(&self) -> &str {
        &self.bulkhead_tag
    }

    /// The retry tag; defaults to the service name.
    #[must_use]
    pub fn retry_tag(&self) -> &str {
        &self.retry_tag
    }

    /// The name of the fallback configured for the call.
    #[must_use]
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// A short request line such as `GET /users/{id}` or `UNARY acme.v1.Users/Get`.
    #[must_use]
    pub fn request_line(&self) -> String {
        match &self.target {
            Target::Http { method, path } => format!("{method} {path}"),
            Target::Rpc { path, method } => format!("{method} {path}"),
        }
    }

    /// Projects the description into a REST request.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the description is not an HTTP call.
    pub fn rest_request(&self) -> Result<RestRequestSpec> {
        match &self.target {
            Target::Http { method, path } => Ok(RestRequestSpec {
                method: *method,
                path: path.clone(),
                headers: self.headers.clone(),
                path_params: self.path_params.clone(),
                query_params: self.query_params.clone(),
                payload: self.payload.clone(),
                response_type: self.response_type.clone(),
                retryable: self.retryable,
                retry_tag: self.retry_tag.clone(),
            }),
            Target::Rpc { path, .. } => Err(Error::configuration(format!(
                "'{path}' of service '{}' is an RPC call and cannot be sent over HTTP",
                self.service
            ))),
        }
    }

    /// Projects the description into an RPC request.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the description is not an RPC call.
    pub fn rpc_request(&self) -> Result<RpcRequestSpec> {
        match &self.target {
            Target::Rpc { path, method } => Ok(RpcRequestSpec {
                path: path.clone(),
                method: *method,
                headers: self.headers.clone(),
                payload: self.payload.clone(),
                response_type: self.response_type.clone(),
                retryable: self.retryable,
                retry_tag: self.retry_tag.clone(),
            }),
            Target::Http { method, path } => Err(Error::configuration(format!(
                "'{method} {path}' of service '{}' is an HTTP call and cannot be sent over RPC",
                self.service
            ))),
        }
    }
}

/// Builder for [`CallDescription`].
///
/// Header, path parameter and query parameter contributions merge: repeated calls
/// accumulate into one map and the last write wins per key.
///
/// Unset flags follow the annotation defaults: calls are silent, not retryable, and
/// neither breaker nor bulkhead is enabled. Unset tags default to the service name.
#[derive(Debug, Default)]
pub struct CallDescriptionBuilder {
    service: String,
    target: Option<Target>,
    response_type: ResponseType,
    payload: Option<std::result::Result<Value, serde_json::Error>>,
    headers: Params,
    path_params: Params,
    query_params: Params,
    silent: Option<bool>,
    retryable: bool,
    circuit_breaker_enabled: bool,
    bulkhead_enabled: bool,
    circuit_breaker_tag: String,
    bulkhead_tag: String,
    retry_tag: String,
    fallback: Option<String>,
}

impl CallDescriptionBuilder {
    /// Sets the target service.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Makes this an HTTP call.
    #[must_use]
    pub fn http(mut self, method: HttpMethod, path: impl Into<String>) -> Self {
        self.target = Some(Target::Http { method, path: path.into() });
        self
    }

    /// Makes this an RPC call.
    #[must_use]
    pub fn rpc(mut self, path: RpcPath, method: RpcMethod) -> Self {
        self.target = Some(Target::Rpc { path, method });
        self
    }

    /// Sets the response descriptor.
    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Serializes `payload` as the request body.
    ///
    /// A serialization failure surfaces from [`build`](Self::build).
    #[must_use]
    pub fn payload<P: Serialize + ?Sized>(mut self, payload: &P) -> Self {
        self.payload = Some(serde_json::to_value(payload));
        self
    }

    /// Sets an already serialized request body.
    #[must_use]
    pub fn payload_value(mut self, payload: Value) -> Self {
        self.payload = Some(Ok(payload));
        self
    }

    /// Merges headers into the description.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoParams) -> Self {
        self.headers.extend(headers.into_params());
        self
    }

    /// Sets a single header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merges path parameters into the description.
    #[must_use]
    pub fn path_params(mut self, params: impl IntoParams) -> Self {
        self.path_params.extend(params.into_params());
        self
    }

    /// Sets a single path parameter.
    #[must_use]
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Merges query parameters into the description.
    #[must_use]
    pub fn query_params(mut self, params: impl IntoParams) -> Self {
        self.query_params.extend(params.into_params());
        self
    }

    /// Sets a single query parameter.
    #[must_use]
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    /// Sets whether failures are silenced.
    #[must_use]
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = Some(silent);
        self
    }

    /// Sets whether the call may be retried.
    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Enables or disables the circuit breaker and sets its tag.
    ///
    /// An empty tag defaults to the service name.
    #[must_use]
    pub fn circuit_breaker(mut self, enabled: bool, tag: impl Into<String>) -> Self {
        self.circuit_breaker_enabled = enabled;
        self.circuit_breaker_tag = tag.into();
        self
    }

    /// Enables or disables the bulkhead and sets its tag.
    ///
    /// An empty tag defaults to the service name.
    #[must_use]
    pub fn bulkhead(mut self, enabled: bool, tag: impl Into<String>) -> Self {
        self.bulkhead_enabled = enabled;
        self.bulkhead_tag = tag.into();
        self
    }

    /// Sets the retry tag. An empty tag defaults to the service name.
    #[must_use]
    pub fn retry_tag(mut self, tag: impl Into<String>) -> Self {
        self.retry_tag = tag.into();
        self
    }

    /// Records the name of the fallback configured for the call.
    #[must_use]
    pub fn fallback(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.fallback = (!name.is_empty()).then_some(name);
        self
    }

    /// Validates and builds the description.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the service or the call target is missing,
    /// and a codec error when the payload could not be serialized.
    pub fn build(self) -> Result<CallDescription> {
        if self.service.is_empty() {
            return Err(Error::configuration("a call description requires a service name"));
        }

        let target = match self.target {
            None => {
                return Err(Error::configuration(format!(
                    "call to service '{}' has neither an HTTP verb nor RPC coordinates",
                    self.service
                )));
            }
            Some(Target::Rpc { path, .. }) if !path.is_complete() => {
                return Err(Error::configuration(format!(
                    "call to service '{}' has incomplete RPC coordinates '{path}'",
                    self.service
                )));
            }
            Some(target) => target,
        };

        let payload = self.payload.transpose().map_err(Error::codec)?;
        let tag_or_service = |tag: String| if tag.is_empty() { self.service.clone() } else { tag };

        Ok(CallDescription {
            circuit_breaker_tag: tag_or_service(self.circuit_breaker_tag),
            bulkhead_tag: tag_or_service(self.bulkhead_tag),
            retry_tag: tag_or_service(self.retry_tag),
            service: self.service,
            target,
            response_type: self.response_type,
            payload,
            headers: self.headers,
            path_params: self.path_params,
            query_params: self.query_params,
            silent: self.silent.unwrap_or(true),
            retryable: self.retryable,
            circuit_breaker_enabled: self.circuit_breaker_enabled,
            bulkhead_enabled: self.bulkhead_enabled,
            fallback: self.fallback,
        })
    }
}
