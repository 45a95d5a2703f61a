// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Resilient clients generated from declarative service interfaces.
//!
//! Declare the interface of a downstream service as a trait, annotate each method with the
//! call it maps to, and let [`client`] generate the implementation. Every generated method
//! builds a [`CallDescription`], looks up the transport client registered for the service
//! and dispatches the call through an executor that applies circuit breaking, bulkheads,
//! silent failure and fallbacks.
//!
//! # Quick Start
//!
//! ```
//! use courier::{BoundRpcClient, Context, PassThroughBackend, Response, RpcPath};
//! use http::StatusCode;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Invoice {
//!     total: u32,
//! }
//!
//! #[courier::client]
//! pub trait Billing {
//!     #[unary_rpc(service = "billing", package = "acme.billing.v1", class = "Invoices", method_name = "Get")]
//!     fn invoice(&self, #[payload] id: &str) -> courier::Result<Option<Invoice>>;
//! }
//!
//! # fn main() -> courier::Result<()> {
//! let rpc = BoundRpcClient::builder()
//!     .bind(RpcPath::new("acme.billing.v1", "Invoices", "Get"), |_| async {
//!         Response::json_body(StatusCode::OK, &serde_json::json!({ "total": 12 }))
//!     })
//!     .build();
//!
//! let context = Context::builder(PassThroughBackend::new()).rpc_client("billing", rpc).build();
//! let billing = BillingClient::new(context)?;
//!
//! assert_eq!(billing.invoice("inv-1")?.map(|invoice| invoice.total), Some(12));
//! # Ok(())
//! # }
//! ```
//!
//! # Call Shapes
//!
//! The return type of a declared method selects how it is dispatched:
//!
//! | protocol | return type | dispatch |
//! |---|---|---|
//! | HTTP | [`Single<T>`] | lazy future over a [`ReactiveClient`] |
//! | HTTP | [`Multi<T>`] | lazy stream over a [`ReactiveClient`] |
//! | HTTP | [`Pending<T>`] | [`BlockingClient`] call on a worker pool |
//! | HTTP | [`Result<Option<T>>`] | [`BlockingClient`] call on the calling thread |
//! | RPC | [`Pending<T>`] | [`RpcClient`] future on the runtime |
//! | RPC | [`Result<Option<T>>`] | [`RpcClient`] call on the calling thread |
//!
//! # Call Attributes
//!
//! HTTP methods use `#[get]`, `#[post]`, `#[put]`, `#[delete]`, `#[patch]`, `#[options]` or
//! `#[call(method = "...")]`. RPC methods use `#[unary_rpc]`, `#[server_stream_rpc]`,
//! `#[client_stream_rpc]` or `#[bidi_rpc]`. All of them accept:
//!
//! - `service`: the name the transport client is registered under;
//! - `silent` (default `true`): failures resolve to no value instead of an error;
//! - `retryable`, `retry`: carried to the transport in the request spec;
//! - `cb_enabled`, `circuit_breaker`: enable the circuit breaker and pick its tag;
//! - `bh_enabled`, `bulkhead`: enable the bulkhead and pick its tag;
//! - `fallback`: name of a trait method producing a substitute result.
//!
//! Tags default to the service name. Parameters are marked with `#[payload]`,
//! `#[path_param("name")]`, `#[query("name")]`, `#[header("name")]` or `#[headers]`.
//!
//! # Resilience
//!
//! Policy state lives in a [`ResilienceBackend`]. [`StandardBackend`] keeps a sliding-window
//! circuit breaker and a bulkhead per tag, configured through [`ResilienceConfig`];
//! [`PassThroughBackend`] applies no policy at all. The bulkhead is always checked before the
//! circuit breaker, so calls rejected for lack of capacity never count as breaker failures.
//!
//! Operators can force a breaker open, disable it or reset it by tag with
//! [`ResilienceBackend::override_circuit_breaker`].
//!
//! # Failure Policy
//!
//! Configuration errors always propagate. Any other failure resolves to no value when the
//! call is silent. Otherwise the fallback runs, unless the failure is a client error
//! (4xx), which is returned as is. Without a fallback the failure propagates unchanged.

mod backend;
mod config;
mod context;
mod description;
mod error;
mod executor;
mod policy;
mod registry;
mod reply;
mod rpc;
mod transport;

pub use backend::{
    ALL_CIRCUIT_BREAKERS, Admission, AsyncCall, BlockingCall, BreakerOverride, BreakerStats, Bulkhead, BulkheadPermit,
    BulkheadStats, CircuitBreaker, CircuitPermit, CircuitState, ExecutionMode, Outcome, PassThroughBackend, PoolStats,
    PoolTicket, ResilienceBackend, SemaphoreBulkhead, StandardBackend, StandardCircuitBreaker, StreamCall, WorkerPool,
};
pub use config::{BreakerPolicy, BulkheadPolicy, ResilienceConfig};
pub use context::{Context, ContextBuilder};
pub use courier_macros::client;
pub use description::{
    CallDescription, CallDescriptionBuilder, HttpMethod, IntoParams, Params, Protocol, ResponseType, RpcMethod, RpcPath,
};
pub use error::{Error, ErrorKind, Result};
pub use executor::{BlockingExecutor, Paradigm, ReactiveExecutor, RpcExecutor};
pub use policy::Fallback;
pub use registry::{BlockingClients, ClientRegistry, ClientRegistryBuilder, ReactiveClients, RpcClients};
pub use reply::{Multi, Pending, Single};
pub use rpc::{BoundRpcClient, BoundRpcClientBuilder};
pub use transport::{BlockingClient, ReactiveClient, Response, RestRequestSpec, RpcClient, RpcRequestSpec};

/// Support for code generated by [`client`]. Not part of the public API.
#[doc(hidden)]
pub mod __private {
    pub use serde_json::Value;

    pub use crate::context::require_rpc;
    pub use crate::reply::FromFailure;
}
