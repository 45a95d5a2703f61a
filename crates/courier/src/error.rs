// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use http::StatusCode;
use recoverable::{Recovery, RecoveryInfo};

/// Classifies a failed call.
///
/// The kind decides how the failure policy of a call treats the error: configuration
/// failures always propagate, client errors never reach a fallback, and the remaining
/// runtime failures are subject to silencing or fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Invalid setup: unknown service, missing runtime, unbound RPC method or invalid policy.
    Configuration,
    /// The downstream service answered with a status in the 400-499 range.
    Client,
    /// The downstream service answered with a status in the 500-599 range.
    Server,
    /// The transport gave up waiting for the downstream service.
    Timeout,
    /// The circuit breaker for the call's tag rejected the call.
    CircuitOpen,
    /// The bulkhead for the call's tag had no capacity left.
    BulkheadRejected,
    /// Any other transport-layer failure.
    Transport,
    /// Encoding the payload or decoding the response body failed.
    Codec,
}

impl ErrorKind {
    /// Returns a stable, lowercase name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Client => "client",
            Self::Server => "server",
            Self::Timeout => "timeout",
            Self::CircuitOpen => "circuit_open",
            Self::BulkheadRejected => "bulkhead_rejected",
            Self::Transport => "transport",
            Self::Codec => "codec",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while preparing, dispatching or decoding a call.
///
/// Every error carries an [`ErrorKind`] and, when the failure originates from a
/// response, the HTTP status code that produced it.
///
/// # Examples
///
/// ```
/// use courier::{Error, ErrorKind};
/// use http::StatusCode;
///
/// let error = Error::from_status(StatusCode::SERVICE_UNAVAILABLE).unwrap();
///
/// assert_eq!(error.kind(), ErrorKind::Server);
/// assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
/// ```
#[ohno::error]
#[display("courier call failed ({kind})")]
pub struct Error {
    kind: ErrorKind,
    status: Option<StatusCode>,
}

impl Error {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Configuration, None::<StatusCode>, message)
    }

    /// Creates a client error for a 4xx status.
    pub fn client(status: StatusCode) -> Self {
        Self::caused_by(ErrorKind::Client, Some(status), format!("downstream answered {status}"))
    }

    /// Creates a server error for a 5xx status.
    pub fn server(status: StatusCode) -> Self {
        Self::caused_by(ErrorKind::Server, Some(status), format!("downstream answered {status}"))
    }

    /// Maps a response status to an error.
    ///
    /// Returns `None` for statuses outside the 400-599 range.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_client_error() {
            Some(Self::client(status))
        } else if status.is_server_error() {
            Some(Self::server(status))
        } else {
            None
        }
    }

    /// Creates a timeout error.
    pub fn timeout(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Timeout, None::<StatusCode>, cause)
    }

    /// Creates the error returned when the circuit breaker of `tag` rejects a call.
    #[must_use]
    pub fn circuit_open(tag: &str) -> Self {
        Self::caused_by(
            ErrorKind::CircuitOpen,
            None::<StatusCode>,
            format!("circuit breaker '{tag}' is open"),
        )
    }

    /// Creates the error returned when the bulkhead of `tag` has no capacity left.
    #[must_use]
    pub fn bulkhead_rejected(tag: &str) -> Self {
        Self::caused_by(
            ErrorKind::BulkheadRejected,
            None::<StatusCode>,
            format!("bulkhead '{tag}' is at capacity"),
        )
    }

    /// Creates a transport error wrapping `cause`.
    pub fn transport(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Transport, None::<StatusCode>, cause)
    }

    /// Creates a codec error wrapping `cause`.
    pub fn codec(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Codec, None::<StatusCode>, cause)
    }

    /// Returns the kind of the failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the response status that caused the failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

impl Recovery for Error {
    fn recovery(&self) -> RecoveryInfo {
        match self.kind {
            ErrorKind::Server | ErrorKind::Timeout | ErrorKind::Transport => RecoveryInfo::retry(),
            ErrorKind::CircuitOpen | ErrorKind::BulkheadRejected => RecoveryInfo::unavailable(),
            ErrorKind::Configuration | ErrorKind::Client | ErrorKind::Codec => RecoveryInfo::never(),
        }
    }
}

/// A `Result` that may contain an [`Error`] from this crate.
pub type Result<T> = std::result::Result<T, Error>;
