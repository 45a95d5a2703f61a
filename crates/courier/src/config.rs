// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::time::Duration;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub(crate) const DEFAULT_FAILURE_THRESHOLD: f32 = 0.1;
pub(crate) const DEFAULT_MIN_THROUGHPUT: u32 = 100;
pub(crate) const DEFAULT_SAMPLING_DURATION: SignedDuration = SignedDuration::from_secs(30);
pub(crate) const DEFAULT_BREAK_DURATION: SignedDuration = SignedDuration::from_secs(5);
pub(crate) const DEFAULT_MAX_CONCURRENT: usize = 25;
pub(crate) const DEFAULT_QUEUE_DEPTH: usize = 100;
pub(crate) const DEFAULT_WORKER_POOL_SIZE: usize = 16;

/// Per-tag resilience policies for the [`StandardBackend`](crate::StandardBackend).
///
/// A tag without its own entry uses the default policy. Durations accept ISO-8601
/// (`"PT30S"`) as well as friendly (`"30s"`) notation.
///
/// # Examples
///
/// ```
/// use courier::ResilienceConfig;
///
/// let config = ResilienceConfig::from_json(
///     r#"{
///         "default_breaker": { "failure_threshold": 0.5, "break_duration": "PT10S" },
///         "bulkheads": { "reports": { "max_concurrent": 4, "queue_depth": 8 } }
///     }"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.bulkhead("reports").max_concurrent, 4);
/// assert_eq!(config.bulkhead("search").max_concurrent, 25);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Breaker policy of tags without an entry in `breakers`.
    pub default_breaker: BreakerPolicy,
    /// Bulkhead policy of tags without an entry in `bulkheads`.
    pub default_bulkhead: BulkheadPolicy,
    /// Breaker policies by tag.
    pub breakers: HashMap<String, BreakerPolicy>,
    /// Bulkhead policies by tag.
    pub bulkheads: HashMap<String, BulkheadPolicy>,
    /// Threads shared by blocking-async calls that do not use a bulkhead.
    pub worker_pool_size: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            default_breaker: BreakerPolicy::default(),
            default_bulkhead: BulkheadPolicy::default(),
            breakers: HashMap::new(),
            bulkheads: HashMap::new(),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

impl ResilienceConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the document is malformed or a policy is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(Error::configuration)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the breaker policy of `tag`.
    #[must_use]
    pub fn with_breaker(mut self, tag: impl Into<String>, policy: BreakerPolicy) -> Self {
        self.breakers.insert(tag.into(), policy);
        self
    }

    /// Sets the bulkhead policy of `tag`.
    #[must_use]
    pub fn with_bulkhead(mut self, tag: impl Into<String>, policy: BulkheadPolicy) -> Self {
        self.bulkheads.insert(tag.into(), policy);
        self
    }

    /// The breaker policy that applies to `tag`.
    #[must_use]
    pub fn breaker(&self, tag: &str) -> &BreakerPolicy {
        self.breakers.get(tag).unwrap_or(&self.default_breaker)
    }

    /// The bulkhead policy that applies to `tag`.
    #[must_use]
    pub fn bulkhead(&self, tag: &str) -> &BulkheadPolicy {
        self.bulkheads.get(tag).unwrap_or(&self.default_bulkhead)
    }

    /// Checks every policy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid policy.
    pub fn validate(&self) -> Result<()> {
        self.default_breaker.validate("default")?;
        self.default_bulkhead.validate("default")?;
        for (tag, policy) in &self.breakers {
            policy.validate(tag)?;
        }
        for (tag, policy) in &self.bulkheads {
            policy.validate(tag)?;
        }
        if self.worker_pool_size == 0 {
            return Err(Error::configuration("worker_pool_size must be greater than zero"));
        }
        Ok(())
    }
}

/// Circuit breaker policy.
///
/// The circuit opens when, within the sampling window, the share of failed calls reaches
/// `failure_threshold` and at least `min_throughput` calls were observed. It then rejects
/// calls for `break_duration` before admitting a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerPolicy {
    /// Failure rate, in `(0, 1]`, at which the circuit opens.
    pub failure_threshold: f32,
    /// Calls that must be observed before the circuit can open.
    pub min_throughput: u32,
    /// Length of the sliding window. Values below one second are raised to one second.
    pub sampling_duration: SignedDuration,
    /// How long the circuit stays open.
    pub break_duration: SignedDuration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            min_throughput: DEFAULT_MIN_THROUGHPUT,
            sampling_duration: DEFAULT_SAMPLING_DURATION,
            break_duration: DEFAULT_BREAK_DURATION,
        }
    }
}

impl BreakerPolicy {
    fn validate(&self, tag: &str) -> Result<()> {
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(Error::configuration(format!(
                "breaker policy '{tag}': failure_threshold must be in (0, 1], got {}",
                self.failure_threshold
            )));
        }
        if self.sampling_duration.is_negative() || self.break_duration.is_negative() {
            return Err(Error::configuration(format!("breaker policy '{tag}': durations must not be negative")));
        }
        Ok(())
    }

    pub(crate) fn sampling(&self) -> Duration {
        Duration::try_from(self.sampling_duration).unwrap_or_default()
    }

    pub(crate) fn break_for(&self) -> Duration {
        Duration::try_from(self.break_duration).unwrap_or_default()
    }
}

/// Bulkhead policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkheadPolicy {
    /// Calls that may run at the same time.
    pub max_concurrent: usize,
    /// Calls that may wait for a worker-pool slot. Semaphore bulkheads do not queue.
    pub queue_depth: usize,
}

impl Default for BulkheadPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl BulkheadPolicy {
    fn validate(&self, tag: &str) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::configuration(format!(
                "bulkhead policy '{tag}': max_concurrent must be greater than zero"
            )));
        }
        Ok(())
    }
}
