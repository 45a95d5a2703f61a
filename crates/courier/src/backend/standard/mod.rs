// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod breaker;
mod bulkhead;
mod probe;
mod window;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use breaker::StandardCircuitBreaker;
pub use bulkhead::SemaphoreBulkhead;
use tick::Clock;

use super::{Bulkhead, CircuitBreaker, ERR_POISONED_LOCK, ResilienceBackend, WorkerPool};
use crate::{ResilienceConfig, Result};

/// The default [`ResilienceBackend`].
///
/// Breakers, bulkheads and worker pools are created lazily the first time a tag is used
/// and shared by every later call with that tag. Their policies come from a
/// [`ResilienceConfig`]; time comes from the injected [`Clock`].
///
/// # Examples
///
/// ```
/// use courier::{ResilienceBackend, ResilienceConfig, StandardBackend};
/// use tick::Clock;
///
/// let backend = StandardBackend::new(ResilienceConfig::default(), Clock::new_frozen()).unwrap();
/// let breaker = backend.circuit_breaker("billing");
///
/// assert_eq!(breaker.tag(), "billing");
/// ```
#[derive(Debug)]
pub struct StandardBackend {
    config: ResilienceConfig,
    clock: Clock,
    breakers: Mutex<HashMap<String, Arc<StandardCircuitBreaker>>>,
    bulkheads: Mutex<HashMap<String, Arc<SemaphoreBulkhead>>>,
    pools: Mutex<HashMap<String, Arc<WorkerPool>>>,
}

impl StandardBackend {
    /// Creates a backend with the given policies.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `config` does not validate.
    pub fn new(config: ResilienceConfig, clock: Clock) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
            bulkheads: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a backend with the default policies.
    #[must_use]
    pub fn with_defaults(clock: Clock) -> Self {
        Self {
            config: ResilienceConfig::default(),
            clock,
            breakers: Mutex::new(HashMap::new()),
            bulkheads: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// The policies of this backend.
    #[must_use]
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }
}

fn get_or_insert<T>(map: &Mutex<HashMap<String, Arc<T>>>, tag: &str, create: impl FnOnce() -> T) -> Arc<T> {
    let mut map = map.lock().expect(ERR_POISONED_LOCK);

    if let Some(existing) = map.get(tag) {
        return Arc::clone(existing);
    }

    let created = Arc::new(create());
    map.insert(tag.to_owned(), Arc::clone(&created));
    created
}

impl ResilienceBackend for StandardBackend {
    fn circuit_breaker(&self, tag: &str) -> Arc<dyn CircuitBreaker> {
        get_or_insert::<StandardCircuitBreaker>(&self.breakers, tag, || {
            StandardCircuitBreaker::new(tag, self.config.breaker(tag), self.clock.clone())
        })
    }

    fn bulkhead(&self, tag: &str) -> Arc<dyn Bulkhead> {
        get_or_insert::<SemaphoreBulkhead>(&self.bulkheads, tag, || {
            SemaphoreBulkhead::new(tag, self.config.bulkhead(tag).max_concurrent)
        })
    }

    fn worker_pool(&self, tag: &str) -> Arc<WorkerPool> {
        get_or_insert(&self.pools, tag, || {
            let policy = self.config.bulkhead(tag);
            WorkerPool::new(tag, policy.max_concurrent, policy.queue_depth)
        })
    }

    fn shared_pool_size(&self) -> usize {
        self.config.worker_pool_size
    }

    fn reset_all(&self) {
        let breakers: Vec<_> = self.breakers.lock().expect(ERR_POISONED_LOCK).values().map(Arc::clone).collect();

        for breaker in breakers {
            breaker.reset();
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ALL_CIRCUIT_BREAKERS, Admission, BreakerOverride, CircuitState};
    use crate::{BulkheadPolicy, ErrorKind};

    #[test]
    fn instances_are_shared_per_tag() {
        let backend = StandardBackend::with_defaults(Clock::new_frozen());

        assert!(Arc::ptr_eq(&backend.circuit_breaker("a"), &backend.circuit_breaker("a")));
        assert!(!Arc::ptr_eq(&backend.circuit_breaker("a"), &backend.circuit_breaker("b")));
        assert!(Arc::ptr_eq(&backend.bulkhead("a"), &backend.bulkhead("a")));
        assert!(Arc::ptr_eq(&backend.worker_pool("a"), &backend.worker_pool("a")));
        assert_eq!(backend.breakers.lock().unwrap().len(), 2);
    }

    #[test]
    fn tags_use_their_policy_or_the_default() {
        let config = ResilienceConfig::default().with_bulkhead(
            "reports",
            BulkheadPolicy {
                max_concurrent: 3,
                queue_depth: 2,
            },
        );
        let backend = StandardBackend::new(config, Clock::new_frozen()).unwrap();

        assert_eq!(backend.bulkhead("reports").stats().max_concurrent, Some(3));
        assert_eq!(backend.bulkhead("search").stats().max_concurrent, Some(25));
        assert_eq!(backend.worker_pool("reports").stats().max_concurrent, Some(3));
        assert_eq!(backend.shared_pool_size(), 16);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ResilienceConfig {
            worker_pool_size: 0,
            ..ResilienceConfig::default()
        };

        let error = StandardBackend::new(config, Clock::new_frozen()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn overrides_apply_to_the_tagged_breaker() {
        let backend = StandardBackend::with_defaults(Clock::new_frozen());

        backend.override_circuit_breaker("billing", BreakerOverride::ForceOpen);
        backend.override_circuit_breaker("search", BreakerOverride::ForceClose);

        assert_eq!(backend.circuit_breaker("billing").enter(), Admission::Rejected);
        assert_eq!(backend.circuit_breaker("search").stats().state, CircuitState::Disabled);
        assert_eq!(backend.circuit_breaker("users").stats().state, CircuitState::Closed);

        backend.override_circuit_breaker("billing", BreakerOverride::Reset);

        assert_eq!(backend.circuit_breaker("billing").stats().state, CircuitState::Closed);
        assert_eq!(backend.circuit_breaker("search").stats().state, CircuitState::Disabled);
    }

    #[test]
    fn reset_all_covers_every_breaker() {
        let backend = StandardBackend::with_defaults(Clock::new_frozen());
        backend.override_circuit_breaker("billing", BreakerOverride::ForceOpen);
        backend.override_circuit_breaker("search", BreakerOverride::ForceClose);

        backend.override_circuit_breaker(ALL_CIRCUIT_BREAKERS, BreakerOverride::Reset);

        assert_eq!(backend.circuit_breaker("billing").stats().state, CircuitState::Closed);
        assert_eq!(backend.circuit_breaker("search").stats().state, CircuitState::Closed);
        assert_eq!(backend.breakers.lock().unwrap().len(), 2);
    }
}
