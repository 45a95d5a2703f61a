// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::transport::{BlockingClient, ReactiveClient, RpcClient};
use crate::{Error, Result};

/// An immutable map from service name to transport client.
///
/// Registries are assembled once, typically while building a [`Context`](crate::Context),
/// and then shared by every generated client. Cloning is cheap.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use courier::ClientRegistry;
///
/// let registry: ClientRegistry<str> = ClientRegistry::builder()
///     .client("users", Arc::from("users-client"))
///     .build();
///
/// assert!(registry.contains("users"));
/// assert!(registry.client("orders").is_err());
/// ```
pub struct ClientRegistry<C: ?Sized> {
    clients: Arc<HashMap<String, Arc<C>>>,
}

/// Registry of blocking HTTP clients.
pub type BlockingClients = ClientRegistry<dyn BlockingClient>;

/// Registry of asynchronous HTTP clients.
pub type ReactiveClients = ClientRegistry<dyn ReactiveClient>;

/// Registry of RPC clients.
pub type RpcClients = ClientRegistry<dyn RpcClient>;

impl<C: ?Sized> ClientRegistry<C> {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ClientRegistryBuilder<C> {
        ClientRegistryBuilder { clients: HashMap::new() }
    }

    /// Creates a registry without clients.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            clients: Arc::new(HashMap::new()),
        }
    }

    /// Looks up the client registered for `service`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no client is registered under `service`.
    pub fn client(&self, service: &str) -> Result<Arc<C>> {
        self.clients
            .get(service)
            .map(Arc::clone)
            .ok_or_else(|| Error::configuration(format!("unknown service '{service}'")))
    }

    /// Checks that every service in `services` has a client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first service without a client.
    pub fn require<'a>(&self, services: impl IntoIterator<Item = &'a str>) -> Result<()> {
        services.into_iter().try_for_each(|service| self.client(service).map(drop))
    }

    /// Returns whether a client is registered under `service`.
    #[must_use]
    pub fn contains(&self, service: &str) -> bool {
        self.clients.contains_key(service)
    }

    /// Iterates over the registered service names.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Returns the number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns whether the registry has no clients.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl<C: ?Sized> Clone for ClientRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            clients: Arc::clone(&self.clients),
        }
    }
}

impl<C: ?Sized> Default for ClientRegistry<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C: ?Sized> fmt::Debug for ClientRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut services: Vec<_> = self.services().collect();
        services.sort_unstable();
        f.debug_struct("ClientRegistry").field("services", &services).finish()
    }
}

impl<C: ?Sized> FromIterator<(String, Arc<C>)> for ClientRegistry<C> {
    fn from_iter<I: IntoIterator<Item = (String, Arc<C>)>>(iter: I) -> Self {
        Self {
            clients: Arc::new(iter.into_iter().collect()),
        }
    }
}

/// Builder for [`ClientRegistry`].
pub struct ClientRegistryBuilder<C: ?Sized> {
    clients: HashMap<String, Arc<C>>,
}

impl<C: ?Sized> ClientRegistryBuilder<C> {
    /// Registers `client` under `service`, replacing any earlier registration.
    #[must_use]
    pub fn client(mut self, service: impl Into<String>, client: Arc<C>) -> Self {
        self.clients.insert(service.into(), client);
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> ClientRegistry<C> {
        ClientRegistry {
            clients: Arc::new(self.clients),
        }
    }
}

impl<C: ?Sized> fmt::Debug for ClientRegistryBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistryBuilder")
            .field("services", &self.clients.len())
            .finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn registry() -> ClientRegistry<str> {
        ClientRegistry::builder()
            .client("users", Arc::from("u1"))
            .client("orders", Arc::from("o1"))
            .client("users", Arc::from("u2"))
            .build()
    }

    #[test]
    fn client_returns_last_registration() {
        assert_eq!(&*registry().client("users").unwrap(), "u2");
        assert_eq!(registry().len(), 2);
    }

    #[test]
    fn unknown_service_is_configuration_error() {
        let error = registry().client("billing").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.to_string().contains("billing"));
    }

    #[test]
    fn require_reports_first_missing_service() {
        let registry = registry();

        registry.require(["users", "orders"]).unwrap();
        let error = registry.require(["users", "billing", "search"]).unwrap_err();

        assert!(error.to_string().contains("billing"));
    }

    #[test]
    fn clones_share_clients() {
        let registry = registry();
        let clone = registry.clone();

        assert!(Arc::ptr_eq(&registry.client("orders").unwrap(), &clone.client("orders").unwrap()));
    }

    #[test]
    fn empty_and_collected_registries() {
        let empty = ClientRegistry::<str>::empty();
        let collected: ClientRegistry<str> = [("a".to_owned(), Arc::<str>::from("x"))].into_iter().collect();

        assert!(empty.is_empty());
        assert!(collected.contains("a"));
        assert_eq!(format!("{collected:?}"), r#"ClientRegistry { services: ["a"] }"#);
    }
}
