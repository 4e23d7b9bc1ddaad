//! Store client registry

use std::sync::Arc;

use gatekeeper_core::{Config, PublishError, Result, StoreKind};
use tracing::{debug, warn};

use crate::chrome::ChromeStore;
use crate::edge::EdgeStore;
use crate::firefox::FirefoxStore;
use crate::traits::StoreClient;

/// Registry of configured store clients
pub struct StoreRegistry {
    stores: Vec<Arc<dyn StoreClient>>,
}

impl StoreRegistry {
    /// Create a new empty registry
    ///
    /// Stores require credentials, so none are registered by default.
    pub fn new() -> Self {
        Self { stores: Vec::new() }
    }

    /// Build clients for `stores`, in order
    ///
    /// A store whose credentials are missing or incomplete is skipped with a
    /// warning and its error returned alongside, so one bad store does not
    /// stop the others.
    pub fn from_config(config: &Config, stores: &[StoreKind]) -> (Self, Vec<(StoreKind, PublishError)>) {
        let mut registry = Self::new();
        let mut failures = Vec::new();

        for &store in stores {
            if registry.get(store).is_some() {
                continue;
            }
            match build_client(config, store) {
                Ok(client) => registry.register(client),
                Err(e) => {
                    warn!(store = %store, error = %gatekeeper_core::redact(e.message()), "store not configured");
                    failures.push((store, e));
                }
            }
        }

        (registry, failures)
    }

    /// Register a store client
    pub fn register(&mut self, store: Arc<dyn StoreClient>) {
        self.stores.push(store);
    }

    /// Get the client for a store
    pub fn get(&self, store: StoreKind) -> Option<Arc<dyn StoreClient>> {
        let result = self.stores.iter().find(|s| s.store() == store).cloned();
        debug!(store = %store, found = result.is_some(), "Looking up store client");
        result
    }

    /// Get all registered store clients
    pub fn all(&self) -> &[Arc<dyn StoreClient>] {
        &self.stores
    }

    /// Get names of all registered store clients
    pub fn names(&self) -> Vec<String> {
        self.stores.iter().map(|s| s.name().to_string()).collect()
    }

    /// Get store clients missing local tooling or credentials
    pub fn unavailable(&self) -> Vec<Arc<dyn StoreClient>> {
        let unavailable: Vec<_> = self.stores.iter().filter(|s| !s.is_available()).cloned().collect();
        let names: Vec<_> = unavailable.iter().map(|s| s.name()).collect();
        debug!(count = unavailable.len(), stores = ?names, "Queried unavailable store clients");
        unavailable
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct the client for one store from its credentials block
pub fn build_client(config: &Config, store: StoreKind) -> Result<Arc<dyn StoreClient>> {
    let missing = || PublishError::validation(format!("Missing credentials for {}", store));

    let client: Arc<dyn StoreClient> = match store {
        StoreKind::Chrome => {
            let creds = config.credentials.chrome.clone().ok_or_else(missing)?;
            Arc::new(ChromeStore::new(creds)?)
        }
        StoreKind::Firefox => {
            let creds = config.credentials.firefox.clone().ok_or_else(missing)?;
            Arc::new(FirefoxStore::new(creds)?)
        }
        StoreKind::Edge => {
            let creds = config.credentials.edge.clone().ok_or_else(missing)?;
            Arc::new(EdgeStore::new(creds)?)
        }
    };
    Ok(client)
}
