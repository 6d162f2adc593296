//! Per-operation client factory registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use autotest_wire::TestingConfig;

use crate::error::ClientError;
use crate::sdk::ConfigurationProvider;

/// Builds an SDK client of type `C` for one operation.
pub type ClientFactory<C> =
    dyn Fn(&dyn ConfigurationProvider, &TestingConfig) -> Result<C, ClientError> + Send + Sync;

/// Maps `(service, operation)` to the factory that builds its client.
///
/// Factories of different client types share one registry; the type is
/// checked when a factory is looked up.
#[derive(Default)]
pub struct ClientFactoryRegistry {
    factories: HashMap<(String, String), Box<dyn Any + Send + Sync>>,
}

impl ClientFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for one operation, replacing any earlier one.
    pub fn register<C, F>(&mut self, service: &str, operation: &str, factory: F)
    where
        C: 'static,
        F: Fn(&dyn ConfigurationProvider, &TestingConfig) -> Result<C, ClientError>
            + Send
            + Sync
            + 'static,
    {
        let factory: Arc<ClientFactory<C>> = Arc::new(factory);
        self.insert(service, operation, factory);
    }

    /// Register one factory for every operation of a service client.
    pub fn register_service<C, F>(&mut self, service: &str, operations: &[&str], factory: F)
    where
        C: 'static,
        F: Fn(&dyn ConfigurationProvider, &TestingConfig) -> Result<C, ClientError>
            + Send
            + Sync
            + 'static,
    {
        let factory: Arc<ClientFactory<C>> = Arc::new(factory);
        for operation in operations {
            self.insert(service, operation, factory.clone());
        }
    }

    fn insert<C: 'static>(&mut self, service: &str, operation: &str, factory: Arc<ClientFactory<C>>) {
        let key = (service.to_string(), operation.to_string());
        if self.factories.insert(key, Box::new(factory)).is_some() {
            tracing::debug!(service, operation, "replaced client factory");
        }
    }

    /// The factory registered for `(service, operation)`.
    pub fn factory<C: 'static>(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<Arc<ClientFactory<C>>, ClientError> {
        let key = (service.to_string(), operation.to_string());
        let entry = self
            .factories
            .get(&key)
            .ok_or_else(|| ClientError::NotRegistered {
                service: service.to_string(),
                operation: operation.to_string(),
            })?;
        entry
            .downcast_ref::<Arc<ClientFactory<C>>>()
            .cloned()
            .ok_or_else(|| ClientError::WrongClientKind {
                service: service.to_string(),
                operation: operation.to_string(),
            })
    }

    pub fn contains(&self, service: &str, operation: &str) -> bool {
        self.factories
            .contains_key(&(service.to_string(), operation.to_string()))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ClientFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.factories.keys().collect();
        keys.sort();
        f.debug_struct("ClientFactoryRegistry")
            .field("operations", &keys)
            .finish()
    }
}
