use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hostpack_core::{Error, Result};
use tracing::debug;

use crate::{
    AwsS3DistStorage, DistributionStorage, EndpointOptions, HttpDistStorage, LocalDirDistStorage,
};

pub type DriverFactory =
    Arc<dyn Fn(&EndpointOptions) -> Result<Box<dyn DistributionStorage>> + Send + Sync>;

/// Scheme-keyed table of distribution storage driver factories.
#[derive(Clone, Default)]
pub struct DistStorageRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DistStorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_drivers() -> Self {
        let mut registry = Self::new();
        registry.register("http", |options| Ok(Box::new(HttpDistStorage::new(options)?)));
        registry.register("https", |options| Ok(Box::new(HttpDistStorage::new(options)?)));
        registry.register("aws-s3-http", |options| {
            Ok(Box::new(AwsS3DistStorage::new(options)?))
        });
        registry.register("file", |options| Ok(Box::new(LocalDirDistStorage::new(options))));
        registry
    }

    /// Registers `factory` for `scheme`, replacing any earlier registration.
    pub fn register<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn(&EndpointOptions) -> Result<Box<dyn DistributionStorage>> + Send + Sync + 'static,
    {
        let scheme = scheme.to_ascii_lowercase();
        if self.factories.insert(scheme.clone(), Arc::new(factory)).is_some() {
            debug!(%scheme, "replaced distribution storage driver");
        }
    }

    pub fn schemes(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn create(&self, options: &EndpointOptions) -> Result<Box<dyn DistributionStorage>> {
        let scheme = options.scheme.to_ascii_lowercase();
        let factory = self
            .factories
            .get(&scheme)
            .ok_or_else(|| Error::UnknownScheme(options.scheme.clone()))?;
        factory(options)
    }
}

impl fmt::Debug for DistStorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistStorageRegistry")
            .field("schemes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
