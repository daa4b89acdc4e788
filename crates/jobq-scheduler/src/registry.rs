//! Registered drivers, keyed by kind.

use jobq_types::{DriverHandle, DriverKind, QueueDriver};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Drivers available to the engine, plus the kind used when a descriptor names none.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: BTreeMap<DriverKind, DriverHandle>,
    default_kind: DriverKind,
}

impl DriverRegistry {
    pub fn new(default_driver: Arc<dyn QueueDriver>) -> Self {
        let handle = DriverHandle::new(default_driver);
        let default_kind = handle.kind().clone();
        let mut drivers = BTreeMap::new();
        drivers.insert(default_kind.clone(), handle);
        Self {
            drivers,
            default_kind,
        }
    }

    /// Add a driver; replaces a previously registered driver of the same kind.
    pub fn register(mut self, driver: Arc<dyn QueueDriver>) -> Self {
        let handle = DriverHandle::new(driver);
        self.drivers.insert(handle.kind().clone(), handle);
        self
    }

    pub fn default_kind(&self) -> &DriverKind {
        &self.default_kind
    }

    /// Kind a descriptor will run on: its own choice or the default.
    pub fn kind_for(&self, requested: Option<&DriverKind>) -> DriverKind {
        requested.unwrap_or(&self.default_kind).clone()
    }

    pub fn resolve(&self, kind: &DriverKind) -> Option<&DriverHandle> {
        self.drivers.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &DriverKind> {
        self.drivers.keys()
    }
}
