//! Handle Table
//!
//! Name to observation-handle map with a per-name suspended flag. Has no
//! locking of its own; the registry wraps it in a `RwLock` and the dispatch
//! bridge reads it through [`DeliveryGate`].

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::notify::bridge::DeliveryGate;
use crate::platform::ObservationHandle;

#[derive(Debug, Error)]
pub enum TableError {
    /// The rejected handle is handed back so the caller can release it
    #[error("An entry already exists for {name}")]
    AlreadyExists {
        name: String,
        handle: ObservationHandle,
    },

    #[error("No entry exists for {0}")]
    NotFound(String),
}

pub type TableResult<T> = Result<T, TableError>;

/// One live observation
#[derive(Debug)]
pub struct RegistryEntry {
    name: String,
    handle: ObservationHandle,
    suspended: bool,
}

impl RegistryEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &ObservationHandle {
        &self.handle
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

#[derive(Debug, Default)]
pub struct HandleTable {
    entries: HashMap<String, RegistryEntry>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, handle: ObservationHandle) -> TableResult<()> {
        if self.entries.contains_key(name) {
            return Err(TableError::AlreadyExists {
                name: name.to_string(),
                handle,
            });
        }

        self.entries.insert(
            name.to_string(),
            RegistryEntry {
                name: name.to_string(),
                handle,
                suspended: false,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> TableResult<&RegistryEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| TableError::NotFound(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> TableResult<ObservationHandle> {
        self.entries
            .remove(name)
            .map(|entry| entry.handle)
            .ok_or_else(|| TableError::NotFound(name.to_string()))
    }

    /// Set the suspended flag, returning its previous value
    pub fn set_suspended(&mut self, name: &str, suspended: bool) -> TableResult<bool> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| TableError::NotFound(name.to_string()))?;
        Ok(std::mem::replace(&mut entry.suspended, suspended))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_suspended(&self, name: &str) -> Option<bool> {
        self.entries.get(name).map(|entry| entry.suspended)
    }

    /// Observed names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, handing back the handles for release
    pub fn drain(&mut self) -> Vec<(String, ObservationHandle)> {
        self.entries
            .drain()
            .map(|(name, entry)| (name, entry.handle))
            .collect()
    }
}

impl DeliveryGate for RwLock<HandleTable> {
    fn accepts(&self, name: &str) -> bool {
        self.read()
            .entries
            .get(name)
            .is_some_and(|entry| !entry.suspended)
    }
}
