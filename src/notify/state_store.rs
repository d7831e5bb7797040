//! State Store
//!
//! Per-name 64-bit state word. The value itself lives on the platform; this
//! layer requires a live registration token for the name and keeps the last
//! value written or read so callers can inspect it without a platform call.

use std::collections::HashMap;

use log::debug;

use crate::notify::error::{NotifyError, NotifyResult};
use crate::notify::handle_table::HandleTable;
use crate::platform::NotifyPlatform;

/// Parse a textual state value into a 64-bit signed integer
pub fn parse_state_value(raw: &str) -> NotifyResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| NotifyError::invalid_state_value(raw))
}

#[derive(Debug, Default)]
pub struct StateStore {
    cache: HashMap<String, i64>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        platform: &dyn NotifyPlatform,
        table: &HandleTable,
        name: &str,
        value: i64,
    ) -> NotifyResult<()> {
        let entry = table
            .get(name)
            .map_err(|_| NotifyError::Unregistered(name.to_string()))?;

        platform.set_state(entry.handle(), value)?;
        self.cache.insert(name.to_string(), value);
        debug!("State for '{}' set to {}", name, value);
        Ok(())
    }

    pub fn get(
        &mut self,
        platform: &dyn NotifyPlatform,
        table: &HandleTable,
        name: &str,
    ) -> NotifyResult<i64> {
        let entry = table
            .get(name)
            .map_err(|_| NotifyError::Unregistered(name.to_string()))?;

        let value = platform.get_state(entry.handle())?;
        self.cache.insert(name.to_string(), value);
        Ok(value)
    }

    /// Last value written or read for `name`, without a platform call
    pub fn cached(&self, name: &str) -> Option<i64> {
        self.cache.get(name).copied()
    }

    pub fn forget(&mut self, name: &str) {
        self.cache.remove(name);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
