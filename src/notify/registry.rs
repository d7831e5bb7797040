//! Notification Registry
//!
//! Owns the handle table, state store, dispatch bridge and event stream for
//! one platform connection and enforces the registration invariants: at most
//! one observation per name, typed absence/conflict errors, and state access
//! only through a live registration.
//!
//! A delivery already queued when `remove` runs may still reach listeners if
//! it was accepted by the gate before the entry disappeared. The platform has
//! no two-phase cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::notify::bridge::{DeliveryGate, DispatchBridge, DispatchMode};
use crate::notify::error::{NotifyError, NotifyResult};
use crate::notify::handle_table::{HandleTable, TableError};
use crate::notify::state_store::{parse_state_value, StateStore};
use crate::notify::stream::{
    DispatchStats, EventStream, NotificationListener, NotificationStream, Subscription,
};
use crate::notify::Notification;
use crate::platform::{NotifyPlatform, NotifyStatus};

/// Registry construction options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    pub dispatch_mode: DispatchMode,
}

/// Reject names the platform boundary cannot carry
pub fn validate_name(name: &str) -> NotifyResult<()> {
    if name.is_empty() {
        return Err(NotifyError::invalid_name(name, "name must not be empty"));
    }
    if name.contains('\0') {
        return Err(NotifyError::invalid_name(name, "name must not contain NUL bytes"));
    }
    Ok(())
}

pub struct NotifyRegistry {
    platform: Arc<dyn NotifyPlatform>,
    table: Arc<RwLock<HandleTable>>,
    state: Mutex<StateStore>,
    events: Arc<EventStream>,
    bridge: DispatchBridge,
    shutdown: AtomicBool,
}

impl NotifyRegistry {
    /// Create a registry with a dispatcher thread
    pub fn new(platform: Arc<dyn NotifyPlatform>) -> NotifyResult<Self> {
        Self::with_config(platform, RegistryConfig::default())
    }

    pub fn with_config(platform: Arc<dyn NotifyPlatform>, config: RegistryConfig) -> NotifyResult<Self> {
        let table = Arc::new(RwLock::new(HandleTable::new()));
        let events = Arc::new(EventStream::new());
        let gate: Arc<dyn DeliveryGate> = Arc::clone(&table) as Arc<dyn DeliveryGate>;
        let bridge = DispatchBridge::new(gate, Arc::clone(&events), config.dispatch_mode);

        platform.attach(bridge.sink());
        bridge.start()?;

        info!(
            "Notification registry ready on {} ({:?} dispatch)",
            platform.platform_name(),
            config.dispatch_mode
        );

        Ok(Self {
            platform,
            table,
            state: Mutex::new(StateStore::new()),
            events,
            bridge,
            shutdown: AtomicBool::new(false),
        })
    }

    fn ensure_running(&self) -> NotifyResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            Err(NotifyError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Start observing `name`
    pub fn add(&self, name: &str) -> NotifyResult<()> {
        self.ensure_running()?;
        validate_name(name)?;

        let mut table = self.table.write();
        if table.contains(name) {
            return Err(NotifyError::AlreadyObserving(name.to_string()));
        }

        let handle = self.platform.register(name)?;
        if let Err(TableError::AlreadyExists { handle, .. }) = table.insert(name, handle) {
            if let Err(e) = self.platform.unregister(handle) {
                warn!("Failed to release duplicate registration for '{}': {}", name, e);
            }
            return Err(NotifyError::AlreadyObserving(name.to_string()));
        }

        debug!("Observing '{}'", name);
        Ok(())
    }

    /// Stop observing `name` and release its platform registration
    pub fn remove(&self, name: &str) -> NotifyResult<()> {
        self.ensure_running()?;
        validate_name(name)?;

        let handle = self
            .table
            .write()
            .remove(name)
            .map_err(|_| NotifyError::NoObserver(name.to_string()))?;
        self.state.lock().forget(name);

        self.platform.unregister(handle)?;
        debug!("Stopped observing '{}'", name);
        Ok(())
    }

    /// Pause deliveries for `name`. Suspending a suspended name is a no-op.
    pub fn suspend(&self, name: &str) -> NotifyResult<()> {
        self.ensure_running()?;
        validate_name(name)?;

        let mut table = self.table.write();
        let entry = table
            .get(name)
            .map_err(|_| NotifyError::NoObserver(name.to_string()))?;
        if entry.is_suspended() {
            debug!("'{}' is already suspended", name);
            return Ok(());
        }

        self.platform.suspend(entry.handle())?;
        table
            .set_suspended(name, true)
            .map_err(|_| NotifyError::NoObserver(name.to_string()))?;
        debug!("Suspended '{}'", name);
        Ok(())
    }

    /// Restart deliveries for `name`. Resuming an active name is a no-op.
    pub fn resume(&self, name: &str) -> NotifyResult<()> {
        self.ensure_running()?;
        validate_name(name)?;

        let mut table = self.table.write();
        let entry = table
            .get(name)
            .map_err(|_| NotifyError::NoObserver(name.to_string()))?;
        if !entry.is_suspended() {
            debug!("'{}' is not suspended", name);
            return Ok(());
        }

        // The write lock keeps the gate closed until the flag below is cleared.
        self.platform.resume(entry.handle())?;
        table
            .set_suspended(name, false)
            .map_err(|_| NotifyError::NoObserver(name.to_string()))?;
        debug!("Resumed '{}'", name);
        Ok(())
    }

    /// Broadcast `name` on the bus. A failed post is reported through the
    /// returned status, not as an error.
    pub fn post(&self, name: &str) -> NotifyResult<NotifyStatus> {
        self.ensure_running()?;
        validate_name(name)?;

        let status = self.platform.post(name);
        if status.is_ok() {
            debug!("Posted '{}'", name);
        } else {
            warn!("Post of '{}' returned {}", name, status);
        }
        Ok(status)
    }

    pub fn set_state(&self, name: &str, value: i64) -> NotifyResult<()> {
        self.ensure_running()?;
        validate_name(name)?;

        let table = self.table.read();
        self.state
            .lock()
            .set(self.platform.as_ref(), &table, name, value)
    }

    /// Parse `raw` as a 64-bit integer and publish it as the state for `name`
    pub fn set_state_str(&self, name: &str, raw: &str) -> NotifyResult<()> {
        self.ensure_running()?;
        validate_name(name)?;
        let value = parse_state_value(raw)?;
        self.set_state(name, value)
    }

    pub fn get_state(&self, name: &str) -> NotifyResult<i64> {
        self.ensure_running()?;
        validate_name(name)?;

        let table = self.table.read();
        self.state.lock().get(self.platform.as_ref(), &table, name)
    }

    /// Last state value written or read through this registry
    pub fn cached_state(&self, name: &str) -> Option<i64> {
        self.state.lock().cached(name)
    }

    /// Subscribe a closure to deliveries for `name`
    pub fn on<F>(&self, name: &str, callback: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.events.on(name, callback)
    }

    pub fn subscribe(&self, name: &str, listener: Arc<dyn NotificationListener>) -> Subscription {
        self.events.subscribe(name, listener)
    }

    pub fn off(&self, subscription: &Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    /// Async stream of deliveries for `name`
    pub fn stream(&self, name: &str) -> NotificationStream {
        self.events.stream(name)
    }

    pub fn events(&self) -> Arc<EventStream> {
        Arc::clone(&self.events)
    }

    /// Drain queued deliveries (manual dispatch mode)
    pub fn pump(&self) -> usize {
        self.bridge.pump()
    }

    /// Wait for a delivery, then drain the queue (manual dispatch mode)
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        self.bridge.pump_timeout(timeout)
    }

    /// Deliveries queued but not yet dispatched
    pub fn pending(&self) -> usize {
        self.bridge.pending()
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.bridge.mode()
    }

    pub fn stats(&self) -> DispatchStats {
        self.events.stats()
    }

    pub fn observed_names(&self) -> Vec<String> {
        self.table.read().names()
    }

    pub fn is_observing(&self, name: &str) -> bool {
        self.table.read().contains(name)
    }

    pub fn is_suspended(&self, name: &str) -> Option<bool> {
        self.table.read().is_suspended(name)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn platform_name(&self) -> &str {
        self.platform.platform_name()
    }

    /// Release every platform registration and stop dispatching.
    /// Later calls fail with [`NotifyError::Shutdown`].
    pub fn shutdown(&self) -> NotifyResult<()> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drained = self.table.write().drain();
        let released = drained.len();
        for (name, handle) in drained {
            if let Err(e) = self.platform.unregister(handle) {
                error!("Failed to release '{}' during shutdown: {}", name, e);
            }
        }
        self.state.lock().clear();
        self.bridge.stop()?;
        self.events.clear();

        info!("Notification registry shut down ({} registrations released)", released);
        Ok(())
    }
}

impl Drop for NotifyRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("{}", e);
        }
    }
}
