//! In-process notification bus
//!
//! Behaves like the system bus for everything the registry relies on:
//! deliveries happen on a bus-owned thread, state words are global to the bus,
//! and posts that arrive while a registration is suspended are coalesced into
//! a single delivery on resume. Each [`LoopbackPlatform`] client stands in for
//! one process attached to the bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{self, Sender};
use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::notify::bridge::DeliverySink;
use crate::notify::error::{NotifyError, NotifyResult};
use crate::platform::{NotifyPlatform, NotifyStatus, ObservationHandle};

type ClientId = u64;

struct Registration {
    client: ClientId,
    name: String,
    suspended: bool,
    /// A post arrived while suspended
    pending: bool,
}

#[derive(Default)]
struct BusState {
    registrations: HashMap<i32, Registration>,
    states: HashMap<String, i64>,
    sinks: HashMap<ClientId, DeliverySink>,
}

struct BusDelivery {
    sink: DeliverySink,
    name: String,
}

struct BusInner {
    state: Mutex<BusState>,
    deliveries: Sender<BusDelivery>,
    next_token: AtomicI32,
    next_client: AtomicU64,
}

impl BusInner {
    /// Must be called with the state lock held so queue order matches post order
    fn queue(&self, state: &BusState, registration: &Registration) {
        if let Some(sink) = state.sinks.get(&registration.client) {
            let delivery = BusDelivery {
                sink: sink.clone(),
                name: registration.name.clone(),
            };
            if self.deliveries.send(delivery).is_err() {
                warn!("Loopback delivery thread has exited; dropping '{}'", registration.name);
            }
        }
    }

    fn post(&self, name: &str) -> NotifyStatus {
        if name.is_empty() || name.contains('\0') {
            return NotifyStatus::InvalidName;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut tokens: Vec<i32> = state
            .registrations
            .iter()
            .filter(|(_, registration)| registration.name == name)
            .map(|(token, _)| *token)
            .collect();
        tokens.sort_unstable();

        for token in tokens {
            let Some(registration) = state.registrations.get_mut(&token) else {
                continue;
            };
            if registration.suspended {
                registration.pending = true;
                continue;
            }
            let registration = &state.registrations[&token];
            self.queue(state, registration);
        }

        trace!("Loopback post '{}'", name);
        NotifyStatus::Ok
    }
}

/// Shared in-process bus
#[derive(Clone)]
pub struct LoopbackBus {
    inner: Arc<BusInner>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<BusDelivery>();

        // Exits when the last sender goes away with the bus.
        let spawned = thread::Builder::new()
            .name("sysnotify-loopback".to_string())
            .spawn(move || {
                for delivery in rx {
                    delivery.sink.deliver(&delivery.name);
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn loopback delivery thread: {}", e);
        }

        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                deliveries: tx,
                next_token: AtomicI32::new(1),
                next_client: AtomicU64::new(1),
            }),
        }
    }

    /// Connect a new client, analogous to another process on the system bus
    pub fn client(&self) -> LoopbackPlatform {
        let client = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        debug!("Loopback client {} connected", client);
        LoopbackPlatform {
            client,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Post from outside any client
    pub fn post(&self, name: &str) -> NotifyStatus {
        self.inner.post(name)
    }

    /// Number of live registrations across all clients
    pub fn registration_count(&self) -> usize {
        self.inner.state.lock().registrations.len()
    }

    /// Read the bus-wide state word for `name`
    pub fn state_of(&self, name: &str) -> i64 {
        self.inner.state.lock().states.get(name).copied().unwrap_or(0)
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One client connection to a [`LoopbackBus`]
pub struct LoopbackPlatform {
    client: ClientId,
    inner: Arc<BusInner>,
}

impl LoopbackPlatform {
    pub fn client_id(&self) -> u64 {
        self.client
    }

    fn owned<'a>(
        &self,
        state: &'a mut BusState,
        handle: &ObservationHandle,
        operation: &str,
    ) -> NotifyResult<&'a mut Registration> {
        match state.registrations.get_mut(&handle.token()) {
            Some(registration) if registration.client == self.client => Ok(registration),
            _ => Err(NotifyError::platform(operation, NotifyStatus::InvalidToken)),
        }
    }
}

impl NotifyPlatform for LoopbackPlatform {
    fn attach(&self, sink: DeliverySink) {
        self.inner.state.lock().sinks.insert(self.client, sink);
    }

    fn register(&self, name: &str) -> NotifyResult<ObservationHandle> {
        if name.is_empty() || name.contains('\0') {
            return Err(NotifyError::platform("register", NotifyStatus::InvalidName));
        }

        let mut state = self.inner.state.lock();
        let duplicate = state
            .registrations
            .values()
            .any(|registration| registration.client == self.client && registration.name == name);
        if duplicate {
            return Err(NotifyError::AlreadyRegisteredAtPlatform(name.to_string()));
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        state.registrations.insert(
            token,
            Registration {
                client: self.client,
                name: name.to_string(),
                suspended: false,
                pending: false,
            },
        );
        debug!("Loopback client {} registered '{}' as token {}", self.client, name, token);
        Ok(ObservationHandle::new(token, name))
    }

    fn unregister(&self, handle: ObservationHandle) -> NotifyResult<()> {
        let mut state = self.inner.state.lock();
        self.owned(&mut state, &handle, "unregister")?;
        state.registrations.remove(&handle.token());
        debug!("Loopback client {} cancelled token {}", self.client, handle.token());
        Ok(())
    }

    fn suspend(&self, handle: &ObservationHandle) -> NotifyResult<()> {
        let mut state = self.inner.state.lock();
        self.owned(&mut state, handle, "suspend")?.suspended = true;
        Ok(())
    }

    fn resume(&self, handle: &ObservationHandle) -> NotifyResult<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let registration = self.owned(state, handle, "resume")?;
        registration.suspended = false;

        if std::mem::take(&mut registration.pending) {
            let registration = &state.registrations[&handle.token()];
            self.inner.queue(state, registration);
        }
        Ok(())
    }

    fn post(&self, name: &str) -> NotifyStatus {
        self.inner.post(name)
    }

    fn set_state(&self, handle: &ObservationHandle, value: i64) -> NotifyResult<()> {
        let mut state = self.inner.state.lock();
        let name = self.owned(&mut state, handle, "set_state")?.name.clone();
        state.states.insert(name, value);
        Ok(())
    }

    fn get_state(&self, handle: &ObservationHandle) -> NotifyResult<i64> {
        let mut state = self.inner.state.lock();
        let name = self.owned(&mut state, handle, "get_state")?.name.clone();
        Ok(state.states.get(&name).copied().unwrap_or(0))
    }

    fn platform_name(&self) -> &str {
        "loopback"
    }
}

impl Drop for LoopbackPlatform {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.sinks.remove(&self.client);
        let client = self.client;
        state
            .registrations
            .retain(|_, registration| registration.client != client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::bridge::{DeliveryGate, DispatchBridge, DispatchMode};
    use crate::notify::stream::EventStream;
    use std::time::Duration;

    struct OpenGate;

    impl DeliveryGate for OpenGate {
        fn accepts(&self, _name: &str) -> bool {
            true
        }
    }

    fn attached(platform: &LoopbackPlatform) -> (DispatchBridge, Arc<EventStream>) {
        let stream = Arc::new(EventStream::new());
        let bridge = DispatchBridge::new(Arc::new(OpenGate), Arc::clone(&stream), DispatchMode::Manual);
        platform.attach(bridge.sink());
        (bridge, stream)
    }

    #[test]
    fn test_duplicate_registration_rejected_per_client() {
        let bus = LoopbackBus::new();
        let first = bus.client();
        let second = bus.client();

        let _handle = first.register("com.example.dup").unwrap();
        assert_eq!(
            first.register("com.example.dup"),
            Err(NotifyError::AlreadyRegisteredAtPlatform("com.example.dup".to_string()))
        );
        assert!(second.register("com.example.dup").is_ok());
        assert_eq!(bus.registration_count(), 2);
    }

    #[test]
    fn test_post_delivers_on_bus_thread() {
        let bus = LoopbackBus::new();
        let platform = bus.client();
        let (bridge, _stream) = attached(&platform);
        let _handle = platform.register("com.example.post").unwrap();

        assert!(platform.post("com.example.post").is_ok());
        assert_eq!(bridge.pump_timeout(Duration::from_secs(2)), 1);
    }

    #[test]
    fn test_post_rejects_invalid_names() {
        let bus = LoopbackBus::new();
        assert_eq!(bus.post(""), NotifyStatus::InvalidName);
        assert_eq!(bus.post("bad\0name"), NotifyStatus::InvalidName);
    }

    #[test]
    fn test_suspended_posts_coalesce_until_resume() {
        let bus = LoopbackBus::new();
        let platform = bus.client();
        let (bridge, _stream) = attached(&platform);
        let handle = platform.register("com.example.coalesce").unwrap();

        platform.suspend(&handle).unwrap();
        for _ in 0..3 {
            platform.post("com.example.coalesce");
        }
        assert_eq!(bridge.pump_timeout(Duration::from_millis(50)), 0);

        platform.resume(&handle).unwrap();
        assert_eq!(bridge.pump_timeout(Duration::from_secs(2)), 1);
        assert_eq!(bridge.pump_timeout(Duration::from_millis(50)), 0);
    }

    #[test]
    fn test_foreign_handle_is_invalid_token() {
        let bus = LoopbackBus::new();
        let first = bus.client();
        let second = bus.client();
        let handle = first.register("com.example.owned").unwrap();

        assert_eq!(
            second.suspend(&handle),
            Err(NotifyError::platform("suspend", NotifyStatus::InvalidToken))
        );
        assert!(second.unregister(handle).is_err());
    }

    #[test]
    fn test_state_is_global_to_bus() {
        let bus = LoopbackBus::new();
        let first = bus.client();
        let second = bus.client();
        let first_handle = first.register("com.example.state").unwrap();
        let second_handle = second.register("com.example.state").unwrap();

        assert_eq!(second.get_state(&second_handle).unwrap(), 0);
        first.set_state(&first_handle, -7).unwrap();
        assert_eq!(second.get_state(&second_handle).unwrap(), -7);
        assert_eq!(bus.state_of("com.example.state"), -7);
    }

    #[test]
    fn test_dropping_client_releases_registrations() {
        let bus = LoopbackBus::new();
        let platform = bus.client();
        let _a = platform.register("com.example.a").unwrap();
        let _b = platform.register("com.example.b").unwrap();
        assert_eq!(bus.registration_count(), 2);

        drop(platform);
        assert_eq!(bus.registration_count(), 0);
    }
}
