//! Dispatch Bridge
//!
//! Moves deliveries off the platform's own threads and into the registry's
//! single event-processing context. The platform side only ever sends a
//! message into a channel; the drop decision and listener fan-out run on the
//! consumer side of that channel, either on a dedicated dispatcher thread or
//! wherever the application calls [`DispatchBridge::pump`].

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace};
use parking_lot::Mutex;

use crate::notify::error::{NotifyError, NotifyResult};
use crate::notify::stream::{EventStream, Notification};

/// Decides whether an arrival for a name may reach listeners
pub trait DeliveryGate: Send + Sync {
    fn accepts(&self, name: &str) -> bool;
}

/// Where queued arrivals are drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// A dedicated dispatcher thread drains the queue
    #[default]
    Thread,
    /// The application drains the queue with `pump`/`pump_timeout`
    Manual,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thread" => Ok(DispatchMode::Thread),
            "manual" => Ok(DispatchMode::Manual),
            _ => Err(format!("Invalid dispatch mode: {}. Valid options: thread, manual", s)),
        }
    }
}

pub(crate) enum BridgeMessage {
    Deliver(Notification),
    Stop,
}

/// Handle given to the platform for reporting arrivals.
///
/// Safe to clone and call from any thread. Sequence numbers are assigned at
/// the moment of arrival so per-name platform order survives the hand-off.
#[derive(Clone)]
pub struct DeliverySink {
    sender: Sender<BridgeMessage>,
    sequence: Arc<AtomicU64>,
}

impl DeliverySink {
    /// Report that `name` fired. Returns false once the bridge is gone.
    pub fn deliver(&self, name: &str) -> bool {
        let notification = Notification {
            name: name.to_string(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            received_at: Utc::now(),
        };
        self.sender.send(BridgeMessage::Deliver(notification)).is_ok()
    }
}

impl std::fmt::Debug for DeliverySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverySink")
            .field("delivered", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}

/// Bridge between platform delivery threads and the event stream
pub struct DispatchBridge {
    sender: Sender<BridgeMessage>,
    receiver: Receiver<BridgeMessage>,
    sequence: Arc<AtomicU64>,
    gate: Arc<dyn DeliveryGate>,
    stream: Arc<EventStream>,
    mode: DispatchMode,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchBridge {
    pub fn new(gate: Arc<dyn DeliveryGate>, stream: Arc<EventStream>, mode: DispatchMode) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            sequence: Arc::new(AtomicU64::new(0)),
            gate,
            stream,
            mode,
            worker: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Sink to attach to the platform
    pub fn sink(&self) -> DeliverySink {
        DeliverySink {
            sender: self.sender.clone(),
            sequence: Arc::clone(&self.sequence),
        }
    }

    /// Number of arrivals waiting to be dispatched
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Start the dispatcher thread. No-op in manual mode or when already running.
    pub fn start(&self) -> NotifyResult<()> {
        if self.mode == DispatchMode::Manual {
            return Ok(());
        }

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let receiver = self.receiver.clone();
        let gate = Arc::clone(&self.gate);
        let stream = Arc::clone(&self.stream);

        let handle = thread::Builder::new()
            .name("sysnotify-dispatch".to_string())
            .spawn(move || Self::dispatch_loop(receiver, gate, stream))
            .map_err(|e| NotifyError::Dispatcher(format!("Failed to spawn dispatcher: {}", e)))?;

        debug!("Dispatcher thread started");
        *worker = Some(handle);
        Ok(())
    }

    /// Stop the dispatcher thread and wait for it to exit. Called from the
    /// dispatcher itself (a listener shutting the registry down), the thread
    /// is detached and exits once it reads the stop message.
    pub fn stop(&self) -> NotifyResult<()> {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = self.sender.send(BridgeMessage::Stop);
            if handle.thread().id() == thread::current().id() {
                debug!("Dispatcher stopping from its own thread; detaching");
                return Ok(());
            }
            handle
                .join()
                .map_err(|_| NotifyError::Dispatcher("Failed to join dispatcher thread".to_string()))?;
            debug!("Dispatcher thread stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Drain everything currently queued. Returns the number of accepted
    /// arrivals. Always 0 in thread mode.
    pub fn pump(&self) -> usize {
        if self.mode == DispatchMode::Thread {
            trace!("pump() ignored in thread dispatch mode");
            return 0;
        }

        let mut accepted = 0;
        while let Ok(message) = self.receiver.try_recv() {
            if let BridgeMessage::Deliver(notification) = message {
                if Self::dispatch(self.gate.as_ref(), &self.stream, notification) {
                    accepted += 1;
                }
            }
        }
        accepted
    }

    /// Wait up to `timeout` for the first arrival, then drain the queue
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        if self.mode == DispatchMode::Thread {
            trace!("pump_timeout() ignored in thread dispatch mode");
            return 0;
        }

        let mut accepted = 0;
        match self.receiver.recv_timeout(timeout) {
            Ok(BridgeMessage::Deliver(notification)) => {
                if Self::dispatch(self.gate.as_ref(), &self.stream, notification) {
                    accepted += 1;
                }
            }
            Ok(BridgeMessage::Stop) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return 0,
        }
        accepted + self.pump()
    }

    fn dispatch_loop(
        receiver: Receiver<BridgeMessage>,
        gate: Arc<dyn DeliveryGate>,
        stream: Arc<EventStream>,
    ) {
        loop {
            match receiver.recv() {
                Ok(BridgeMessage::Deliver(notification)) => {
                    Self::dispatch(gate.as_ref(), &stream, notification);
                }
                Ok(BridgeMessage::Stop) => break,
                Err(e) => {
                    error!("Dispatcher channel closed: {}", e);
                    break;
                }
            }
        }
    }

    /// Drop arrivals for names that are unobserved or suspended, otherwise
    /// fan out to listeners.
    fn dispatch(gate: &dyn DeliveryGate, stream: &EventStream, notification: Notification) -> bool {
        if !gate.accepts(&notification.name) {
            trace!(
                "Dropping delivery #{} for '{}' (not observed or suspended)",
                notification.sequence,
                notification.name
            );
            stream.record_drop();
            return false;
        }

        stream.publish(&notification);
        true
    }
}

impl Drop for DispatchBridge {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FixedGate {
        open: HashSet<String>,
    }

    impl FixedGate {
        fn new(names: &[&str]) -> Self {
            Self {
                open: names.iter().map(|n| n.to_string()).collect(),
            }
        }
    }

    impl DeliveryGate for FixedGate {
        fn accepts(&self, name: &str) -> bool {
            self.open.contains(name)
        }
    }

    fn manual_bridge(open: &[&str]) -> (DispatchBridge, Arc<EventStream>) {
        let stream = Arc::new(EventStream::new());
        let bridge = DispatchBridge::new(
            Arc::new(FixedGate::new(open)),
            Arc::clone(&stream),
            DispatchMode::Manual,
        );
        (bridge, stream)
    }

    #[test]
    fn test_dispatch_mode_parsing() {
        assert_eq!("thread".parse::<DispatchMode>().unwrap(), DispatchMode::Thread);
        assert_eq!("Manual".parse::<DispatchMode>().unwrap(), DispatchMode::Manual);
        assert!("fiber".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_closed_gate_drops_silently() {
        let (bridge, stream) = manual_bridge(&[]);
        let seen = Arc::new(Mutex::new(0));
        let seen_clone = Arc::clone(&seen);
        stream.on("com.example.closed", move |_| *seen_clone.lock() += 1);

        assert!(bridge.sink().deliver("com.example.closed"));
        assert_eq!(bridge.pump(), 0);
        assert_eq!(*seen.lock(), 0);
        assert_eq!(stream.stats().dropped, 1);
    }

    #[test]
    fn test_manual_pump_preserves_arrival_order() {
        let (bridge, stream) = manual_bridge(&["com.example.open"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        stream.on("com.example.open", move |n| seen_clone.lock().push(n.sequence));

        let sink = bridge.sink();
        for _ in 0..5 {
            sink.deliver("com.example.open");
        }
        assert_eq!(bridge.pending(), 5);
        assert_eq!(bridge.pump(), 5);
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_pump_timeout_returns_zero_when_idle() {
        let (bridge, _stream) = manual_bridge(&["com.example.open"]);
        assert_eq!(bridge.pump_timeout(Duration::from_millis(10)), 0);
    }

    #[test]
    fn test_deliveries_from_foreign_threads() {
        let (bridge, stream) = manual_bridge(&["com.example.open"]);
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        stream.on("com.example.open", move |_| *count_clone.lock() += 1);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = bridge.sink();
                thread::spawn(move || {
                    for _ in 0..25 {
                        sink.deliver("com.example.open");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bridge.pump(), 100);
        assert_eq!(*count.lock(), 100);
    }

    #[test]
    fn test_thread_mode_dispatches_and_stops() {
        let stream = Arc::new(EventStream::new());
        let bridge = DispatchBridge::new(
            Arc::new(FixedGate::new(&["com.example.open"])),
            Arc::clone(&stream),
            DispatchMode::Thread,
        );
        let (tx, rx) = crossbeam_channel::unbounded();
        stream.on("com.example.open", move |n| {
            let _ = tx.send(n.name.clone());
        });

        bridge.start().unwrap();
        assert!(bridge.is_running());
        assert_eq!(bridge.pump(), 0);

        bridge.sink().deliver("com.example.open");
        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received, "com.example.open");

        bridge.stop().unwrap();
        assert!(!bridge.is_running());
    }
}
