//! Registry Integration Tests
//!
//! Drives the public registry surface end to end over the loopback bus:
//! registration lifecycle, state, ordered listener fan-out, suspension,
//! both dispatch modes and shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use sysnotify::notify::{DispatchMode, NotifyError, NotifyRegistry, RegistryConfig};
use sysnotify::platform::{LoopbackBus, NotifyPlatform, NotifyStatus};

const WAIT: Duration = Duration::from_secs(2);

fn manual_registry(bus: &LoopbackBus) -> NotifyRegistry {
    NotifyRegistry::with_config(
        Arc::new(bus.client()),
        RegistryConfig {
            dispatch_mode: DispatchMode::Manual,
        },
    )
    .expect("registry should start")
}

fn recorder(registry: &NotifyRegistry, name: &str, label: &'static str) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.on(name, move |n| sink.lock().push(format!("{}:{}", label, n.name)));
    seen
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn test_registration_lifecycle_messages() {
    let bus = LoopbackBus::new();
    let registry = NotifyRegistry::new(Arc::new(bus.client())).unwrap();
    let name = "com.example.test.key";

    registry.add(name).unwrap();
    assert_eq!(
        registry.add(name).unwrap_err().to_string(),
        "An observer is already observing com.example.test.key"
    );
    registry.remove(name).unwrap();
    assert_eq!(
        registry.remove(name).unwrap_err().to_string(),
        "No observer exists for com.example.test.key"
    );
    assert_eq!(bus.registration_count(), 0);
}

#[test]
fn test_state_example() {
    let bus = LoopbackBus::new();
    let registry = NotifyRegistry::new(Arc::new(bus.client())).unwrap();
    let name = "com.example.state.key";

    assert_eq!(
        registry.set_state(name, 5).unwrap_err().to_string(),
        "No registration token exists for com.example.state.key"
    );

    registry.add(name).unwrap();
    registry.set_state(name, 5).unwrap();
    assert_eq!(registry.get_state(name).unwrap(), 5);

    assert!(matches!(
        registry.set_state_str(name, "not-an-integer"),
        Err(NotifyError::InvalidStateValue { .. })
    ));
    assert_eq!(registry.get_state(name).unwrap(), 5);
}

#[test]
fn test_manual_dispatch_preserves_order_across_names() {
    let bus = LoopbackBus::new();
    let registry = manual_registry(&bus);
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["a", "b"] {
        registry.add(name).unwrap();
        let sink = Arc::clone(&log);
        registry.on(name, move |n| sink.lock().push((n.name.clone(), n.sequence)));
    }

    for name in ["a", "b", "a", "a", "b"] {
        assert_eq!(registry.post(name).unwrap(), NotifyStatus::Ok);
    }
    assert!(wait_until(|| registry.pending() == 5));
    assert_eq!(registry.pump(), 5);

    let log = log.lock();
    let names: Vec<&str> = log.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "a", "a", "b"]);
    assert!(log.windows(2).all(|pair| pair[0].1 < pair[1].1));
}

#[test]
fn test_pump_timeout_waits_for_first_delivery() {
    let bus = LoopbackBus::new();
    let registry = manual_registry(&bus);
    registry.add("late").unwrap();
    let seen = recorder(&registry, "late", "l");

    assert_eq!(registry.pump_timeout(Duration::from_millis(20)), 0);

    let poster = bus.client();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        poster.post("late")
    });

    let mut dispatched = 0;
    let deadline = Instant::now() + WAIT;
    while dispatched == 0 && Instant::now() < deadline {
        dispatched += registry.pump_timeout(Duration::from_millis(100));
    }
    assert!(handle.join().unwrap().is_ok());
    assert_eq!(dispatched, 1);
    assert_eq!(*seen.lock(), vec!["l:late"]);
}

#[test]
fn test_suspend_resume_through_thread_dispatch() {
    let bus = LoopbackBus::new();
    let registry = NotifyRegistry::new(Arc::new(bus.client())).unwrap();
    let name = "com.example.paused";
    registry.add(name).unwrap();
    let seen = recorder(&registry, name, "x");

    registry.suspend(name).unwrap();
    assert_eq!(registry.is_suspended(name), Some(true));
    registry.post(name).unwrap();
    registry.post(name).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(seen.lock().is_empty());

    registry.resume(name).unwrap();
    assert!(wait_until(|| seen.lock().len() == 1));

    registry.post(name).unwrap();
    assert!(wait_until(|| seen.lock().len() == 2));
}

#[test]
fn test_failing_listener_does_not_stop_later_listeners() {
    let bus = LoopbackBus::new();
    let registry = manual_registry(&bus);
    registry.add("n").unwrap();

    registry.on("n", |_| panic!("listener blew up"));
    let seen = recorder(&registry, "n", "after");

    registry.post("n").unwrap();
    assert!(wait_until(|| registry.pending() == 1));
    registry.pump();

    assert_eq!(*seen.lock(), vec!["after:n"]);
    let stats = registry.stats();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.listener_invocations, 2);
    assert_eq!(stats.listener_failures, 1);
}

#[test]
fn test_shutdown_rejects_further_operations() {
    let bus = LoopbackBus::new();
    let registry = NotifyRegistry::new(Arc::new(bus.client())).unwrap();
    registry.add("one").unwrap();
    registry.add("two").unwrap();
    assert_eq!(registry.observed_names(), vec!["one", "two"]);

    registry.shutdown().unwrap();
    registry.shutdown().unwrap();

    assert!(registry.is_shutdown());
    assert_eq!(bus.registration_count(), 0);
    assert!(matches!(registry.add("three"), Err(NotifyError::Shutdown)));
    assert!(matches!(registry.post("one"), Err(NotifyError::Shutdown)));
    assert!(registry.observed_names().is_empty());
}
