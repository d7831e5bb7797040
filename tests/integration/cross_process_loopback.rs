//! Cross-Process Loopback Tests
//!
//! Several registries attached to one loopback bus stand in for separate
//! processes sharing the system bus: posts fan out to every observer, state
//! is global per name, and each registry's registrations are its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::Mutex;

use sysnotify::notify::NotifyRegistry;
use sysnotify::platform::LoopbackBus;

fn process(bus: &LoopbackBus) -> NotifyRegistry {
    NotifyRegistry::new(Arc::new(bus.client())).expect("registry should start")
}

fn counter(registry: &NotifyRegistry, name: &str) -> Arc<Mutex<usize>> {
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    registry.on(name, move |_| *sink.lock() += 1);
    count
}

fn settle(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn test_post_reaches_every_observing_process() {
    let bus = LoopbackBus::new();
    let poster = process(&bus);
    let first = process(&bus);
    let second = process(&bus);
    let bystander = process(&bus);

    first.add("com.example.broadcast").unwrap();
    second.add("com.example.broadcast").unwrap();
    let first_count = counter(&first, "com.example.broadcast");
    let second_count = counter(&second, "com.example.broadcast");
    let bystander_count = counter(&bystander, "com.example.broadcast");

    assert!(poster.post("com.example.broadcast").unwrap().is_ok());

    assert!(settle(|| *first_count.lock() == 1 && *second_count.lock() == 1));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(*bystander_count.lock(), 0);
}

#[test]
fn test_state_is_shared_between_processes() {
    let bus = LoopbackBus::new();
    let writer = process(&bus);
    let reader = process(&bus);
    let name = "com.example.state.key";

    writer.add(name).unwrap();
    reader.add(name).unwrap();

    writer.set_state(name, i64::MIN).unwrap();
    assert_eq!(reader.get_state(name).unwrap(), i64::MIN);
    assert_eq!(bus.state_of(name), i64::MIN);

    reader.set_state_str(name, "17").unwrap();
    assert_eq!(writer.get_state(name).unwrap(), 17);
}

#[test]
fn test_suspension_is_per_process() {
    let bus = LoopbackBus::new();
    let poster = process(&bus);
    let paused = process(&bus);
    let active = process(&bus);
    let name = "com.example.paused";

    paused.add(name).unwrap();
    active.add(name).unwrap();
    let paused_count = counter(&paused, name);
    let active_count = counter(&active, name);

    paused.suspend(name).unwrap();
    for _ in 0..3 {
        poster.post(name).unwrap();
    }

    assert!(settle(|| *active_count.lock() == 3));
    assert_eq!(*paused_count.lock(), 0);

    // Posts made while suspended coalesce into one delivery on resume
    paused.resume(name).unwrap();
    assert!(settle(|| *paused_count.lock() == 1));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(*paused_count.lock(), 1);
}

#[test]
fn test_dropping_a_process_releases_only_its_registrations() {
    let bus = LoopbackBus::new();
    let survivor = process(&bus);
    survivor.add("shared").unwrap();

    {
        let leaving = process(&bus);
        leaving.add("shared").unwrap();
        leaving.add("private").unwrap();
        assert_eq!(bus.registration_count(), 3);
    }

    assert_eq!(bus.registration_count(), 1);
    assert!(survivor.is_observing("shared"));

    let count = counter(&survivor, "shared");
    assert!(bus.post("shared").is_ok());
    assert!(settle(|| *count.lock() == 1));
}

#[tokio::test]
async fn test_async_stream_across_processes() {
    let bus = LoopbackBus::new();
    let poster = process(&bus);
    let watcher = process(&bus);

    watcher.add("com.example.stream").unwrap();
    let mut stream = watcher.stream("com.example.stream");

    for _ in 0..2 {
        poster.post("com.example.stream").unwrap();
    }

    let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("first delivery")
        .expect("stream open");
    let second = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("second delivery")
        .expect("stream open");

    assert_eq!(first.name, "com.example.stream");
    assert!(first.sequence < second.sequence);

    drop(stream);
    assert_eq!(watcher.events().listener_count("com.example.stream"), 0);
}
