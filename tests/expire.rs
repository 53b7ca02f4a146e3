use std::thread;
use std::time::Duration;

use memoflight::{EvictionPolicy, Expiry, Inserted, Key, MapStore, Memoizer, Store};

#[derive(Clone, Debug, PartialEq)]
struct Value(u32);

impl Expiry for Value {}

#[test]
fn test_store_basics() {
    let store = MapStore::new();
    let key = Key::from("a");
    assert!(store.get(&key).is_none());
    assert!(matches!(store.insert_if_absent(key.clone(), Value(1)), Inserted::Stored));
    assert!(matches!(
        store.insert_if_absent(key.clone(), Value(2)),
        Inserted::Existing(Value(1))
    ));
    assert_eq!(store.get(&key), Some(Value(1)));
    assert_eq!(store.len(), 1);
    assert_eq!(store.entries(), vec![(key.clone(), Value(1))]);
    assert_eq!(store.remove(&key), Some(Value(1)));
    assert!(store.is_empty());
    assert_eq!(store.policy(), EvictionPolicy::Forever);
}

#[test]
fn test_store_time_to_live() {
    let store = MapStore::with_policy(EvictionPolicy::TimeToLive(Duration::from_millis(30)));
    let key = Key::from("a");
    store.insert_if_absent(key.clone(), Value(1));
    assert_eq!(store.get(&key), Some(Value(1)));

    thread::sleep(Duration::from_millis(60));
    assert!(store.get(&key).is_none());
    assert!(store.entries().is_empty());
    assert_eq!(store.len(), 0);

    // An expired entry is replaced.
    assert!(matches!(store.insert_if_absent(key.clone(), Value(2)), Inserted::Stored));
    assert_eq!(store.get(&key), Some(Value(2)));
}

#[test]
fn test_store_purge() {
    let store = MapStore::with_policy(EvictionPolicy::TimeToLive(Duration::from_millis(20)));
    store.insert_if_absent(Key::from("a"), Value(1));
    store.insert_if_absent(Key::from("b"), Value(2));
    thread::sleep(Duration::from_millis(40));
    store.insert_if_absent(Key::from("c"), Value(3));
    assert_eq!(store.purge_expired(), 2);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_sliding() {
    let store = MapStore::with_policy(EvictionPolicy::Sliding(Duration::from_millis(200)));
    let key = Key::from("a");
    store.insert_if_absent(key.clone(), Value(1));

    // Regular lookups keep the entry alive.
    for _ in 0..6 {
        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.get(&key), Some(Value(1)));
    }

    thread::sleep(Duration::from_millis(400));
    assert!(store.get(&key).is_none());
}

#[test]
fn test_memoizer_time_to_live() {
    let stamp = Memoizer::builder()
        .policy(EvictionPolicy::TimeToLive(Duration::from_millis(30)))
        .build(|(x,): (u32,)| x)
        .unwrap();

    assert_eq!(stamp.invoke((1,)), Ok(1));
    assert_eq!(stamp.invoke((1,)), Ok(1));
    assert_eq!(stamp.misses(), 1);

    thread::sleep(Duration::from_millis(60));
    assert!(stamp.is_empty());
    assert_eq!(stamp.invoke((1,)), Ok(1));
    assert_eq!(stamp.misses(), 2);

    thread::sleep(Duration::from_millis(60));
    assert_eq!(stamp.purge_expired(), Ok(1));
    assert_eq!(stamp.clear(), Ok(0));
    assert_eq!(stamp.cleared_entries(), 0);
}

#[test]
fn test_pending_entries_do_not_expire() {
    let slow = std::sync::Arc::new(
        Memoizer::builder()
            .policy(EvictionPolicy::TimeToLive(Duration::from_millis(10)))
            .build(|(): ()| {
                thread::sleep(Duration::from_millis(100));
                7
            })
            .unwrap(),
    );

    let first = {
        let slow = std::sync::Arc::clone(&slow);
        thread::spawn(move || slow.invoke(()))
    };
    while slow.misses() == 0 {
        thread::yield_now();
    }

    // The running computation is older than the time-to-live.
    thread::sleep(Duration::from_millis(30));
    assert_eq!(slow.invoke(()), Ok(7));
    assert_eq!(first.join().unwrap(), Ok(7));
    assert_eq!(slow.misses(), 1);
}

#[test]
fn test_slow_computation_ages_from_completion() {
    let slow = Memoizer::builder()
        .policy(EvictionPolicy::TimeToLive(Duration::from_millis(100)))
        .build(|(x,): (u32,)| {
            thread::sleep(Duration::from_millis(150));
            x
        })
        .unwrap();

    // The computation outlives the time-to-live, but the entry is fresh.
    assert_eq!(slow.invoke((3,)), Ok(3));
    assert_eq!(slow.len(), 1);
    assert_eq!(slow.invoke((3,)), Ok(3));
    assert_eq!(slow.misses(), 1);

    thread::sleep(Duration::from_millis(150));
    assert!(slow.is_empty());
}
