/*!
 * Sharded Coordinator Tests
 * Rounding, routing determinism, and the 100-caller / 10-key scenario
 */

use crate::common::{wait_until, PATIENCE};
use pretty_assertions::assert_eq;
use shardcalls::{
    ConfigError, CoordinatorConfig, FixedAHasher, FlightError, KeyHasher, ShardedCoordinator,
    MAX_SHARDS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

type Calls = ShardedCoordinator<String, String, String>;

#[test]
fn test_effective_shard_counts() {
    assert_eq!(Calls::new(5).unwrap().shard_count(), 8);
    assert_eq!(Calls::new(8).unwrap().shard_count(), 8);
    assert_eq!(Calls::new(1).unwrap().shard_count(), 1);
    assert_eq!(Calls::new(MAX_SHARDS).unwrap().shard_count(), MAX_SHARDS);
}

#[test]
fn test_invalid_shard_counts() {
    assert_eq!(
        Calls::new(0).err(),
        Some(ConfigError::InvalidShardCount(0))
    );
    assert_eq!(
        Calls::new(MAX_SHARDS + 1).err(),
        Some(ConfigError::TooManyShards {
            requested: MAX_SHARDS + 1,
            max: MAX_SHARDS,
        })
    );
}

#[test]
fn test_routing_is_deterministic() {
    let calls = Calls::new(16).unwrap();
    let hasher = shardcalls::Fnv1a;

    for i in 0..200 {
        let key = format!("key{}", i);
        let index = calls.shard_index(&key);
        assert_eq!(index, calls.shard_index(&key));
        assert_eq!(index as u64, hasher.hash(key.as_bytes()) & calls.mask());
        assert!(index < calls.shard_count());
    }
}

#[test]
fn test_alternate_hasher_routing() {
    let calls: ShardedCoordinator<String, String, String, FixedAHasher> =
        ShardedCoordinator::with_hasher(8, FixedAHasher::new()).unwrap();
    let reference = FixedAHasher::new();

    for i in 0..50 {
        let key = format!("user:{}", i);
        assert_eq!(
            calls.shard_index(&key) as u64,
            reference.hash(key.as_bytes()) & 7
        );
    }
}

#[test]
fn test_hundred_callers_ten_keys() {
    const CALLERS: usize = 100;
    const KEYS: usize = 10;
    const PER_KEY: usize = CALLERS / KEYS;

    let calls = Arc::new(Calls::new(4).unwrap());
    let executions: Arc<Vec<AtomicUsize>> =
        Arc::new((0..KEYS).map(|_| AtomicUsize::new(0)).collect());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let calls = calls.clone();
            let executions = executions.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let slot = i % KEYS;
                let key = format!("key{}", slot);
                let observer = calls.clone();
                let work_key = key.clone();
                barrier.wait();
                let completion = calls.run(key.clone(), move || {
                    executions[slot].fetch_add(1, Ordering::SeqCst);
                    wait_until(PATIENCE, || observer.waiters(&work_key) == Some(PER_KEY));
                    thread::sleep(Duration::from_millis(10));
                    Ok(format!("Result for {}", work_key))
                });
                (key, completion)
            })
        })
        .collect();

    let mut by_key: HashMap<String, Vec<_>> = HashMap::new();
    for handle in handles {
        let (key, completion) = handle.join().unwrap();
        by_key.entry(key).or_default().push(completion);
    }

    for counter in executions.iter() {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    let shared = by_key
        .values()
        .flatten()
        .filter(|c| c.shared)
        .count();
    assert_eq!(shared, 90);

    for (key, completions) in &by_key {
        assert_eq!(completions.len(), PER_KEY);
        assert_eq!(completions.iter().filter(|c| !c.shared).count(), 1);
        for completion in completions {
            assert_eq!(completion.result, Ok(format!("Result for {}", key)));
        }
    }

    let stats = calls.stats();
    assert_eq!(stats.shard_count, 4);
    assert_eq!(stats.totals.executions, 10);
    assert_eq!(stats.totals.shared, 90);
    assert_eq!(stats.totals.in_flight, 0);
    assert_eq!(calls.in_flight(), 0);
}

#[test]
fn test_forget_starts_new_generation() {
    let calls = Arc::new(Calls::new(4).unwrap());
    let (started_tx, started_rx) = flume::bounded::<()>(1);
    let (release_tx, release_rx) = flume::bounded::<()>(1);

    let old = {
        let calls = calls.clone();
        thread::spawn(move || {
            calls.run("k".to_string(), move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok("old".to_string())
            })
        })
    };
    started_rx.recv().unwrap();

    assert!(calls.forget("k"));
    assert!(!calls.is_in_flight("k"));

    // With the record forgotten this call executes instead of waiting
    let fresh = calls.run("k".to_string(), || Ok("new".to_string()));
    assert_eq!(fresh.result, Ok("new".to_string()));
    assert!(!fresh.shared);

    release_tx.send(()).unwrap();
    assert_eq!(old.join().unwrap().result, Ok("old".to_string()));
    assert_eq!(calls.stats().totals.forgotten, 1);
}

#[test]
fn test_config_wait_timeout_applies_to_run() {
    let config = CoordinatorConfig::new(2).with_wait_timeout(Duration::from_millis(20));
    let calls = Arc::new(Calls::from_config(&config).unwrap());
    assert_eq!(calls.wait_timeout(), Some(Duration::from_millis(20)));

    let (started_tx, started_rx) = flume::bounded::<()>(1);
    let (release_tx, release_rx) = flume::bounded::<()>(1);
    let initiator = {
        let calls = calls.clone();
        thread::spawn(move || {
            calls.run("slow".to_string(), move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok("late".to_string())
            })
        })
    };
    started_rx.recv().unwrap();

    let waiter = calls.run("slow".to_string(), || Ok("unused".to_string()));
    assert_eq!(
        waiter.result,
        Err(FlightError::Timeout(Duration::from_millis(20)))
    );

    release_tx.send(()).unwrap();
    // The initiator is never subject to the waiter timeout
    assert_eq!(initiator.join().unwrap().result, Ok("late".to_string()));
}

#[test]
fn test_stats_spread_across_shards() {
    let calls = Calls::new(4).unwrap();
    for i in 0..40 {
        let key = format!("key{}", i);
        calls.run(key, || Ok(String::new()));
    }

    let stats = calls.stats();
    assert_eq!(stats.per_shard.len(), 4);
    assert_eq!(stats.totals.executions, 40);
    assert_eq!(
        stats.per_shard.iter().map(|s| s.executions).sum::<u64>(),
        40
    );
    assert!(stats.per_shard.iter().all(|s| s.executions > 0));
}
