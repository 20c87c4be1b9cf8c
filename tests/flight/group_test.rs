/*!
 * Group Tests
 * Single execution per key, outcome broadcast, panic recovery, timeouts
 */

use crate::common::{wait_until, PATIENCE};
use pretty_assertions::assert_eq;
use shardcalls::{Completion, FlightError, Group, ShardedCoordinator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

type TestGroup = Group<String, String, String>;

#[test]
fn test_at_most_once_execution() {
    const CALLERS: usize = 16;
    let group = Arc::new(TestGroup::new());
    let executions = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let group = group.clone();
            let executions = executions.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let observer = group.clone();
                group.run("k".to_string(), move || {
                    executions.fetch_add(1, Ordering::SeqCst);
                    // Hold the flight open until every caller has attached
                    wait_until(PATIENCE, || observer.waiters("k") == Some(CALLERS));
                    Ok("value".to_string())
                })
            })
        })
        .collect();

    let completions: Vec<Completion<String, String>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(completions.iter().filter(|c| !c.shared).count(), 1);
    for completion in &completions {
        assert_eq!(completion.result, Ok("value".to_string()));
    }

    let stats = group.stats();
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.shared, (CALLERS - 1) as u64);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn test_key_isolation_on_single_shard() {
    let calls: Arc<ShardedCoordinator<String, u32, String>> =
        Arc::new(ShardedCoordinator::new(1).unwrap());
    assert_eq!(calls.shard_index("k1"), calls.shard_index("k2"));

    let (started_tx, started_rx) = flume::bounded::<()>(1);
    let (release_tx, release_rx) = flume::bounded::<()>(1);

    let slow = {
        let calls = calls.clone();
        thread::spawn(move || {
            calls.run("k1".to_string(), move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok(1)
            })
        })
    };
    started_rx.recv().unwrap();

    // k1's work is still running on the same shard; k2 must not wait for it
    let start = Instant::now();
    let fast = calls.run("k2".to_string(), || Ok(2));
    assert_eq!(fast, Completion {
        result: Ok(2),
        shared: false,
    });
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(calls.is_in_flight("k1"));

    release_tx.send(()).unwrap();
    assert_eq!(slow.join().unwrap().result, Ok(1));
}

#[test]
fn test_generation_freshness() {
    let group = TestGroup::new();

    let first = group.run("k".to_string(), || Ok("first".to_string()));
    let second = group.run("k".to_string(), || Ok("second".to_string()));

    assert_eq!(first.result, Ok("first".to_string()));
    assert_eq!(second.result, Ok("second".to_string()));
    assert!(!first.shared);
    assert!(!second.shared);
    assert_eq!(group.stats().executions, 2);
}

#[test]
fn test_work_error_reaches_every_waiter() {
    const CALLERS: usize = 6;
    let group = Arc::new(TestGroup::new());

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let group = group.clone();
            thread::spawn(move || {
                let observer = group.clone();
                group.run("k".to_string(), move || {
                    wait_until(PATIENCE, || observer.waiters("k") == Some(CALLERS));
                    Err("connection refused".to_string())
                })
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(
            handle.join().unwrap().result,
            Err(FlightError::Work("connection refused".to_string()))
        );
    }
}

#[test]
fn test_panic_fails_all_waiters_then_recovers() {
    const CALLERS: usize = 8;
    let group = Arc::new(TestGroup::new());

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let group = group.clone();
            thread::spawn(move || {
                let observer = group.clone();
                group.run("k".to_string(), move || {
                    wait_until(PATIENCE, || observer.waiters("k") == Some(CALLERS));
                    panic!("backend exploded");
                })
            })
        })
        .collect();

    for handle in handles {
        // Caller threads themselves must not panic
        let completion = handle.join().expect("panic escaped the group");
        assert_eq!(
            completion.result,
            Err(FlightError::Panicked("backend exploded".to_string()))
        );
    }

    assert!(!group.is_in_flight("k"));
    let next = group.run("k".to_string(), || Ok("recovered".to_string()));
    assert_eq!(next.result, Ok("recovered".to_string()));
    assert!(!next.shared);
    assert_eq!(group.stats().panics, 1);
}

#[test]
fn test_waiter_timeout_leaves_flight_running() {
    let group = Arc::new(TestGroup::new());
    let (started_tx, started_rx) = flume::bounded::<()>(1);
    let (release_tx, release_rx) = flume::bounded::<()>(1);

    let initiator = {
        let group = group.clone();
        thread::spawn(move || {
            group.run("k".to_string(), move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok("done".to_string())
            })
        })
    };
    started_rx.recv().unwrap();

    let patient = {
        let group = group.clone();
        thread::spawn(move || group.run("k".to_string(), || Ok("unused".to_string())))
    };
    wait_until(PATIENCE, || group.waiters("k") == Some(2));

    let impatient = group.run_timeout("k".to_string(), Duration::from_millis(20), || {
        Ok("unused".to_string())
    });
    assert_eq!(
        impatient,
        Completion {
            result: Err(FlightError::Timeout(Duration::from_millis(20))),
            shared: true,
        }
    );
    // The timed-out waiter withdrew; the flight is untouched
    assert_eq!(group.waiters("k"), Some(2));

    release_tx.send(()).unwrap();
    assert_eq!(initiator.join().unwrap().result, Ok("done".to_string()));
    assert_eq!(
        patient.join().unwrap(),
        Completion {
            result: Ok("done".to_string()),
            shared: true,
        }
    );
    assert_eq!(group.stats().timeouts, 1);
}

#[test]
fn test_run_chan_delivers_to_every_caller() {
    const CALLERS: usize = 5;
    let group = Arc::new(TestGroup::new());
    let (release_tx, release_rx) = flume::bounded::<()>(1);

    let first = group.run_chan("k".to_string(), move || {
        release_rx.recv().unwrap();
        Ok("chan".to_string())
    });
    let rest: Vec<_> = (1..CALLERS)
        .map(|_| group.run_chan("k".to_string(), || Ok("unused".to_string())))
        .collect();

    assert_eq!(group.waiters("k"), Some(CALLERS));
    release_tx.send(()).unwrap();

    assert_eq!(
        first.recv_timeout(PATIENCE).unwrap(),
        Completion {
            result: Ok("chan".to_string()),
            shared: false,
        }
    );
    for rx in rest {
        let completion = rx.recv_timeout(PATIENCE).unwrap();
        assert!(completion.shared);
        assert_eq!(completion.result, Ok("chan".to_string()));
    }
    wait_until(PATIENCE, || group.in_flight() == 0);
}
