/*!
 * shardcalls demo
 *
 * 100 concurrent callers over 10 keys on a 4-shard coordinator, once with
 * threads and once with tokio tasks. Each key's work runs once; the other
 * nine callers per key share its result.
 *
 * Environment:
 * - SHARDCALLS_SHARDS: requested shard count (default 4)
 * - SHARDCALLS_WAIT_TIMEOUT_MS: waiter timeout (default none)
 */

use shardcalls::{
    init_tracing, AsyncShardedCoordinator, CoordinatorConfig, ShardedCoordinator,
};
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const CALLERS: usize = 100;
const KEYS: usize = 10;
const WORK_TIME: Duration = Duration::from_millis(100);

fn main() -> Result<(), Box<dyn Error>> {
    if let Err(e) = init_tracing() {
        eprintln!("tracing already initialized: {}", e);
    }

    let config = CoordinatorConfig::new(4).with_env()?;
    info!(
        requested = config.shards,
        effective = config.effective_shards()?,
        "shardcalls demo starting"
    );

    run_threads(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_tasks(&config))?;

    Ok(())
}

fn run_threads(config: &CoordinatorConfig) -> Result<(), Box<dyn Error>> {
    info!("Blocking coordinator: {} callers, {} keys", CALLERS, KEYS);
    let calls: Arc<ShardedCoordinator<String, String, String>> =
        Arc::new(ShardedCoordinator::from_config(config)?);

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                let key = format!("key{}", i % KEYS);
                let result_key = key.clone();
                calls.run(key, move || {
                    thread::sleep(WORK_TIME);
                    Ok(format!("Result for {}", result_key))
                })
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(completion) => match completion.result {
                Ok(value) => println!("Result: {}, Shared: {}", value, completion.shared),
                Err(e) => println!("Error: {}", e),
            },
            Err(_) => warn!("caller thread panicked"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&calls.stats())?);
    Ok(())
}

async fn run_tasks(config: &CoordinatorConfig) -> Result<(), Box<dyn Error>> {
    info!("Async coordinator: {} tasks, {} keys", CALLERS, KEYS);
    let calls: Arc<AsyncShardedCoordinator<String, String, String>> =
        Arc::new(AsyncShardedCoordinator::from_config(config)?);

    let tasks: Vec<_> = (0..CALLERS)
        .map(|i| {
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                let key = format!("key{}", i % KEYS);
                let result_key = key.clone();
                calls
                    .run(key, || async move {
                        tokio::time::sleep(WORK_TIME).await;
                        Ok(format!("Result for {}", result_key))
                    })
                    .await
            })
        })
        .collect();

    let mut shared = 0;
    for task in tasks {
        let completion = task.await?;
        if completion.shared {
            shared += 1;
        }
        if let Err(e) = completion.result {
            println!("Error: {}", e);
        }
    }

    let stats = calls.stats();
    info!(
        executions = stats.totals.executions,
        shared,
        "async scenario complete"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
