/*!
 * Shared helpers for flight tests
 */

use std::thread;
use std::time::{Duration, Instant};

/// Spin until `condition` holds, failing the test after `timeout`
pub fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", timeout);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Async variant of [`wait_until`]
pub async fn wait_until_async<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", timeout);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub const PATIENCE: Duration = Duration::from_secs(10);
