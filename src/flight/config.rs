/*!
 * Coordinator Configuration
 *
 * Requested shard count and an optional default waiter timeout, with
 * environment overrides and CPU-derived presets.
 */

use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::limits::{DEFAULT_SHARDS, ENV_SHARDS, ENV_WAIT_TIMEOUT_MS};
use crate::core::shard_manager::{ShardManager, WorkloadProfile};
use super::router::effective_shard_count;
use std::time::Duration;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Requested shard count; rounded up to a power of two at construction
    pub shards: usize,
    /// Applied to waiters by `run` when set
    pub wait_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            wait_timeout: None,
        }
    }
}

impl CoordinatorConfig {
    pub const fn new(shards: usize) -> Self {
        Self {
            shards,
            wait_timeout: None,
        }
    }

    /// Size from CPU topology
    pub fn for_profile(profile: WorkloadProfile) -> Self {
        Self::new(ShardManager::shards(profile))
    }

    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_env()
    }

    /// Apply `SHARDCALLS_SHARDS` and `SHARDCALLS_WAIT_TIMEOUT_MS` if set
    pub fn with_env(mut self) -> ConfigResult<Self> {
        if let Some(shards) = read_env(ENV_SHARDS)? {
            self.shards = shards;
        }
        if let Some(ms) = read_env(ENV_WAIT_TIMEOUT_MS)? {
            self.wait_timeout = Some(Duration::from_millis(ms as u64));
        }
        Ok(self)
    }

    /// Shard count a coordinator built from this config will have
    pub fn effective_shards(&self) -> ConfigResult<usize> {
        effective_shard_count(self.shards)
    }
}

fn read_env(var: &'static str) -> ConfigResult<Option<usize>> {
    let Ok(value) = std::env::var(var) else {
        return Ok(None);
    };
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}
