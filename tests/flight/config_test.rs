/*!
 * Configuration Tests
 * Environment overrides; serialized since they mutate process env
 */

use serial_test::serial;
use shardcalls::core::limits::{ENV_SHARDS, ENV_WAIT_TIMEOUT_MS};
use shardcalls::{ConfigError, CoordinatorConfig, ShardedCoordinator, DEFAULT_SHARDS};
use std::env;
use std::time::Duration;

fn clear_env() {
    env::remove_var(ENV_SHARDS);
    env::remove_var(ENV_WAIT_TIMEOUT_MS);
}

#[test]
#[serial]
fn test_env_unset_keeps_defaults() {
    clear_env();
    let config = CoordinatorConfig::from_env().unwrap();
    assert_eq!(config, CoordinatorConfig::default());
    assert_eq!(config.shards, DEFAULT_SHARDS);
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    env::set_var(ENV_SHARDS, "12");
    env::set_var(ENV_WAIT_TIMEOUT_MS, "150");

    let config = CoordinatorConfig::new(4).with_env().unwrap();
    assert_eq!(config.shards, 12);
    assert_eq!(config.wait_timeout, Some(Duration::from_millis(150)));

    let calls: ShardedCoordinator<String, u32, String> =
        ShardedCoordinator::from_config(&config).unwrap();
    assert_eq!(calls.shard_count(), 16);
    assert_eq!(calls.requested_shards(), 12);
    clear_env();
}

#[test]
#[serial]
fn test_env_rejects_garbage() {
    clear_env();
    env::set_var(ENV_SHARDS, "lots");
    assert_eq!(
        CoordinatorConfig::from_env(),
        Err(ConfigError::InvalidEnv {
            var: ENV_SHARDS,
            value: "lots".to_string(),
        })
    );

    env::set_var(ENV_SHARDS, "0");
    assert!(matches!(
        CoordinatorConfig::from_env(),
        Err(ConfigError::InvalidEnv { .. })
    ));
    clear_env();
}
