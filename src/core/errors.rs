/*!
 * Error Types
 * Construction-time configuration errors and per-call flight outcomes
 */

use miette::Diagnostic;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Result type for coordinator construction and configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type delivered to every caller attached to a flight
pub type FlightResult<V, E> = Result<V, FlightError<E>>;

/// Configuration errors, reported synchronously at construction
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid shard count: {0}")]
    #[diagnostic(
        code(config::invalid_shard_count),
        help("Request at least one shard. The effective count is rounded up to a power of two.")
    )]
    InvalidShardCount(usize),

    #[error("Shard count {requested} exceeds maximum of {max}")]
    #[diagnostic(
        code(config::too_many_shards),
        help("Lock contention stops improving long before this many shards. Use a smaller count.")
    )]
    TooManyShards { requested: usize, max: usize },

    #[error("Invalid value {value:?} for {var}")]
    #[diagnostic(
        code(config::invalid_env),
        help("Expected a positive integer. Unset the variable to use the default.")
    )]
    InvalidEnv { var: &'static str, value: String },
}

/// Failure outcome of a deduplicated call
///
/// `Work` carries the work function's own error verbatim. Every other variant
/// is produced by the coordinator itself and is distinguishable from work
/// failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlightError<E> {
    #[error("Work failed: {0}")]
    Work(E),

    #[error("Work panicked: {0}")]
    Panicked(String),

    #[error("Timed out after {0:?} waiting for in-flight call")]
    Timeout(Duration),

    #[error("In-flight call was abandoned before completing")]
    Abandoned,

    #[error("Failed to spawn flight thread: {0}")]
    Spawn(String),
}

impl<E> FlightError<E> {
    /// True if this is the work function's own error
    #[inline]
    pub fn is_work(&self) -> bool {
        matches!(self, Self::Work(_))
    }

    /// True if the work function terminated abnormally
    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// True if only this caller gave up waiting
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Borrow the work error, if any
    pub fn work(&self) -> Option<&E> {
        match self {
            Self::Work(e) => Some(e),
            _ => None,
        }
    }

    /// Take the work error, if any
    pub fn into_work(self) -> Option<E> {
        match self {
            Self::Work(e) => Some(e),
            _ => None,
        }
    }
}

/// Render a panic payload as a message
///
/// `panic!` with a literal yields `&'static str`, with format args `String`.
/// Anything else (`panic_any`) is reported opaquely.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
