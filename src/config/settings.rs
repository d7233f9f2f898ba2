//! Individual configuration sections
//!
//! # Main Types
//!
//! - [`ExecutionMode`] - Parallel (thread per stage) or sequential (caller-driven) execution
//! - [`StageToggles`] - Which optional stages are wired in
//! - [`QueueConfig`] - Queue capacity and the bounded wait used by blocking pushes
//! - [`ShutdownConfig`] - Quiescence polling for `shutdown_when_finished`
//!
//! # Bounded Wait
//!
//! `push_timeout_ms` is a wait *per attempt*: a producer blocked on a full
//! queue wakes after the timeout, logs that it is still waiting, and retries.
//! An item accepted by the caller is never dropped because the timeout
//! elapsed; it is only discarded once the queue has been shut down.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity for every stage input queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Default bounded wait per blocking-push attempt in milliseconds
pub const DEFAULT_PUSH_TIMEOUT_MS: u64 = 100;

/// Default quiescence polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// How stages are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    /// One dedicated thread per enabled stage
    #[default]
    Parallel,
    /// Everything runs on the injecting thread, one step per stage per input
    Sequential,
}

impl ExecutionMode {
    pub fn is_parallel(self) -> bool {
        self == ExecutionMode::Parallel
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Parallel => write!(f, "parallel"),
            ExecutionMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Optional stages to wire in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StageToggles {
    /// Map reconstruction
    pub map: bool,
    /// Revisit (loop) detection
    pub revisit: bool,
    /// Visualization and display
    pub visualize: bool,
}

/// Queue sizing and backpressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum items a blocking push will wait for room under
    pub capacity: usize,
    /// Wait per blocking-push attempt before retrying
    pub push_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            push_timeout_ms: DEFAULT_PUSH_TIMEOUT_MS,
        }
    }
}

impl QueueConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

/// Quiescence detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Sleep between quiescence checks in parallel mode
    pub poll_interval_ms: u64,
    /// Also require the mandatory chain to have produced output before
    /// quiescence counts (guards against shutting down before data arrives)
    pub wait_for_initialization: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            wait_for_initialization: false,
        }
    }
}

impl ShutdownConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
