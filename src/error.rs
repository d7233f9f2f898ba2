//! Error handling for the sensor pipeline
//!
//! This module defines the crate error type and a Result alias used by
//! construction, configuration and lifecycle operations. Per-item stage errors
//! never travel through here: the only cross-thread error channel at runtime is
//! the pipeline's sticky failure flag.

use crate::types::PipelineState;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage was enabled in the configuration but no implementation was supplied
    #[error("Stage '{0}' is enabled but no implementation was provided")]
    MissingStage(&'static str),

    /// Lifecycle operation attempted from the wrong orchestrator state
    #[error("Invalid pipeline state for {operation}: {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    /// Queue resumed while threads were still blocked on it
    #[error("Queue '{name}' still has {waiters} blocked waiter(s)")]
    QueueBusy { name: String, waiters: usize },

    /// A stage thread could not be spawned
    #[error("Failed to spawn {stage} thread: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
