//! Ordered output subscribers for a module.
//!
//! A `CallbackRegistry` is filled while the graph is being wired and is only
//! reachable through `&mut` until its module is shared with a thread, so the
//! list cannot change once the pipeline runs and dispatch needs no lock.

use std::sync::Arc;

/// A subscriber to a module's output. Runs inline on the producer's thread.
pub type OutputCallback<O> = Box<dyn Fn(&Arc<O>) + Send + Sync>;

/// Ordered list of output subscribers.
pub struct CallbackRegistry<O> {
    callbacks: Vec<OutputCallback<O>>,
}

impl<O> CallbackRegistry<O> {
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Append a subscriber; delivery follows registration order.
    pub fn register(&mut self, callback: OutputCallback<O>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Deliver `output` to every subscriber in order, each to completion
    /// before the next starts.
    pub fn dispatch(&self, output: &Arc<O>) {
        for callback in &self.callbacks {
            callback(output);
        }
    }
}

impl<O> Default for CallbackRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}
