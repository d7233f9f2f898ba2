//! Side channels that bypass the queues.
//!
//! Exactly two exist:
//!
//! - [`FeedbackEdge`]: the refinement stage's correction (bias update) call
//!   into the primary-estimation stage. It runs synchronously on the
//!   refinement thread while the primary thread may be mid-transform, so the
//!   receiving closure must be `Send + Sync` and touch only synchronized or
//!   atomic state.
//! - [`FailureSignal`]: the sticky failure flag raised by the refinement
//!   stage on unrecoverable estimation failure.
//!
//! Anything else that needs to cross stages goes through a queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Receiving end of a correction side channel.
pub type CorrectionTarget<C> = Arc<dyn Fn(&C) + Send + Sync>;

/// Low-latency correction channel from refinement back to primary estimation.
pub struct FeedbackEdge<C> {
    name: &'static str,
    target: CorrectionTarget<C>,
    deliveries: Arc<AtomicU64>,
}

impl<C> FeedbackEdge<C> {
    pub fn new(name: &'static str, target: CorrectionTarget<C>) -> Self {
        Self {
            name,
            target,
            deliveries: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Apply `correction` on the calling thread.
    pub fn send(&self, correction: &C) {
        (self.target)(correction);
        self.deliveries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Feedback edge '{}' delivered a correction", self.name);
    }

    /// Number of corrections delivered so far across all clones.
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }
}

impl<C> Clone for FeedbackEdge<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            target: Arc::clone(&self.target),
            deliveries: Arc::clone(&self.deliveries),
        }
    }
}

/// Sticky failure flag shared between the refinement stage and the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FailureSignal {
    failed: Arc<AtomicBool>,
}

impl FailureSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. It stays raised for the lifetime of the pipeline.
    pub fn raise(&self) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            tracing::error!("Refinement stage reported an unrecoverable failure");
        }
    }

    pub fn is_raised(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}
