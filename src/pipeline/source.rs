//! Boundary with the external data source.
//!
//! The data source is the only producer for the head-of-chain queue. It
//! receives an [`InputHandle`] from the pipeline and is registered back with
//! [`Pipeline::register_data_source`](crate::pipeline::Pipeline::register_data_source)
//! so shutdown can stop it and quiescence can account for it.

use crate::pipeline::executor::Shared;
use crate::pipeline::stages::Payloads;
use crate::types::PipelineState;
use std::sync::Arc;

/// Contract for anything that feeds the pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait DataSource: Send + Sync {
    /// Stop producing. Must not block on the pipeline.
    fn shutdown(&self);

    /// Whether the source still holds or is about to inject input.
    fn is_working(&self) -> bool;
}

/// Cloneable injection entry point handed to a data source.
pub struct InputHandle<T: Payloads> {
    shared: Arc<Shared<T>>,
}

impl<T: Payloads> InputHandle<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Inject one input. Returns `false` if the pipeline is shutting down,
    /// not yet launched in parallel mode, or the head queue rejected the item.
    ///
    /// In sequential mode this also steps every stage once on the calling
    /// thread, so a sequential pipeline must be fed from a single thread.
    pub fn inject(&self, item: T::Input) -> bool {
        self.shared.inject_input(item)
    }

    /// Whether injected items would be accepted: the pipeline is running
    /// (or, in sequential mode, built) and not shutting down.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepts_input()
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.shared.state()
    }
}

impl<T: Payloads> Clone for InputHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
