//! Point-in-time snapshots for an external monitor.
//!
//! Every field is read without stopping the pipeline, so a snapshot taken
//! while threads are running may be internally inconsistent.

use crate::config::ExecutionMode;
use crate::pipeline::queue::BoundedQueue;
use crate::types::{ModuleState, PipelineState, QueueState, StageKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub name: String,
    pub len: usize,
    pub capacity: usize,
    pub state: QueueState,
    pub shut_down: bool,
}

impl QueueStatus {
    pub fn of<T>(queue: &BoundedQueue<T>) -> Self {
        Self {
            name: queue.name().to_string(),
            len: queue.len(),
            capacity: queue.capacity(),
            state: queue.state(),
            shut_down: queue.is_shut_down(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    pub stage: StageKind,
    pub state: ModuleState,
    pub working: bool,
    pub initialized: bool,
    /// Inputs popped and run through the transform
    pub processed: u64,
    /// Outputs fanned out
    pub produced: u64,
    pub queue: QueueStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub mode: ExecutionMode,
    pub failed: bool,
    pub initialized: bool,
    /// Enabled modules in topological order
    pub modules: Vec<ModuleStatus>,
    /// Corrections delivered over the refinement → primary side channel
    pub feedback_deliveries: u64,
}

impl PipelineStatus {
    pub fn module(&self, stage: StageKind) -> Option<&ModuleStatus> {
        self.modules.iter().find(|m| m.stage == stage)
    }

    /// Items still sitting in queues across the graph.
    pub fn queued_items(&self) -> usize {
        self.modules.iter().map(|m| m.queue.len).sum()
    }
}
