//! Core lifecycle types shared across the pipeline
//!
//! # Main Types
//!
//! - [`QueueState`] - Active / Draining / ShutDown lifecycle of a bounded queue
//! - [`ModuleState`] - Created / Spinning / ShuttingDown / Stopped lifecycle of a module
//! - [`PipelineState`] - Built / Running / ShuttingDown / ShutDown lifecycle of the orchestrator
//! - [`StageKind`] - The fixed set of stages the orchestrator knows how to wire
//!
//! Module and pipeline states are stored in atomics, so both carry a compact
//! `u8` encoding.

use serde::{Deserialize, Serialize};

/// Sensor timestamps in nanoseconds
pub type Timestamp = i64;

/// Lifecycle of a [`BoundedQueue`](crate::pipeline::BoundedQueue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    /// Accepting pushes and pops
    Active,
    /// Shutdown requested; remaining items may still be popped
    Draining,
    /// Shutdown requested and empty
    ShutDown,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Active => write!(f, "Active"),
            QueueState::Draining => write!(f, "Draining"),
            QueueState::ShutDown => write!(f, "ShutDown"),
        }
    }
}

/// Lifecycle of a [`Module`](crate::pipeline::Module)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModuleState {
    Created = 0,
    Spinning = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl ModuleState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ModuleState::Created,
            1 => ModuleState::Spinning,
            2 => ModuleState::ShuttingDown,
            _ => ModuleState::Stopped,
        }
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleState::Created => write!(f, "Created"),
            ModuleState::Spinning => write!(f, "Spinning"),
            ModuleState::ShuttingDown => write!(f, "ShuttingDown"),
            ModuleState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Lifecycle of the [`Pipeline`](crate::pipeline::Pipeline) orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PipelineState {
    Built = 0,
    Running = 1,
    ShuttingDown = 2,
    ShutDown = 3,
}

impl PipelineState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Built,
            1 => PipelineState::Running,
            2 => PipelineState::ShuttingDown,
            _ => PipelineState::ShutDown,
        }
    }

    /// Whether shutdown has started or finished
    pub fn is_shutting_down_or_down(self) -> bool {
        matches!(self, PipelineState::ShuttingDown | PipelineState::ShutDown)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Built => write!(f, "Built"),
            PipelineState::Running => write!(f, "Running"),
            PipelineState::ShuttingDown => write!(f, "ShuttingDown"),
            PipelineState::ShutDown => write!(f, "ShutDown"),
        }
    }
}

/// The stages the orchestrator wires.
///
/// `ALL` is the topological order used for sequential stepping and quiescence
/// polling. `SHUTDOWN_ORDER` is consumer-before-producer for the mandatory
/// chain, followed by the optional stages; threads are joined in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    PrimaryEstimation,
    Refinement,
    MapReconstruction,
    RevisitDetection,
    Visualization,
    Display,
}

impl StageKind {
    pub const ALL: [StageKind; 6] = [
        StageKind::PrimaryEstimation,
        StageKind::Refinement,
        StageKind::MapReconstruction,
        StageKind::RevisitDetection,
        StageKind::Visualization,
        StageKind::Display,
    ];

    pub const SHUTDOWN_ORDER: [StageKind; 6] = [
        StageKind::Refinement,
        StageKind::PrimaryEstimation,
        StageKind::MapReconstruction,
        StageKind::RevisitDetection,
        StageKind::Visualization,
        StageKind::Display,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::PrimaryEstimation => "primary-estimation",
            StageKind::Refinement => "refinement",
            StageKind::MapReconstruction => "map-reconstruction",
            StageKind::RevisitDetection => "revisit-detection",
            StageKind::Visualization => "visualization",
            StageKind::Display => "display",
        }
    }

    /// Name of the stage's input queue
    pub fn queue_name(self) -> &'static str {
        match self {
            StageKind::PrimaryEstimation => "primary_input_queue",
            StageKind::Refinement => "refinement_input_queue",
            StageKind::MapReconstruction => "map_input_queue",
            StageKind::RevisitDetection => "revisit_input_queue",
            StageKind::Visualization => "visualization_input_queue",
            StageKind::Display => "display_input_queue",
        }
    }

    /// Whether the stage belongs to the mandatory chain
    pub fn is_mandatory(self) -> bool {
        matches!(self, StageKind::PrimaryEstimation | StageKind::Refinement)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
