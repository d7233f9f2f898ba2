//! # sensor-pipeline: multi-stage sensor-processing orchestration
//!
//! Wires independently implemented processing stages into a fixed graph of
//! bounded queues and callback fan-out, runs each stage on its own thread (or
//! steps them all on one thread for deterministic runs) and tears the graph
//! down without leaving any thread blocked.
//!
//! ## Architecture
//!
//! - **Queues**: every stage owns one [`BoundedQueue`] as its input
//! - **Modules**: a [`Module`] pops, runs its [`Processor`] and fans the
//!   output out to downstream queues on its own thread
//! - **Orchestrator**: [`Pipeline`] owns modules and threads, injects input,
//!   detects quiescence and drives the ordered shutdown
//! - **Simulation**: [`sim`] provides a complete synthetic instantiation
//!   used by the replay binary
//!
//! ## Configuration
//!
//! [`PipelineConfig`] selects the execution mode and optional stages and is
//! loaded from TOML or JSON.
//!
//! ## Example
//!
//! ```ignore
//! use sensor_pipeline::{sim, PipelineBuilder, PipelineConfig};
//!
//! let config = PipelineConfig::sequential().with_all_stages();
//! let scenario = sim::Scenario::default();
//! let pipeline = PipelineBuilder::new(config.clone(), sim::stages(&scenario)).build()?;
//! pipeline.launch()?;
//!
//! let source = sim::SyntheticSource::new(pipeline.input_handle(), scenario, config.rng());
//! source.run();
//! while !pipeline.shutdown_when_finished(config.shutdown.poll_interval()) {
//!     pipeline.step();
//! }
//! ```

pub mod config;
pub mod error;
pub mod numerical;
pub mod pipeline;
pub mod sim;
pub mod types;

// Re-export commonly used types
pub use config::{ExecutionMode, PipelineConfig};
pub use error::{PipelineError, Result, ResultExt};
pub use pipeline::{
    BoundedQueue, DataSource, InputHandle, Module, Payloads, Pipeline, PipelineBuilder,
    PipelineStatus, Processor, Stages,
};
pub use types::{ModuleState, PipelineState, QueueState, StageKind, Timestamp};
