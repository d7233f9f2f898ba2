//! Stage orchestration: queues, modules, wiring and shutdown.
//!
//! Items flow from an external data source into the head-of-chain queue and
//! through a fixed graph of stages. Each stage is a [`Module`] that pops from
//! its own [`BoundedQueue`], runs its [`Processor`] and fans the result out to
//! downstream queues on its own thread. The [`Pipeline`] owns every module and
//! thread and never looks at item contents.
//!
//! # Architecture
//!
//! ```text
//! [DataSource] ──inject──► [Primary] ──► [Refinement] ──► [Map] ──► [Visualizer] ──► [Display]
//!                              ▲              │     └───► [Revisit]
//!                              └──correction──┘
//! ```
//!
//! # Design
//!
//! - **Queue-mediated** - all coordination goes through bounded queues, except
//!   the refinement → primary correction edge ([`FeedbackEdge`]) and the
//!   sticky [`FailureSignal`].
//! - **Static wiring** - subscribers are registered through `&mut` before a
//!   module is shared, so dispatch needs no lock.
//! - **Two modes, one graph** - parallel and sequential execution use the
//!   same modules and callbacks; only the scheduler differs.

pub mod callback;
pub mod executor;
pub mod feedback;
pub mod module;
pub mod queue;
pub mod source;
pub mod stages;
pub mod status;

pub use callback::{CallbackRegistry, OutputCallback};
pub use executor::{Pipeline, PipelineBuilder};
pub use feedback::{CorrectionTarget, FailureSignal, FeedbackEdge};
pub use module::{FnProcessor, Module, PipelineModule, Processor};
pub use queue::BoundedQueue;
pub use source::{DataSource, InputHandle};
pub use stages::{
    ChainOutput, DisplayStage, MapStage, Payloads, PrimaryStage, RefinementStage, RevisitStage,
    Stages, VisualizerStage, VizInput,
};
pub use status::{ModuleStatus, PipelineStatus, QueueStatus};
