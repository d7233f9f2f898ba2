//! Stage contracts and the item types flowing between them.
//!
//! # Main Types
//!
//! - [`Payloads`] - bundles every item type crossing a queue, so one type
//!   parameter describes a whole pipeline
//! - [`PrimaryStage`] / [`RefinementStage`] - the mandatory chain, with the
//!   correction and failure side channels
//! - [`ChainOutput`] / [`VizInput`] - fan-in inputs for stages that
//!   subscribe to more than one producer
//! - [`Stages`] - the set of stage implementations handed to the builder

use crate::pipeline::feedback::{CorrectionTarget, FailureSignal, FeedbackEdge};
use crate::pipeline::module::Processor;
use std::sync::Arc;

/// Item types of one pipeline instantiation.
pub trait Payloads: Send + Sync + 'static {
    /// Synchronized sensor packet injected by the data source
    type Input: Send + 'static;
    /// Primary-estimation output
    type Estimate: Send + Sync + 'static;
    /// Refinement output
    type Refined: Send + Sync + 'static;
    /// Map-reconstruction output
    type Map: Send + Sync + 'static;
    /// Revisit-detection output
    type Revisit: Send + Sync + 'static;
    /// Rendered visualization frame
    type Frame: Send + Sync + 'static;
    /// Correction sent from refinement back to primary estimation
    type Correction: Send + 'static;

    /// Whether an estimate is forwarded to the refinement stage.
    ///
    /// Only the primary → refinement edge is filtered; every other
    /// subscriber of the primary stage sees all estimates.
    fn is_decision_point(_estimate: &Self::Estimate) -> bool {
        true
    }
}

/// Head of the mandatory chain.
pub trait PrimaryStage<T: Payloads>: Processor<Input = T::Input, Output = T::Estimate> {
    /// Entry point for corrections from the refinement stage.
    ///
    /// The returned closure is invoked on the refinement thread while this
    /// stage may be mid-`process` on its own thread; it must only touch
    /// state that is synchronized or atomic.
    fn correction_target(&self) -> CorrectionTarget<T::Correction>;
}

/// Second stage of the mandatory chain, fed with decision points.
pub trait RefinementStage<T: Payloads>:
    Processor<Input = Arc<T::Estimate>, Output = T::Refined>
{
    /// Receive the side channel used to push corrections upstream.
    fn register_correction_callback(&mut self, edge: FeedbackEdge<T::Correction>);

    /// Receive the signal to raise on unrecoverable estimation failure.
    fn register_failure_callback(&mut self, signal: FailureSignal);
}

/// Output of either stage of the mandatory chain.
pub enum ChainOutput<T: Payloads> {
    Estimate(Arc<T::Estimate>),
    Refined(Arc<T::Refined>),
}

impl<T: Payloads> Clone for ChainOutput<T> {
    fn clone(&self) -> Self {
        match self {
            ChainOutput::Estimate(e) => ChainOutput::Estimate(Arc::clone(e)),
            ChainOutput::Refined(r) => ChainOutput::Refined(Arc::clone(r)),
        }
    }
}

/// Everything the visualizer subscribes to.
pub enum VizInput<T: Payloads> {
    Estimate(Arc<T::Estimate>),
    Refined(Arc<T::Refined>),
    Map(Arc<T::Map>),
}

impl<T: Payloads> Clone for VizInput<T> {
    fn clone(&self) -> Self {
        match self {
            VizInput::Estimate(e) => VizInput::Estimate(Arc::clone(e)),
            VizInput::Refined(r) => VizInput::Refined(Arc::clone(r)),
            VizInput::Map(m) => VizInput::Map(Arc::clone(m)),
        }
    }
}

pub type BoxedPrimary<T> = Box<dyn PrimaryStage<T>>;
pub type BoxedRefinement<T> = Box<dyn RefinementStage<T>>;
pub type MapStage<T> =
    Box<dyn Processor<Input = ChainOutput<T>, Output = <T as Payloads>::Map>>;
pub type RevisitStage<T> =
    Box<dyn Processor<Input = ChainOutput<T>, Output = <T as Payloads>::Revisit>>;
pub type VisualizerStage<T> =
    Box<dyn Processor<Input = VizInput<T>, Output = <T as Payloads>::Frame>>;
pub type DisplayStage<T> = Box<dyn Processor<Input = Arc<<T as Payloads>::Frame>, Output = ()>>;

/// Stage implementations for one pipeline.
///
/// Optional stages supplied here are only instantiated when the matching
/// toggle in [`StageToggles`](crate::config::StageToggles) is set.
pub struct Stages<T: Payloads> {
    pub primary: BoxedPrimary<T>,
    pub refinement: BoxedRefinement<T>,
    pub map: Option<MapStage<T>>,
    pub revisit: Option<RevisitStage<T>>,
    pub visualizer: Option<VisualizerStage<T>>,
    pub display: Option<DisplayStage<T>>,
}

impl<T: Payloads> Stages<T> {
    pub fn new(
        primary: impl PrimaryStage<T> + 'static,
        refinement: impl RefinementStage<T> + 'static,
    ) -> Self {
        Self {
            primary: Box::new(primary),
            refinement: Box::new(refinement),
            map: None,
            revisit: None,
            visualizer: None,
            display: None,
        }
    }

    pub fn with_map(
        mut self,
        map: impl Processor<Input = ChainOutput<T>, Output = T::Map>,
    ) -> Self {
        self.map = Some(Box::new(map));
        self
    }

    pub fn with_revisit(
        mut self,
        revisit: impl Processor<Input = ChainOutput<T>, Output = T::Revisit>,
    ) -> Self {
        self.revisit = Some(Box::new(revisit));
        self
    }

    /// Visualization always comes with its display sink.
    pub fn with_visualization(
        mut self,
        visualizer: impl Processor<Input = VizInput<T>, Output = T::Frame>,
        display: impl Processor<Input = Arc<T::Frame>, Output = ()>,
    ) -> Self {
        self.visualizer = Some(Box::new(visualizer));
        self.display = Some(Box::new(display));
        self
    }
}
