//! Pipeline construction, thread lifecycle and the shutdown/drain protocol.
//!
//! # Main Types
//!
//! - [`PipelineBuilder`] - instantiates the enabled stages and wires them
//! - [`Pipeline`] - owns the modules and their threads, drives shutdown
//!
//! # Wiring
//!
//! ```text
//!              ┌──(decision points)──► [Refinement] ──┬──► [Map] ──► [Visualizer] ──► [Display]
//! [Primary] ───┤                          │  ▲         ├──► [Visualizer]
//!              ├──► [Map]                 │  │         └──► [Revisit]
//!              ├──► [Visualizer]          └──┘ correction side channel
//!              └──► [Revisit]                  (refinement → primary)
//! ```
//!
//! Subscribers of one producer are served in the order listed above; external
//! subscribers registered on the builder come last.
//!
//! # Execution modes
//!
//! - **Parallel**: one named thread per enabled stage. Inter-stage delivery
//!   uses `push_blocking`, so a full queue stalls its producer.
//! - **Sequential**: no threads. Every injection pushes to the head queue and
//!   steps each stage once in topological order. A producer that finds a
//!   downstream queue full runs that consumer inline until there is room,
//!   since a blocking push could never be drained by the thread that is
//!   blocked. Queues never exceed their capacity in either mode.

use crate::config::{ExecutionMode, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::pipeline::callback::OutputCallback;
use crate::pipeline::feedback::{FailureSignal, FeedbackEdge};
use crate::pipeline::module::{Module, PipelineModule, Processor};
use crate::pipeline::queue::BoundedQueue;
use crate::pipeline::source::{DataSource, InputHandle};
use crate::pipeline::stages::{ChainOutput, Payloads, Stages, VizInput};
use crate::pipeline::status::PipelineStatus;
use crate::types::{PipelineState, StageKind};
use crossbeam_channel::TrySendError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type ShutdownHook = Box<dyn Fn() + Send + Sync>;

/// How a producer hands an item to a downstream queue.
#[derive(Debug, Clone, Copy)]
struct Delivery {
    parallel: bool,
    timeout: Duration,
}

impl Delivery {
    fn send<P: Processor>(self, target: &Arc<Module<P>>, item: P::Input) -> bool {
        if self.parallel {
            return target.input_queue().push_blocking(item, self.timeout);
        }

        // Single thread: make room by running the consumer now.
        let mut item = item;
        loop {
            match target.input_queue().try_push(item) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    if !target.spin_once() {
                        tracing::warn!(
                            "{} queue is full and not draining, discarding item",
                            target.kind()
                        );
                        return false;
                    }
                    item = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

/// External subscribers appended after the internal edges.
struct ExternalCallbacks<T: Payloads> {
    estimate: Vec<OutputCallback<T::Estimate>>,
    refined: Vec<OutputCallback<T::Refined>>,
    map: Vec<OutputCallback<T::Map>>,
    revisit: Vec<OutputCallback<T::Revisit>>,
    frame: Vec<OutputCallback<T::Frame>>,
}

impl<T: Payloads> Default for ExternalCallbacks<T> {
    fn default() -> Self {
        Self {
            estimate: Vec::new(),
            refined: Vec::new(),
            map: Vec::new(),
            revisit: Vec::new(),
            frame: Vec::new(),
        }
    }
}

/// Builds a [`Pipeline`] from a configuration and stage implementations.
pub struct PipelineBuilder<T: Payloads> {
    config: PipelineConfig,
    stages: Stages<T>,
    external: ExternalCallbacks<T>,
}

impl<T: Payloads> PipelineBuilder<T> {
    pub fn new(config: PipelineConfig, stages: Stages<T>) -> Self {
        Self {
            config,
            stages,
            external: ExternalCallbacks::default(),
        }
    }

    /// Subscribe to every primary-estimation output.
    pub fn on_estimate(
        mut self,
        callback: impl Fn(&Arc<T::Estimate>) + Send + Sync + 'static,
    ) -> Self {
        self.external.estimate.push(Box::new(callback));
        self
    }

    /// Subscribe to every refinement output.
    pub fn on_refined(
        mut self,
        callback: impl Fn(&Arc<T::Refined>) + Send + Sync + 'static,
    ) -> Self {
        self.external.refined.push(Box::new(callback));
        self
    }

    /// Subscribe to map-reconstruction output. Ignored if the stage is disabled.
    pub fn on_map(
        mut self,
        callback: impl Fn(&Arc<T::Map>) + Send + Sync + 'static,
    ) -> Self {
        self.external.map.push(Box::new(callback));
        self
    }

    /// Subscribe to revisit-detection output. Ignored if the stage is disabled.
    pub fn on_revisit(
        mut self,
        callback: impl Fn(&Arc<T::Revisit>) + Send + Sync + 'static,
    ) -> Self {
        self.external.revisit.push(Box::new(callback));
        self
    }

    /// Subscribe to visualizer frames, after the display stage. Ignored if
    /// visualization is disabled.
    pub fn on_frame(
        mut self,
        callback: impl Fn(&Arc<T::Frame>) + Send + Sync + 'static,
    ) -> Self {
        self.external.frame.push(Box::new(callback));
        self
    }

    /// Instantiate and wire every enabled stage.
    ///
    /// Fails if the configuration is invalid or an enabled stage has no
    /// implementation.
    pub fn build(self) -> Result<Pipeline<T>> {
        let Self {
            config,
            stages,
            external,
        } = self;
        config.validate()?;

        let Stages {
            primary,
            mut refinement,
            map,
            revisit,
            visualizer,
            display,
        } = stages;

        let map = enabled_stage(config.stages.map, StageKind::MapReconstruction, map)?;
        let revisit = enabled_stage(
            config.stages.revisit,
            StageKind::RevisitDetection,
            revisit,
        )?;
        let visualizer = enabled_stage(
            config.stages.visualize,
            StageKind::Visualization,
            visualizer,
        )?;
        let display = enabled_stage(config.stages.visualize, StageKind::Display, display)?;

        let delivery = Delivery {
            parallel: config.execution.is_parallel(),
            timeout: config.queues.push_timeout(),
        };
        let capacity = config.queues.capacity;

        // Side channels, set up before the stages move into their modules.
        let feedback = FeedbackEdge::new("bias-update", primary.correction_target());
        let failure = FailureSignal::new();
        refinement.register_correction_callback(feedback.clone());
        refinement.register_failure_callback(failure.clone());

        let mut primary = new_module(StageKind::PrimaryEstimation, capacity, primary);
        let mut refinement = new_module(StageKind::Refinement, capacity, refinement);
        let mut map = map.map(|stage| new_module(StageKind::MapReconstruction, capacity, stage));
        let mut revisit =
            revisit.map(|stage| new_module(StageKind::RevisitDetection, capacity, stage));
        let mut visualizer =
            visualizer.map(|stage| new_module(StageKind::Visualization, capacity, stage));
        let display = display.map(|stage| new_module(StageKind::Display, capacity, stage));

        // Consumers are shared before their producers so a sequential
        // producer can run a full consumer inline. Wire from the sink up.
        let display = display.map(share);

        if let (Some(visualizer), Some(display)) = (visualizer.as_mut(), &display) {
            let display = Arc::clone(display);
            visualizer.register_output_callback(Box::new(move |frame: &Arc<T::Frame>| {
                delivery.send(&display, Arc::clone(frame));
            }));
        }
        attach_external(visualizer.as_mut(), external.frame, StageKind::Visualization);
        let visualizer = visualizer.map(share);

        if let (Some(map), Some(visualizer)) = (map.as_mut(), &visualizer) {
            let visualizer = Arc::clone(visualizer);
            map.register_output_callback(Box::new(move |map_output: &Arc<T::Map>| {
                delivery.send(&visualizer, VizInput::Map(Arc::clone(map_output)));
            }));
        }
        attach_external(map.as_mut(), external.map, StageKind::MapReconstruction);
        let map = map.map(share);

        attach_external(revisit.as_mut(), external.revisit, StageKind::RevisitDetection);
        let revisit = revisit.map(share);

        if let Some(map) = &map {
            let map = Arc::clone(map);
            refinement.register_output_callback(Box::new(move |refined: &Arc<T::Refined>| {
                delivery.send(&map, ChainOutput::Refined(Arc::clone(refined)));
            }));
        }
        if let Some(visualizer) = &visualizer {
            let visualizer = Arc::clone(visualizer);
            refinement.register_output_callback(Box::new(move |refined: &Arc<T::Refined>| {
                delivery.send(&visualizer, VizInput::Refined(Arc::clone(refined)));
            }));
        }
        if let Some(revisit) = &revisit {
            let revisit = Arc::clone(revisit);
            refinement.register_output_callback(Box::new(move |refined: &Arc<T::Refined>| {
                delivery.send(&revisit, ChainOutput::Refined(Arc::clone(refined)));
            }));
        }
        for callback in external.refined {
            refinement.register_output_callback(callback);
        }
        let refinement = share(refinement);

        // primary → refinement, decision points only
        {
            let refinement = Arc::clone(&refinement);
            primary.register_output_callback(Box::new(move |estimate: &Arc<T::Estimate>| {
                if T::is_decision_point(estimate) {
                    delivery.send(&refinement, Arc::clone(estimate));
                }
            }));
        }
        if let Some(map) = &map {
            let map = Arc::clone(map);
            primary.register_output_callback(Box::new(move |estimate: &Arc<T::Estimate>| {
                delivery.send(&map, ChainOutput::Estimate(Arc::clone(estimate)));
            }));
        }
        if let Some(visualizer) = &visualizer {
            let visualizer = Arc::clone(visualizer);
            primary.register_output_callback(Box::new(move |estimate: &Arc<T::Estimate>| {
                delivery.send(&visualizer, VizInput::Estimate(Arc::clone(estimate)));
            }));
        }
        if let Some(revisit) = &revisit {
            let revisit = Arc::clone(revisit);
            primary.register_output_callback(Box::new(move |estimate: &Arc<T::Estimate>| {
                delivery.send(&revisit, ChainOutput::Estimate(Arc::clone(estimate)));
            }));
        }
        for callback in external.estimate {
            primary.register_output_callback(callback);
        }
        let primary = share(primary);

        let head = Arc::clone(primary.input_queue());

        // Topological order; also the sequential stepping order.
        let mut modules: Vec<Arc<dyn PipelineModule>> = Vec::with_capacity(StageKind::ALL.len());
        modules.push(primary);
        modules.push(refinement);
        if let Some(map) = map {
            modules.push(map);
        }
        if let Some(revisit) = revisit {
            modules.push(revisit);
        }
        if let Some(visualizer) = visualizer {
            modules.push(visualizer);
        }
        if let Some(display) = display {
            modules.push(display);
        }

        tracing::info!(
            "Built {} pipeline with stages: {}",
            config.execution,
            modules
                .iter()
                .map(|m| m.kind().name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let shared = Arc::new(Shared {
            mode: config.execution,
            delivery,
            config,
            state: AtomicU8::new(PipelineState::Built as u8),
            head,
            modules,
            feedback,
            failure,
            shutdown_hook: Mutex::new(None),
            data_source: Mutex::new(None),
        });

        Ok(Pipeline {
            shared,
            threads: Mutex::new(Vec::new()),
        })
    }
}

fn enabled_stage<S>(enabled: bool, kind: StageKind, stage: Option<S>) -> Result<Option<S>> {
    match (enabled, stage) {
        (true, Some(stage)) => Ok(Some(stage)),
        (true, None) => Err(PipelineError::MissingStage(kind.name())),
        (false, Some(_)) => {
            tracing::debug!("Stage {} supplied but disabled, dropping it", kind);
            Ok(None)
        }
        (false, None) => Ok(None),
    }
}

fn new_module<P: Processor>(kind: StageKind, capacity: usize, processor: P) -> Module<P> {
    Module::new(
        kind,
        Arc::new(BoundedQueue::new(kind.queue_name(), capacity)),
        processor,
    )
}

/// Freeze a fully wired module for sharing between threads.
fn share<P: Processor>(module: Module<P>) -> Arc<Module<P>> {
    tracing::debug!(
        "{} wired to {} subscriber(s)",
        module.kind(),
        module.output_subscribers()
    );
    Arc::new(module)
}

fn attach_external<P: Processor>(
    module: Option<&mut Module<P>>,
    callbacks: Vec<OutputCallback<P::Output>>,
    kind: StageKind,
) {
    match module {
        Some(module) => {
            for callback in callbacks {
                module.register_output_callback(callback);
            }
        }
        None if !callbacks.is_empty() => {
            tracing::warn!(
                "{} subscriber(s) registered for disabled stage {}",
                callbacks.len(),
                kind
            );
        }
        None => {}
    }
}

/// State shared between the [`Pipeline`] and its [`InputHandle`]s.
pub(crate) struct Shared<T: Payloads> {
    config: PipelineConfig,
    mode: ExecutionMode,
    delivery: Delivery,
    state: AtomicU8,
    head: Arc<BoundedQueue<T::Input>>,
    modules: Vec<Arc<dyn PipelineModule>>,
    feedback: FeedbackEdge<T::Correction>,
    failure: FailureSignal,
    shutdown_hook: Mutex<Option<ShutdownHook>>,
    data_source: Mutex<Option<Arc<dyn DataSource>>>,
}

impl<T: Payloads> Shared<T> {
    pub(crate) fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Running, or built in sequential mode (stepping needs no threads).
    pub(crate) fn accepts_input(&self) -> bool {
        match self.state() {
            PipelineState::Running => true,
            PipelineState::Built => !self.delivery.parallel,
            PipelineState::ShuttingDown | PipelineState::ShutDown => false,
        }
    }

    pub(crate) fn inject_input(&self, item: T::Input) -> bool {
        let state = self.state();
        if state.is_shutting_down_or_down() {
            tracing::warn!("Pipeline is {}, rejecting injected input", state);
            return false;
        }

        if self.delivery.parallel {
            // Nothing pops the head queue before launch; a blocking push
            // would wait forever once it fills.
            if state != PipelineState::Running {
                tracing::warn!("Pipeline is {}, not launched; rejecting injected input", state);
                return false;
            }
            return self.head.push_blocking(item, self.delivery.timeout);
        }

        // Make room by draining instead of blocking the only thread.
        let mut item = item;
        loop {
            match self.head.try_push(item) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    if !self.step() {
                        tracing::warn!("Head queue is full and not draining, rejecting input");
                        return false;
                    }
                    item = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
        self.step();
        true
    }

    /// One non-blocking step of every enabled stage, in topological order.
    fn step(&self) -> bool {
        let mut progressed = false;
        for module in &self.modules {
            progressed |= module.spin_once();
        }
        progressed
    }

    fn data_source(&self) -> Option<Arc<dyn DataSource>> {
        self.data_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// No module working and every queue empty or shut down.
    ///
    /// Modules are checked in topological order so that an item can only
    /// move from an already-checked stage to a not-yet-checked one.
    fn is_quiescent(&self) -> bool {
        if self.data_source().is_some_and(|source| source.is_working()) {
            return false;
        }
        if self.config.shutdown.wait_for_initialization && !self.is_initialized() {
            return false;
        }
        self.modules.iter().all(|module| module.is_idle())
    }

    fn module(&self, kind: StageKind) -> Option<&Arc<dyn PipelineModule>> {
        self.modules.iter().find(|module| module.kind() == kind)
    }

    fn is_initialized(&self) -> bool {
        self.modules
            .iter()
            .filter(|module| module.kind().is_mandatory())
            .all(|module| module.is_initialized())
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            state: self.state(),
            mode: self.mode,
            failed: self.failure.is_raised(),
            initialized: self.is_initialized(),
            modules: self.modules.iter().map(|m| m.status()).collect(),
            feedback_deliveries: self.feedback.deliveries(),
        }
    }
}

/// The orchestrator: owns every module, queue and stage thread.
pub struct Pipeline<T: Payloads> {
    shared: Arc<Shared<T>>,
    threads: Mutex<Vec<(StageKind, Option<JoinHandle<()>>)>>,
}

impl<T: Payloads> Pipeline<T> {
    pub fn builder(config: PipelineConfig, stages: Stages<T>) -> PipelineBuilder<T> {
        PipelineBuilder::new(config, stages)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn is_shut_down(&self) -> bool {
        self.state() == PipelineState::ShutDown
    }

    /// Start the stages. Spawns one thread per enabled stage in parallel
    /// mode, nothing in sequential mode.
    pub fn launch(&self) -> Result<()> {
        if !self.shared.transition(PipelineState::Built, PipelineState::Running) {
            return Err(PipelineError::InvalidState {
                operation: "launch",
                state: self.state(),
            });
        }

        if !self.shared.delivery.parallel {
            tracing::info!("Pipeline modules running in sequential mode");
            return Ok(());
        }

        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.clear();
        for module in &self.shared.modules {
            let kind = module.kind();
            let worker = Arc::clone(module);
            let handle = thread::Builder::new()
                .name(kind.name().to_string())
                .spawn(move || worker.spin())
                .map_err(|source| {
                    tracing::error!("Failed to spawn {} thread: {}", kind, source);
                    PipelineError::Spawn {
                        stage: kind.name(),
                        source,
                    }
                })?;
            threads.push((kind, Some(handle)));
        }
        tracing::info!("Pipeline modules launched ({} threads)", threads.len());
        Ok(())
    }

    /// Feed one input to the head-of-chain queue.
    ///
    /// Blocks under backpressure in parallel mode. In sequential mode, steps
    /// every stage once after the push. Returns `false` if the input was
    /// rejected: the pipeline is shutting down, or it is parallel and has
    /// not been launched.
    pub fn inject_input(&self, item: T::Input) -> bool {
        self.shared.inject_input(item)
    }

    /// One sequential pass over all enabled stages. Returns whether any stage
    /// processed an item. A no-op in parallel mode.
    pub fn step(&self) -> bool {
        if self.shared.delivery.parallel {
            tracing::warn!("step() called on a parallel pipeline, ignoring");
            return false;
        }
        self.shared.step()
    }

    /// Wait until the graph is idle or a failure is raised, then shut down.
    ///
    /// Returns `true` once shut down. In sequential mode, returns `false`
    /// right away if there is still work, so the caller can keep stepping:
    ///
    /// ```ignore
    /// while !pipeline.shutdown_when_finished(poll) {
    ///     pipeline.step();
    /// }
    /// ```
    pub fn shutdown_when_finished(&self, poll_interval: Duration) -> bool {
        tracing::info!("Shutting down pipeline once processing has finished");
        loop {
            let state = self.state();
            if state.is_shutting_down_or_down() {
                tracing::debug!("Pipeline already {}", state);
                return true;
            }
            if self.has_failed() {
                tracing::warn!("Shutting down pipeline, reason: refinement stage failure");
                break;
            }
            if self.shared.is_quiescent() {
                tracing::info!(
                    "Shutting down pipeline, reason: input is empty and modules are idle"
                );
                break;
            }

            let status = self.shared.status();
            tracing::debug!(
                "Pipeline not finished: initialized={}, queued={}, working=[{}]",
                status.initialized,
                status.queued_items(),
                status
                    .modules
                    .iter()
                    .filter(|m| m.working)
                    .map(|m| m.stage.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            if !self.shared.delivery.parallel {
                return false;
            }
            thread::sleep(poll_interval);
        }

        self.shutdown();
        true
    }

    /// Stop the data source, shut every queue down in consumer-before-producer
    /// order and join the stage threads. Idempotent.
    pub fn shutdown(&self) {
        let previous = loop {
            let state = self.state();
            if state.is_shutting_down_or_down() {
                tracing::error!("Shutdown requested, but pipeline was already {}", state);
                return;
            }
            if self.shared.transition(state, PipelineState::ShuttingDown) {
                break state;
            }
        };
        tracing::info!("Shutting down pipeline (was {})", previous);

        if let Some(hook) = self
            .shared
            .shutdown_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            tracing::info!("Calling registered shutdown hook");
            hook();
        }

        if let Some(source) = self.shared.data_source() {
            source.shutdown();
        }

        for kind in StageKind::SHUTDOWN_ORDER {
            if let Some(module) = self.shared.module(kind) {
                module.shutdown();
            }
        }

        self.join_threads();

        for module in &self.shared.modules {
            module.stop();
        }

        self.shared.set_state(PipelineState::ShutDown);
        tracing::info!("Pipeline shut down");
    }

    fn join_threads(&self) {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        for kind in StageKind::SHUTDOWN_ORDER {
            if self.shared.module(kind).is_none() {
                continue;
            }
            let handle = threads
                .iter_mut()
                .find(|(k, _)| *k == kind)
                .and_then(|(_, handle)| handle.take());
            match handle {
                Some(handle) => {
                    if handle.join().is_err() {
                        tracing::error!("{} thread panicked", kind);
                    } else {
                        tracing::debug!("Joined {} thread", kind);
                    }
                }
                None if self.shared.delivery.parallel => {
                    tracing::warn!("No {} thread to join", kind);
                }
                None => {}
            }
        }
        threads.clear();
    }

    /// Raise the sticky failure flag. Does not shut down by itself.
    pub fn on_failure(&self) {
        self.shared.failure.raise();
    }

    pub fn has_failed(&self) -> bool {
        self.shared.failure.is_raised()
    }

    /// The signal the refinement stage raises, for other failure reporters.
    pub fn failure_signal(&self) -> FailureSignal {
        self.shared.failure.clone()
    }

    /// Reactivate a shut-down pipeline so it can be launched again.
    ///
    /// Every queue is reactivated and every module returns to `Created`. The
    /// failure flag is not cleared.
    pub fn resume(&self) -> Result<()> {
        let state = self.state();
        if state != PipelineState::ShutDown {
            return Err(PipelineError::InvalidState {
                operation: "resume",
                state,
            });
        }

        tracing::info!("Restarting pipeline workers and queues");
        for module in &self.shared.modules {
            module.resume()?;
        }
        self.shared.set_state(PipelineState::Built);
        Ok(())
    }

    /// Both stages of the mandatory chain have produced output.
    pub fn is_initialized(&self) -> bool {
        self.shared.is_initialized()
    }

    pub fn status(&self) -> PipelineStatus {
        self.shared.status()
    }

    /// Called first during shutdown, typically to tell the data source to
    /// stop. Replaces any previous hook.
    pub fn register_shutdown_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .shared
            .shutdown_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Register the source feeding this pipeline.
    pub fn register_data_source(&self, source: Arc<dyn DataSource>) {
        *self
            .shared
            .data_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(source);
    }

    pub fn input_handle(&self) -> InputHandle<T> {
        InputHandle::new(Arc::clone(&self.shared))
    }
}

impl<T: Payloads> Drop for Pipeline<T> {
    fn drop(&mut self) {
        if !self.state().is_shutting_down_or_down() {
            self.shutdown();
        }
        // Break handle cycles through the source and hook.
        self.shared
            .data_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shared
            .shutdown_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
