//! Active processing units.
//!
//! Two-layer design:
//! - **`Processor` trait**: what a stage implementation provides, a transform
//!   `Input -> Option<Output>` plus an optional shutdown hook.
//! - **`Module<P>`**: wraps a processor with its input queue, its ordered
//!   output subscribers and the `working`/`initialized` flags the
//!   orchestrator polls.
//!
//! `PipelineModule` erases the processor type so the orchestrator can hold
//! every stage in one list and drive them uniformly.

use crate::error::Result;
use crate::pipeline::callback::{CallbackRegistry, OutputCallback};
use crate::pipeline::queue::BoundedQueue;
use crate::pipeline::status::{ModuleStatus, QueueStatus};
use crate::types::{ModuleState, StageKind};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A stage's transform.
pub trait Processor: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + Sync + 'static;

    /// Transform one input. `None` means nothing is forwarded downstream.
    fn process(&mut self, input: Self::Input) -> Option<Self::Output>;

    /// Release stage-private resources. Called once per shutdown, after the
    /// last `process`.
    fn on_shutdown(&mut self) {}

    /// Reacquire what `on_shutdown` released. A resumed pipeline calls this
    /// before the stage sees input again.
    fn on_resume(&mut self) {}
}

impl<P: Processor + ?Sized> Processor for Box<P> {
    type Input = P::Input;
    type Output = P::Output;

    fn process(&mut self, input: Self::Input) -> Option<Self::Output> {
        (**self).process(input)
    }

    fn on_shutdown(&mut self) {
        (**self).on_shutdown()
    }

    fn on_resume(&mut self) {
        (**self).on_resume()
    }
}

/// Processor backed by a closure.
pub struct FnProcessor<I, O, F> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnProcessor<I, O, F>
where
    F: FnMut(I) -> Option<O>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<I, O, F> Processor for FnProcessor<I, O, F>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
    F: FnMut(I) -> Option<O> + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn process(&mut self, input: I) -> Option<O> {
        (self.f)(input)
    }
}

/// A processor bound to its input queue and output subscribers.
pub struct Module<P: Processor> {
    kind: StageKind,
    input: Arc<BoundedQueue<P::Input>>,
    processor: Mutex<P>,
    callbacks: CallbackRegistry<P::Output>,
    state: AtomicU8,
    working: AtomicBool,
    initialized: AtomicBool,
    stopped: AtomicBool,
    processed: AtomicU64,
    produced: AtomicU64,
}

impl<P: Processor> Module<P> {
    pub fn new(kind: StageKind, input: Arc<BoundedQueue<P::Input>>, processor: P) -> Self {
        Self {
            kind,
            input,
            processor: Mutex::new(processor),
            callbacks: CallbackRegistry::new(),
            state: AtomicU8::new(ModuleState::Created as u8),
            working: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            produced: AtomicU64::new(0),
        }
    }

    /// Subscribe to this module's output. Only possible before the module is
    /// shared, i.e. before any thread can run it.
    pub fn register_output_callback(&mut self, callback: OutputCallback<P::Output>) {
        self.callbacks.register(callback);
    }

    pub fn output_subscribers(&self) -> usize {
        self.callbacks.len()
    }

    pub fn input_queue(&self) -> &Arc<BoundedQueue<P::Input>> {
        &self.input
    }

    fn set_state(&self, state: ModuleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn mark_spinning(&self) {
        let _ = self.state.compare_exchange(
            ModuleState::Created as u8,
            ModuleState::Spinning as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Run one popped item through the processor and fan out the result.
    ///
    /// `working` has already been raised by the queue pop. Fan-out happens
    /// before `working` drops, so downstream queues count the outputs first.
    fn run_item(&self, input: P::Input) {
        let output = {
            let mut processor = self.processor.lock().unwrap_or_else(PoisonError::into_inner);
            processor.process(input)
        };
        self.processed.fetch_add(1, Ordering::Relaxed);

        if let Some(output) = output {
            self.initialized.store(true, Ordering::SeqCst);
            self.produced.fetch_add(1, Ordering::Relaxed);
            let output = Arc::new(output);
            self.callbacks.dispatch(&output);
        } else {
            tracing::trace!("{} produced no output", self.kind);
        }

        self.working.store(false, Ordering::SeqCst);
    }

    /// Blocking loop: pop, transform, fan out, until the input queue is shut
    /// down and drained.
    pub fn spin(&self) {
        self.mark_spinning();
        tracing::info!("{} module spinning", self.kind);

        while let Some(input) = self
            .input
            .pop_with(|| self.working.store(true, Ordering::SeqCst))
        {
            self.run_item(input);
        }

        tracing::info!("{} module input drained, leaving spin loop", self.kind);
        self.stop();
    }

    /// One non-blocking step. Returns `false` without side effects when the
    /// input queue is empty.
    pub fn spin_once(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.mark_spinning();
        match self
            .input
            .try_pop_with(|| self.working.store(true, Ordering::SeqCst))
        {
            Some(input) => {
                self.run_item(input);
                true
            }
            None => false,
        }
    }

    /// Shut down the input queue. An in-flight transform runs to completion;
    /// the spin loop exits once the queue is drained.
    pub fn shutdown(&self) {
        if self.state() != ModuleState::Stopped {
            self.set_state(ModuleState::ShuttingDown);
        }
        tracing::debug!("Shutting down {} module", self.kind);
        self.input.shutdown();
    }

    /// Run the processor's shutdown hook and mark the module stopped.
    ///
    /// Idempotent. Must not race a running `spin`; the orchestrator calls it
    /// only after the module's thread has been joined.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_shutdown();
        self.set_state(ModuleState::Stopped);
        tracing::debug!("{} module stopped", self.kind);
    }

    /// Return to `Created` with an active input queue. A stopped processor
    /// gets its `on_resume` hook first.
    pub fn resume(&self) -> Result<()> {
        self.input.resume()?;
        if self.stopped.swap(false, Ordering::SeqCst) {
            self.processor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_resume();
        }
        self.set_state(ModuleState::Created);
        Ok(())
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn state(&self) -> ModuleState {
        ModuleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Nothing queued (or queue shut down) and no transform in flight.
    ///
    /// The queue is checked first: a pop raises `working` before the item
    /// stops counting as outstanding, so it can never be missed between the
    /// two reads.
    pub fn is_idle(&self) -> bool {
        self.input.is_settled() && !self.is_working()
    }

    pub fn status(&self) -> ModuleStatus {
        ModuleStatus {
            stage: self.kind,
            state: self.state(),
            working: self.is_working(),
            initialized: self.is_initialized(),
            processed: self.processed.load(Ordering::Relaxed),
            produced: self.produced.load(Ordering::Relaxed),
            queue: QueueStatus::of(&self.input),
        }
    }
}

/// Type-erased view of a [`Module`] for the orchestrator.
pub trait PipelineModule: Send + Sync {
    fn kind(&self) -> StageKind;
    fn spin(&self);
    fn spin_once(&self) -> bool;
    fn shutdown(&self);
    fn stop(&self);
    fn resume(&self) -> Result<()>;
    fn state(&self) -> ModuleState;
    fn is_working(&self) -> bool;
    fn is_initialized(&self) -> bool;
    fn is_idle(&self) -> bool;
    fn status(&self) -> ModuleStatus;
}

impl<P: Processor> PipelineModule for Module<P> {
    fn kind(&self) -> StageKind {
        Module::kind(self)
    }

    fn spin(&self) {
        Module::spin(self)
    }

    fn spin_once(&self) -> bool {
        Module::spin_once(self)
    }

    fn shutdown(&self) {
        Module::shutdown(self)
    }

    fn stop(&self) {
        Module::stop(self)
    }

    fn resume(&self) -> Result<()> {
        Module::resume(self)
    }

    fn state(&self) -> ModuleState {
        Module::state(self)
    }

    fn is_working(&self) -> bool {
        Module::is_working(self)
    }

    fn is_initialized(&self) -> bool {
        Module::is_initialized(self)
    }

    fn is_idle(&self) -> bool {
        Module::is_idle(self)
    }

    fn status(&self) -> ModuleStatus {
        Module::status(self)
    }
}
