//! Test payloads, recording stages and a pipeline builder for integration tests

use crossbeam_channel::{bounded, Receiver, Sender};
use sensor_pipeline::pipeline::{
    ChainOutput, CorrectionTarget, FailureSignal, FeedbackEdge, PrimaryStage, RefinementStage,
    VizInput,
};
use sensor_pipeline::{
    Payloads, Pipeline, PipelineBuilder, PipelineConfig, Processor, StageKind, Stages,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Input item: `decision` marks a keyframe, `fail` makes refinement raise failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestInput {
    pub id: u32,
    pub decision: bool,
    pub fail: bool,
}

impl TestInput {
    pub fn keyframe(id: u32) -> Self {
        Self {
            id,
            decision: true,
            fail: false,
        }
    }

    pub fn skipped(id: u32) -> Self {
        Self {
            id,
            decision: false,
            fail: false,
        }
    }

    pub fn failing(id: u32) -> Self {
        Self {
            id,
            decision: true,
            fail: true,
        }
    }
}

pub struct TestPayloads;

impl Payloads for TestPayloads {
    type Input = TestInput;
    type Estimate = TestInput;
    type Refined = u32;
    type Map = String;
    type Revisit = String;
    type Frame = String;
    type Correction = u32;

    fn is_decision_point(estimate: &TestInput) -> bool {
        estimate.decision
    }
}

/// Shared log of every stage invocation, in invocation order
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(StageKind, String)>>>,
    corrections: Arc<Mutex<Vec<u32>>>,
}

impl Recorder {
    pub fn record(&self, stage: StageKind, label: impl Into<String>) {
        self.events.lock().unwrap().push((stage, label.into()));
    }

    pub fn events(&self) -> Vec<(StageKind, String)> {
        self.events.lock().unwrap().clone()
    }

    /// Labels recorded by one stage, in order
    pub fn stage(&self, stage: StageKind) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, label)| label.clone())
            .collect()
    }

    pub fn count(&self, stage: StageKind) -> usize {
        self.stage(stage).len()
    }

    /// Corrections received by the primary stage
    pub fn corrections(&self) -> Vec<u32> {
        self.corrections.lock().unwrap().clone()
    }
}

/// Blocks a stage inside its transform until released
pub struct Gate {
    entered_tx: Sender<u32>,
    release_rx: Receiver<()>,
}

impl Gate {
    fn pass(&self, id: u32) {
        let _ = self.entered_tx.send(id);
        let _ = self.release_rx.recv();
    }
}

/// Test-side handle of a [`Gate`]
#[derive(Clone)]
pub struct GateControl {
    entered_rx: Receiver<u32>,
    release_tx: Sender<()>,
}

impl GateControl {
    /// Wait until the gated stage is inside its transform
    pub fn wait_entered(&self, timeout: Duration) -> Option<u32> {
        self.entered_rx.recv_timeout(timeout).ok()
    }

    /// Let one gated transform finish
    pub fn release(&self) {
        let _ = self.release_tx.send(());
    }
}

pub fn gate() -> (Gate, GateControl) {
    let (entered_tx, entered_rx) = bounded(16);
    let (release_tx, release_rx) = bounded(16);
    (
        Gate {
            entered_tx,
            release_rx,
        },
        GateControl {
            entered_rx,
            release_tx,
        },
    )
}

pub struct RecordingPrimary {
    recorder: Recorder,
}

impl Processor for RecordingPrimary {
    type Input = TestInput;
    type Output = TestInput;

    fn process(&mut self, input: TestInput) -> Option<TestInput> {
        self.recorder
            .record(StageKind::PrimaryEstimation, input.id.to_string());
        Some(input)
    }
}

impl PrimaryStage<TestPayloads> for RecordingPrimary {
    fn correction_target(&self) -> CorrectionTarget<u32> {
        let corrections = Arc::clone(&self.recorder.corrections);
        Arc::new(move |id: &u32| corrections.lock().unwrap().push(*id))
    }
}

pub struct RecordingRefinement {
    recorder: Recorder,
    gate: Option<Gate>,
    edge: Option<FeedbackEdge<u32>>,
    failure: Option<FailureSignal>,
}

impl Processor for RecordingRefinement {
    type Input = Arc<TestInput>;
    type Output = u32;

    fn process(&mut self, input: Arc<TestInput>) -> Option<u32> {
        if let Some(gate) = &self.gate {
            gate.pass(input.id);
        }
        self.recorder
            .record(StageKind::Refinement, input.id.to_string());
        if input.fail {
            if let Some(failure) = &self.failure {
                failure.raise();
            }
            return None;
        }
        if let Some(edge) = &self.edge {
            edge.send(&input.id);
        }
        Some(input.id)
    }
}

impl RefinementStage<TestPayloads> for RecordingRefinement {
    fn register_correction_callback(&mut self, edge: FeedbackEdge<u32>) {
        self.edge = Some(edge);
    }

    fn register_failure_callback(&mut self, signal: FailureSignal) {
        self.failure = Some(signal);
    }
}

fn chain_label(input: &ChainOutput<TestPayloads>) -> String {
    match input {
        ChainOutput::Estimate(e) => format!("E{}", e.id),
        ChainOutput::Refined(r) => format!("R{}", r),
    }
}

pub struct RecordingChainStage {
    recorder: Recorder,
    stage: StageKind,
}

impl Processor for RecordingChainStage {
    type Input = ChainOutput<TestPayloads>;
    type Output = String;

    fn process(&mut self, input: ChainOutput<TestPayloads>) -> Option<String> {
        let label = chain_label(&input);
        self.recorder.record(self.stage, label.clone());
        Some(label)
    }
}

pub struct RecordingVisualizer {
    recorder: Recorder,
}

impl Processor for RecordingVisualizer {
    type Input = VizInput<TestPayloads>;
    type Output = String;

    fn process(&mut self, input: VizInput<TestPayloads>) -> Option<String> {
        let label = match input {
            VizInput::Estimate(e) => format!("E{}", e.id),
            VizInput::Refined(r) => format!("R{}", r),
            VizInput::Map(m) => format!("M{}", m),
        };
        self.recorder.record(StageKind::Visualization, label.clone());
        Some(format!("frame:{}", label))
    }
}

pub struct RecordingDisplay {
    recorder: Recorder,
}

impl Processor for RecordingDisplay {
    type Input = Arc<String>;
    type Output = ();

    fn process(&mut self, frame: Arc<String>) -> Option<()> {
        self.recorder.record(StageKind::Display, frame.as_str());
        Some(())
    }
}

/// Builder for recording test pipelines
pub struct TestPipelineBuilder {
    config: PipelineConfig,
    refinement_gate: Option<Gate>,
}

impl TestPipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            refinement_gate: None,
        }
    }

    pub fn sequential() -> Self {
        Self::new(PipelineConfig::sequential())
    }

    pub fn parallel() -> Self {
        let mut config = PipelineConfig::parallel();
        config.shutdown.poll_interval_ms = 5;
        config.queues.push_timeout_ms = 10;
        Self::new(config)
    }

    pub fn all_stages(mut self) -> Self {
        self.config = self.config.with_all_stages();
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.queues.capacity = capacity;
        self
    }

    pub fn gate_refinement(mut self, gate: Gate) -> Self {
        self.refinement_gate = Some(gate);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stages(self, recorder: &Recorder) -> (PipelineConfig, Stages<TestPayloads>) {
        let stages = Stages::new(
            RecordingPrimary {
                recorder: recorder.clone(),
            },
            RecordingRefinement {
                recorder: recorder.clone(),
                gate: self.refinement_gate,
                edge: None,
                failure: None,
            },
        )
        .with_map(RecordingChainStage {
            recorder: recorder.clone(),
            stage: StageKind::MapReconstruction,
        })
        .with_revisit(RecordingChainStage {
            recorder: recorder.clone(),
            stage: StageKind::RevisitDetection,
        })
        .with_visualization(
            RecordingVisualizer {
                recorder: recorder.clone(),
            },
            RecordingDisplay {
                recorder: recorder.clone(),
            },
        );
        (self.config, stages)
    }

    pub fn builder(self, recorder: &Recorder) -> PipelineBuilder<TestPayloads> {
        let (config, stages) = self.stages(recorder);
        PipelineBuilder::new(config, stages)
    }

    pub fn build(self) -> (Pipeline<TestPayloads>, Recorder) {
        let recorder = Recorder::default();
        let pipeline = self
            .builder(&recorder)
            .build()
            .expect("test pipeline should build");
        (pipeline, recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_filters_by_stage() {
        let recorder = Recorder::default();
        recorder.record(StageKind::PrimaryEstimation, "1");
        recorder.record(StageKind::Refinement, "1");
        recorder.record(StageKind::PrimaryEstimation, "2");
        assert_eq!(recorder.stage(StageKind::PrimaryEstimation), vec!["1", "2"]);
        assert_eq!(recorder.count(StageKind::Refinement), 1);
    }
}
