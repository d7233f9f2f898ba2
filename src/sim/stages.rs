//! Reference stage implementations for [`SimPayloads`](super::SimPayloads).

use super::{
    BiasCorrection, Frame, MapUpdate, OdometryPacket, Pose2, PoseEstimate, RefinedPose, Revisit,
    SimPayloads,
};
use crate::numerical::{current_time_secs, nsec_to_sec, round_to_digit};
use crate::pipeline::{
    ChainOutput, CorrectionTarget, FailureSignal, FeedbackEdge, PrimaryStage, Processor,
    RefinementStage, VizInput,
};
use crate::types::Timestamp;
use std::collections::{HashSet, VecDeque};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wrap an angle into `[-pi, pi)`.
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Integrates speed and bias-corrected yaw rate into a planar pose.
///
/// The gyro bias lives in an atomic so corrections can land from the
/// refinement thread while a packet is being integrated.
pub struct DeadReckoning {
    keyframe_interval: u64,
    pose: Pose2,
    last_timestamp: Option<Timestamp>,
    packets: u64,
    bias_bits: Arc<AtomicU64>,
}

impl DeadReckoning {
    pub fn new(keyframe_interval: u64) -> Self {
        Self {
            keyframe_interval: keyframe_interval.max(1),
            pose: Pose2::default(),
            last_timestamp: None,
            packets: 0,
            bias_bits: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    /// Bias currently subtracted from the gyro.
    pub fn bias(&self) -> f64 {
        f64::from_bits(self.bias_bits.load(Ordering::Acquire))
    }
}

impl Processor for DeadReckoning {
    type Input = OdometryPacket;
    type Output = PoseEstimate;

    fn process(&mut self, packet: OdometryPacket) -> Option<PoseEstimate> {
        let bias = self.bias();

        match self.last_timestamp {
            None => {
                // Anchor the heading on the first absolute fix.
                self.pose.heading = packet.heading_fix;
            }
            Some(last) if packet.timestamp <= last => {
                tracing::warn!(
                    "Dropping out-of-order packet {} ({} <= {})",
                    packet.seq,
                    packet.timestamp,
                    last
                );
                return None;
            }
            Some(last) => {
                let dt = nsec_to_sec(packet.timestamp - last);
                self.pose.heading = wrap_angle(self.pose.heading + (packet.yaw_rate - bias) * dt);
                self.pose.x += packet.speed * self.pose.heading.cos() * dt;
                self.pose.y += packet.speed * self.pose.heading.sin() * dt;
            }
        }

        self.last_timestamp = Some(packet.timestamp);
        self.packets += 1;

        Some(PoseEstimate {
            seq: packet.seq,
            timestamp: packet.timestamp,
            pose: self.pose,
            heading_fix: packet.heading_fix,
            applied_bias: bias,
            keyframe: self.packets % self.keyframe_interval == 0,
        })
    }
}

impl PrimaryStage<SimPayloads> for DeadReckoning {
    fn correction_target(&self) -> CorrectionTarget<BiasCorrection> {
        let bias_bits = Arc::clone(&self.bias_bits);
        Arc::new(move |correction: &BiasCorrection| {
            bias_bits.store(correction.yaw_rate_bias.to_bits(), Ordering::Release);
        })
    }
}

/// Fits heading drift over a sliding window of keyframes.
///
/// The residual between the integrated heading and the heading fix grows
/// linearly with the uncorrected gyro bias; its least-squares slope over a
/// full window is added to the bias and sent upstream, then the window
/// restarts from its newest keyframe.
pub struct WindowRefinement {
    window_size: usize,
    window: VecDeque<(f64, f64)>,
    bias: f64,
    correction: Option<FeedbackEdge<BiasCorrection>>,
    failure: Option<FailureSignal>,
}

impl WindowRefinement {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(2),
            window: VecDeque::new(),
            bias: 0.0,
            correction: None,
            failure: None,
        }
    }

    fn fail(&self, seq: u64, reason: &str) {
        tracing::error!("Refinement failed at keyframe {}: {}", seq, reason);
        if let Some(failure) = &self.failure {
            failure.raise();
        }
    }

    fn drift_rate(&self) -> Option<f64> {
        let n = self.window.len() as f64;
        let mean_t = self.window.iter().map(|(t, _)| t).sum::<f64>() / n;
        let mean_r = self.window.iter().map(|(_, r)| r).sum::<f64>() / n;
        let (mut cov, mut var) = (0.0, 0.0);
        for (t, r) in &self.window {
            cov += (t - mean_t) * (r - mean_r);
            var += (t - mean_t) * (t - mean_t);
        }
        (var > f64::EPSILON).then(|| cov / var)
    }
}

impl Processor for WindowRefinement {
    type Input = Arc<PoseEstimate>;
    type Output = RefinedPose;

    fn process(&mut self, estimate: Arc<PoseEstimate>) -> Option<RefinedPose> {
        if !estimate.pose.is_finite() || !estimate.heading_fix.is_finite() {
            self.fail(estimate.seq, "non-finite pose");
            return None;
        }

        let t = nsec_to_sec(estimate.timestamp);
        let residual = wrap_angle(estimate.pose.heading - estimate.heading_fix);
        self.window.push_back((t, residual));

        let window = self.window.len();
        if window >= self.window_size {
            if let Some(drift) = self.drift_rate() {
                let bias = estimate.applied_bias + drift;
                if !bias.is_finite() {
                    self.fail(estimate.seq, "non-finite bias");
                    return None;
                }
                self.bias = bias;
                if let Some(edge) = &self.correction {
                    edge.send(&BiasCorrection {
                        yaw_rate_bias: bias,
                    });
                }
                tracing::debug!("Keyframe {}: gyro bias now {:.5} rad/s", estimate.seq, bias);
            }
            let newest = self.window.pop_back();
            self.window.clear();
            self.window.extend(newest);
        }

        let mut pose = estimate.pose;
        pose.heading = wrap_angle(estimate.heading_fix + 0.5 * residual);

        Some(RefinedPose {
            seq: estimate.seq,
            timestamp: estimate.timestamp,
            pose,
            bias: self.bias,
            window,
        })
    }
}

impl RefinementStage<SimPayloads> for WindowRefinement {
    fn register_correction_callback(&mut self, edge: FeedbackEdge<BiasCorrection>) {
        self.correction = Some(edge);
    }

    fn register_failure_callback(&mut self, signal: FailureSignal) {
        self.failure = Some(signal);
    }
}

/// Grid of visited cells. Emits only when a new cell is entered.
pub struct OccupancyMap {
    cell_size: f64,
    cells: HashSet<(i64, i64)>,
}

impl OccupancyMap {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            cells: HashSet::new(),
        }
    }
}

impl Processor for OccupancyMap {
    type Input = ChainOutput<SimPayloads>;
    type Output = MapUpdate;

    fn process(&mut self, input: ChainOutput<SimPayloads>) -> Option<MapUpdate> {
        let (seq, pose) = match &input {
            ChainOutput::Estimate(e) => (e.seq, e.pose),
            ChainOutput::Refined(r) => (r.seq, r.pose),
        };
        let cell = (
            (pose.x / self.cell_size).floor() as i64,
            (pose.y / self.cell_size).floor() as i64,
        );
        self.cells.insert(cell).then(|| MapUpdate {
            seq,
            occupied_cells: self.cells.len(),
            cell,
        })
    }
}

/// Matches refined keyframes against older ones by position.
pub struct RevisitDetector {
    radius: f64,
    min_gap: usize,
    history: Vec<(u64, Pose2)>,
}

impl RevisitDetector {
    /// `min_gap` keyframes must separate a match from the query.
    pub fn new(radius: f64, min_gap: usize) -> Self {
        Self {
            radius,
            min_gap: min_gap.max(1),
            history: Vec::new(),
        }
    }
}

impl Processor for RevisitDetector {
    type Input = ChainOutput<SimPayloads>;
    type Output = Revisit;

    fn process(&mut self, input: ChainOutput<SimPayloads>) -> Option<Revisit> {
        let ChainOutput::Refined(refined) = input else {
            return None;
        };

        let searchable = self.history.len().saturating_sub(self.min_gap);
        let best = self.history[..searchable]
            .iter()
            .map(|(seq, pose)| (*seq, pose.distance_to(&refined.pose)))
            .filter(|(_, distance)| *distance <= self.radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        self.history.push((refined.seq, refined.pose));

        best.map(|(matched_seq, distance)| {
            tracing::info!(
                "Revisit: keyframe {} is {:.2} m from keyframe {}",
                refined.seq,
                distance,
                matched_seq
            );
            Revisit {
                seq: refined.seq,
                matched_seq,
                distance,
            }
        })
    }
}

/// Renders one text line per refined pose.
#[derive(Default)]
pub struct TextVisualizer {
    last_estimate: Option<Arc<PoseEstimate>>,
    occupied_cells: usize,
}

impl Processor for TextVisualizer {
    type Input = VizInput<SimPayloads>;
    type Output = Frame;

    fn process(&mut self, input: VizInput<SimPayloads>) -> Option<Frame> {
        match input {
            VizInput::Estimate(estimate) => {
                self.last_estimate = Some(estimate);
                None
            }
            VizInput::Map(update) => {
                self.occupied_cells = update.occupied_cells;
                None
            }
            VizInput::Refined(refined) => {
                let lag = self
                    .last_estimate
                    .as_ref()
                    .map_or(0, |e| e.seq.saturating_sub(refined.seq));
                Some(Frame {
                    seq: refined.seq,
                    text: format!(
                        "kf {:>5} t={:>8}s pos=({}, {}) heading={} bias={} cells={} lag={}",
                        refined.seq,
                        round_to_digit(nsec_to_sec(refined.timestamp), 3),
                        round_to_digit(refined.pose.x, 2),
                        round_to_digit(refined.pose.y, 2),
                        round_to_digit(refined.pose.heading, 3),
                        round_to_digit(refined.bias, 5),
                        self.occupied_cells,
                        lag
                    ),
                })
            }
        }
    }
}

/// Writes frames to the log.
#[derive(Default)]
pub struct LogDisplay {
    frames: u64,
    started: Option<f64>,
}

impl Processor for LogDisplay {
    type Input = Arc<Frame>;
    type Output = ();

    fn process(&mut self, frame: Arc<Frame>) -> Option<()> {
        self.started.get_or_insert_with(current_time_secs);
        self.frames += 1;
        tracing::debug!("{}", frame.text);
        Some(())
    }

    fn on_shutdown(&mut self) {
        let elapsed = self
            .started
            .map_or(0.0, |started| current_time_secs() - started);
        tracing::info!("Display showed {} frames over {:.2}s", self.frames, elapsed);
    }

    fn on_resume(&mut self) {
        self.frames = 0;
        self.started = None;
    }
}
