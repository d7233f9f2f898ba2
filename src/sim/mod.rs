//! Synthetic planar-odometry replay.
//!
//! A small but complete instantiation of the pipeline, used by the binary,
//! the benches and the integration tests:
//!
//! - [`DeadReckoning`] integrates speed and yaw-rate packets into a pose and
//!   marks every `keyframe_interval`-th estimate as a keyframe
//! - [`WindowRefinement`] fits the heading drift over a sliding window of
//!   keyframes against noisy heading fixes and feeds the drift back as a
//!   gyro bias correction
//! - [`OccupancyMap`], [`RevisitDetector`], [`TextVisualizer`] and
//!   [`LogDisplay`] are the optional stages
//! - [`SyntheticSource`] replays a [`Scenario`] into an [`InputHandle`]
//!
//! [`InputHandle`]: crate::pipeline::InputHandle

pub mod source;
pub mod stages;

pub use source::{Scenario, SyntheticSource};
pub use stages::{
    DeadReckoning, LogDisplay, OccupancyMap, RevisitDetector, TextVisualizer, WindowRefinement,
};

use crate::pipeline::{Payloads, Stages};
use crate::types::Timestamp;
use serde::Serialize;

/// Planar pose: position in metres, heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pose2 {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2 {
    pub fn distance_to(&self, other: &Pose2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading.is_finite()
    }
}

/// One synchronized sensor sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryPacket {
    pub seq: u64,
    pub timestamp: Timestamp,
    /// Forward speed in m/s
    pub speed: f64,
    /// Gyro yaw rate in rad/s, biased
    pub yaw_rate: f64,
    /// Absolute heading fix in radians, noisy but unbiased
    pub heading_fix: f64,
}

/// Output of the dead-reckoning stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseEstimate {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub pose: Pose2,
    pub heading_fix: f64,
    /// Bias that was subtracted while integrating this packet
    pub applied_bias: f64,
    pub keyframe: bool,
}

/// Output of the refinement stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinedPose {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub pose: Pose2,
    /// Estimated gyro bias after this keyframe
    pub bias: f64,
    /// Keyframes in the sliding window
    pub window: usize,
}

/// Output of the occupancy map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapUpdate {
    pub seq: u64,
    pub occupied_cells: usize,
    pub cell: (i64, i64),
}

/// A keyframe that came back near an older one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Revisit {
    pub seq: u64,
    pub matched_seq: u64,
    pub distance: f64,
}

/// One rendered text line.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u64,
    pub text: String,
}

/// Gyro bias correction sent from refinement to dead reckoning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasCorrection {
    pub yaw_rate_bias: f64,
}

/// Item types of the synthetic pipeline.
pub struct SimPayloads;

impl Payloads for SimPayloads {
    type Input = OdometryPacket;
    type Estimate = PoseEstimate;
    type Refined = RefinedPose;
    type Map = MapUpdate;
    type Revisit = Revisit;
    type Frame = Frame;
    type Correction = BiasCorrection;

    fn is_decision_point(estimate: &PoseEstimate) -> bool {
        estimate.keyframe
    }
}

/// Every synthetic stage, optional ones included. Stages disabled in the
/// pipeline configuration are dropped by the builder.
pub fn stages(scenario: &Scenario) -> Stages<SimPayloads> {
    Stages::new(
        DeadReckoning::new(scenario.keyframe_interval),
        WindowRefinement::new(scenario.window_size),
    )
    .with_map(OccupancyMap::new(scenario.map_cell_size))
    .with_revisit(RevisitDetector::new(scenario.revisit_radius, scenario.revisit_min_gap))
    .with_visualization(TextVisualizer::default(), LogDisplay::default())
}
