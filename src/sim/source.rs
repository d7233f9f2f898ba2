//! Replay data source for the synthetic pipeline.

use super::stages::wrap_angle;
use super::{OdometryPacket, SimPayloads};
use crate::error::Result;
use crate::numerical::{random_float, sec_to_nsec};
use crate::pipeline::{DataSource, InputHandle};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Trajectory and sensor model for a replay: a platform driving a circle
/// at constant speed with a biased, noisy gyro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Packets to replay
    pub packets: u64,
    /// Packet rate in Hz
    pub rate_hz: f64,
    /// Forward speed in m/s
    pub speed: f64,
    /// True yaw rate in rad/s
    pub turn_rate: f64,
    /// Constant gyro bias in rad/s
    pub gyro_bias: f64,
    /// Gyro noise amplitude in rad/s
    pub gyro_noise: f64,
    /// Heading-fix noise amplitude in rad
    pub heading_noise: f64,
    /// Every n-th estimate is a keyframe
    pub keyframe_interval: u64,
    /// Keyframes per bias fit
    pub window_size: usize,
    /// Occupancy grid resolution in m
    pub map_cell_size: f64,
    /// Revisit match radius in m
    pub revisit_radius: f64,
    /// Keyframes that must separate a revisit from its match
    pub revisit_min_gap: usize,
    /// Pace injection at `rate_hz` instead of replaying as fast as possible
    pub realtime: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            packets: 8_000,
            rate_hz: 100.0,
            speed: 1.0,
            turn_rate: 0.1,
            gyro_bias: 0.01,
            gyro_noise: 0.002,
            heading_noise: 0.01,
            keyframe_interval: 10,
            window_size: 8,
            map_cell_size: 0.5,
            revisit_radius: 0.5,
            revisit_min_gap: 50,
            realtime: false,
        }
    }
}

impl Scenario {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(f64::MIN_POSITIVE))
    }

    /// Sensor packet `seq` of the replay.
    pub fn packet(&self, seq: u64, rng: &mut fastrand::Rng) -> OdometryPacket {
        let t = seq as f64 / self.rate_hz;
        let true_heading = self.turn_rate * t;
        OdometryPacket {
            seq,
            timestamp: sec_to_nsec(t),
            speed: self.speed,
            yaw_rate: self.turn_rate + self.gyro_bias + random_float(rng, self.gyro_noise),
            heading_fix: wrap_angle(true_heading + random_float(rng, self.heading_noise)),
        }
    }
}

/// Replays a [`Scenario`] into a pipeline.
///
/// Call [`run`](Self::run) on the driving thread (required for sequential
/// pipelines) or [`spawn`](Self::spawn) for a dedicated thread.
pub struct SyntheticSource {
    handle: InputHandle<SimPayloads>,
    scenario: Scenario,
    rng: Mutex<fastrand::Rng>,
    working: AtomicBool,
    injected: AtomicU64,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl SyntheticSource {
    pub fn new(handle: InputHandle<SimPayloads>, scenario: Scenario, rng: fastrand::Rng) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            handle,
            scenario,
            rng: Mutex::new(rng),
            working: AtomicBool::new(true),
            injected: AtomicU64::new(0),
            stop_tx,
            stop_rx,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Packets accepted by the pipeline so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    fn stop_requested(&self) -> bool {
        if !self.scenario.realtime {
            return self.stop_rx.try_recv().is_ok();
        }
        match self.stop_rx.recv_timeout(self.scenario.period()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Replay every packet on the calling thread, stopping early on
    /// [`DataSource::shutdown`] or when the pipeline rejects input.
    /// Returns the number of packets accepted.
    pub fn run(&self) -> u64 {
        tracing::info!("Replaying {} synthetic packets", self.scenario.packets);
        for seq in 0..self.scenario.packets {
            if self.stop_requested() {
                tracing::info!("Synthetic source stopped after {} packets", seq);
                break;
            }
            let packet = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                self.scenario.packet(seq, &mut rng)
            };
            if !self.handle.inject(packet) {
                tracing::debug!("Pipeline rejected packet {}, stopping replay", seq);
                break;
            }
            self.injected.fetch_add(1, Ordering::Relaxed);
        }
        self.working.store(false, Ordering::SeqCst);
        tracing::info!("Synthetic source finished ({} packets)", self.injected());
        self.injected()
    }

    /// Run the replay on its own thread.
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<u64>> {
        let source = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("synthetic-source".to_string())
            .spawn(move || source.run())?;
        Ok(handle)
    }
}

impl DataSource for SyntheticSource {
    fn shutdown(&self) {
        let _ = self.stop_tx.try_send(());
        self.working.store(false, Ordering::SeqCst);
    }

    fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }
}
