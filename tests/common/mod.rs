//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use sensor_pipeline::{Payloads, Pipeline};
use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Run a pipeline until it is quiescent and shut down, in either mode
pub fn finish<T: Payloads>(pipeline: &Pipeline<T>) {
    let poll = pipeline.config().shutdown.poll_interval();
    if pipeline.config().execution.is_parallel() {
        assert!(pipeline.shutdown_when_finished(poll));
    } else {
        while !pipeline.shutdown_when_finished(poll) {
            pipeline.step();
        }
    }
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
