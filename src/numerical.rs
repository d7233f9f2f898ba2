//! Small numerical helpers used by replay drivers and reference stages.

use crate::types::Timestamp;

/// Round `x` to `digits` decimal places.
pub fn round_to_digit(x: f64, digits: i32) -> f64 {
    let dec = 10f64.powi(digits);
    (x * dec).round() / dec
}

/// Uniform noise in `[-sigma / 2, sigma / 2)`.
pub fn random_float(rng: &mut fastrand::Rng, sigma: f64) -> f64 {
    rng.f64() * sigma - sigma / 2.0
}

/// Nanosecond timestamp to seconds.
pub fn nsec_to_sec(timestamp: Timestamp) -> f64 {
    timestamp as f64 * 1e-9
}

/// Seconds to nanosecond timestamp (truncating).
pub fn sec_to_nsec(seconds: f64) -> Timestamp {
    (seconds * 1e9) as Timestamp
}

/// Wall-clock time in whole seconds since the Unix epoch.
pub fn current_time_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as f64)
        .unwrap_or(0.0)
}
