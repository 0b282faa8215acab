use std::time::{Duration, Instant};

use chrono::TimeDelta;

pub fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Converts a std duration, saturating at the largest representable delta.
pub fn to_time_delta(value: Duration) -> TimeDelta {
    TimeDelta::from_std(value).unwrap_or(TimeDelta::MAX)
}
