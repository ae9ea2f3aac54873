//! Clock helpers shared by the room loop and HTTP handlers

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Default room tick rate (updates per second)
pub const DEFAULT_TICK_RATE: u32 = 20;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Wall-clock length of one tick at the given rate
pub fn tick_duration(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / tick_rate.max(1) as u64)
}

/// Delta time for one physics step (in seconds)
pub fn tick_delta(tick_rate: u32) -> f32 {
    1.0 / tick_rate.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_helpers_agree() {
        assert_eq!(tick_duration(20), Duration::from_millis(50));
        assert!((tick_delta(20) - 0.05).abs() < f32::EPSILON);
        // A zero rate is treated as one tick per second
        assert_eq!(tick_duration(0), Duration::from_secs(1));
    }

    #[test]
    fn uptime_is_zero_before_init_or_small_after() {
        init_server_time();
        assert!(uptime_secs() < 5);
    }
}
