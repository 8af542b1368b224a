//! Real-time primitives: countdowns, generations and the session clock
//!
//! Every timer in the machine is measured in real elapsed time handed in by
//! the host loop. Nothing here reads a wall clock.

use std::time::Duration;

/// Convert configured seconds into a duration (negative or NaN → zero,
/// too large → `Duration::MAX`)
#[inline]
pub fn secs(value: f32) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f32(value).unwrap_or(Duration::MAX)
}

/// Convert configured seconds into a duration no shorter than `floor`
#[inline]
pub fn secs_floored(value: f32, floor: f32) -> Duration {
    secs(value.max(floor))
}

/// One-shot countdown
///
/// Fires exactly once, on the tick that crosses zero, and reports how far
/// that tick overshot so chained phases keep their exact cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: Duration,
    fired: bool,
}

impl Countdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            remaining: duration,
            fired: false,
        }
    }

    pub fn from_secs(value: f32) -> Self {
        Self::new(secs(value))
    }

    #[inline]
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    #[inline]
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Advance by `dt`. Returns `Some(overshoot)` on the firing tick only.
    pub fn tick(&mut self, dt: Duration) -> Option<Duration> {
        if self.fired {
            return None;
        }
        if dt >= self.remaining {
            let overshoot = dt - self.remaining;
            self.remaining = Duration::ZERO;
            self.fired = true;
            Some(overshoot)
        } else {
            self.remaining -= dt;
            None
        }
    }
}

/// Monotonic generation counter used to invalidate stale completions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Advance to a fresh generation and return it
    #[inline]
    pub fn bump(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }

    #[inline]
    pub fn is_current(&self, token: u64) -> bool {
        self.0 == token
    }
}

/// Elapsed real time since the session started
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClock {
    elapsed: Duration,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn advance(&mut self, dt: Duration) {
        self.elapsed += dt;
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[inline]
    pub fn now_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_rejects_negative_and_nan() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f32::NAN), Duration::ZERO);
        assert_eq!(secs(0.5), Duration::from_millis(500));
        assert_eq!(secs_floored(0.01, 0.05), secs(0.05));
    }

    #[test]
    fn test_secs_saturates_out_of_range() {
        assert_eq!(secs(1e30), Duration::MAX);
        assert_eq!(secs(f32::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_countdown_fires_once_with_overshoot() {
        let mut cd = Countdown::new(Duration::from_millis(100));
        assert_eq!(cd.tick(Duration::from_millis(60)), None);
        assert_eq!(cd.remaining(), Duration::from_millis(40));

        let over = cd.tick(Duration::from_millis(50));
        assert_eq!(over, Some(Duration::from_millis(10)));
        assert!(cd.has_fired());

        assert_eq!(cd.tick(Duration::from_millis(50)), None);
    }

    #[test]
    fn test_zero_countdown_fires_on_first_tick() {
        let mut cd = Countdown::new(Duration::ZERO);
        assert_eq!(cd.tick(Duration::ZERO), Some(Duration::ZERO));
    }

    #[test]
    fn test_generation_invalidates_old_tokens() {
        let mut generation = Generation::default();
        let first = generation.bump();
        assert!(generation.is_current(first));
        let second = generation.bump();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }

    #[test]
    fn test_session_clock() {
        let mut clock = SessionClock::new();
        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
        assert!((clock.now_ms() - 500.0).abs() < 1e-9);
    }
}
