use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Clamped time since the previous tick, in seconds.
    pub dt: f32,

    /// Unclamped time since the clock started (or was last reset).
    pub elapsed: Duration,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Per-window frame clock.
///
/// Delta time is clamped so a stall (debugger, minimized window, device reset)
/// never hands the app a huge step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts elapsed time and the delta baseline. The frame counter keeps going.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last = now;
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            elapsed: now.saturating_duration_since(self.start),
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped_both_ways() {
        let mut clock = FrameClock::with_clamps(Duration::from_millis(1), Duration::from_millis(100));
        let t0 = clock.last;

        let fast = clock.tick_at(t0);
        assert!((fast.dt - 0.001).abs() < 1e-6);

        let slow = clock.tick_at(t0 + Duration::from_secs(5));
        assert!((slow.dt - 0.1).abs() < 1e-6);
        assert_eq!(slow.elapsed, Duration::from_secs(5));
    }

    #[test]
    fn frame_index_counts_ticks() {
        let mut clock = FrameClock::new();
        let t0 = clock.last;
        let indices: Vec<u64> = (1..=3)
            .map(|i| clock.tick_at(t0 + Duration::from_millis(16 * i)).frame_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn reset_keeps_the_frame_counter() {
        let mut clock = FrameClock::new();
        clock.tick();
        clock.reset();
        assert_eq!(clock.tick().frame_index, 1);
    }
}
