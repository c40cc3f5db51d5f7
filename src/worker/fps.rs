use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Frames-per-second over consecutive one-second windows.
///
/// `tick_at` returns a sample only when the current window has run for at least
/// one second, so a steady stream yields one sample per second.
#[derive(Debug, Default)]
pub struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> Option<f32> {
        self.tick_at(Instant::now())
    }

    /// Count one frame at `now`.
    pub fn tick_at(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < WINDOW {
            return None;
        }
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.window_start = Some(now);
        self.frames = 0;
        Some(fps)
    }

    /// Drop the partial window, e.g. after a camera reconnect.
    pub fn reset(&mut self) {
        self.window_start = None;
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_sample_per_window() {
        let t0 = Instant::now();
        let mut fps = FpsCounter::new();
        let samples: Vec<f32> = (0..=30)
            .filter_map(|i| fps.tick_at(t0 + Duration::from_millis(i * 100)))
            .collect();
        // Windows close at 1.0s, 2.0s and 3.0s.
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 11.0).abs() < 1e-3);
        assert!((samples[1] - 10.0).abs() < 1e-3);
        assert!((samples[2] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn reset_discards_partial_window() {
        let t0 = Instant::now();
        let mut fps = FpsCounter::new();
        for i in 0..9 {
            assert!(fps.tick_at(t0 + Duration::from_millis(i * 100)).is_none());
        }
        fps.reset();
        // Would have closed the old window; the new one starts here.
        assert!(fps.tick_at(t0 + Duration::from_millis(1000)).is_none());
        assert!(fps.tick_at(t0 + Duration::from_millis(1500)).is_none());
        let sample = fps.tick_at(t0 + Duration::from_millis(2000));
        assert!(sample.is_some_and(|s| (s - 3.0).abs() < 1e-3));
    }
}
