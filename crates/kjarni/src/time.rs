//! Frame timing and delta time.
//!
//! The [`Time`] resource is advanced by the scheduler at the start of each
//! frame, before any stage runs. Systems read it through
//! [`UpdateContext::delta_secs`](crate::ecs::UpdateContext::delta_secs) or
//! directly as a resource.

use std::time::{Duration, Instant};

/// Frame timing resource.
#[derive(Debug, Clone, Copy)]
pub struct Time {
    /// When the current frame started, for wall-clock updates.
    frame_start: Instant,
    /// Duration of the previous frame.
    delta: Duration,
    /// Sum of every delta so far.
    elapsed: Duration,
    frame_count: u64,
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

impl Time {
    pub fn new() -> Self {
        Self {
            frame_start: Instant::now(),
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Wall-clock time since the previous call (or since creation). Does not
    /// change the resource; feed the result to [`advance`](Self::advance).
    pub fn measure(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.frame_start;
        self.frame_start = now;
        delta
    }

    /// Start a new frame that lasted `delta`.
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta;
        self.elapsed += delta;
        self.frame_count += 1;
    }

    /// Duration of the previous frame.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Delta time in seconds (f32), the most common way to use it.
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Total simulated time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Number of frames advanced so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Estimated FPS based on the last frame's delta.
    pub fn fps(&self) -> f32 {
        if self.delta.as_secs_f32() > 0.0 {
            1.0 / self.delta.as_secs_f32()
        } else {
            0.0
        }
    }
}
