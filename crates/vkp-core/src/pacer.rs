// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Fixed-rate frame pacing: sleep away whatever is left of the frame budget.
#[derive(Debug)]
pub struct FramePacer {
    budget: Duration,
    frame_start: Instant,
}

impl FramePacer {
    /// `target_fps <= 0` disables pacing.
    pub fn new(target_fps: f64) -> Self {
        let budget = if target_fps > 0.0 {
            Duration::from_secs_f64(1.0 / target_fps)
        } else {
            Duration::ZERO
        };
        Self {
            budget,
            frame_start: Instant::now(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn begin_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Time still owed to the current frame after `elapsed` of work.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.budget
            .checked_sub(elapsed)
            .filter(|left| !left.is_zero())
    }

    pub fn end_frame(&self) {
        if let Some(left) = self.remaining(self.frame_start.elapsed()) {
            std::thread::sleep(left);
        }
    }
}
