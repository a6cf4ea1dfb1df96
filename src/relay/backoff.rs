//! Exponential backoff sequence for relay restarts (§4.2, testable property
//! #7): 2s, 4s, 8s, 16s, 32s, 60s, 60s, ... Resets to the start after a
//! sustained publish (≥60s) proves the camera is healthy again.

use std::time::Duration;

const STEPS_SECS: [u64; 6] = [2, 4, 8, 16, 32, 60];

pub struct BackoffSequence {
    step: usize,
}

impl BackoffSequence {
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Returns the next delay and advances internal state, capping at the
    /// final (largest) step rather than growing unbounded.
    pub fn next(&mut self) -> Duration {
        let secs = STEPS_SECS[self.step.min(STEPS_SECS.len() - 1)];
        if self.step < STEPS_SECS.len() - 1 {
            self.step += 1;
        }
        Duration::from_secs(secs)
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for BackoffSequence {
    fn default() -> Self {
        Self::new()
    }
}
