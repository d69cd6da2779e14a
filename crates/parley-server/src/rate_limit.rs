//! Per-session chat rate limiting.
//!
//! Fixed window: at most `limit` user-originated chat frames per window.
//! Overflowing frames are dropped with an error reply, never delayed.
//! Control frames (PING, admin commands) bypass the limiter.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateWindow {
    window_start: Instant,
    count: u32,
}

impl RateWindow {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Account one chat frame; returns false when the window is exhausted.
    pub fn allow(&mut self, limit: u32, window: Duration) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 1;
            return true;
        }

        self.count += 1;
        self.count <= limit
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new()
    }
}
