// Progress rate timer for status output

use std::time::{Duration, Instant};

pub struct RateTimer {
    last: Instant,
}

impl Default for RateTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RateTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Time since the previous lap (or construction), restarting the clock
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now - self.last;
        self.last = now;
        elapsed
    }

    /// Bytes per second for `bytes` processed during the lap that ends now
    pub fn rate(&mut self, bytes: u64) -> f64 {
        let secs = self.lap().as_secs_f64();
        if secs > 0.0 {
            bytes as f64 / secs
        } else {
            0.0
        }
    }
}
