//! Fixed window algorithm (spec §4.A): sliding 60s window, admission allowed
//! while `|timestamps in [now-60_000, now]| < maxRpm`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const JITTER_BUFFER_MS: u64 = 50;

pub struct FixedWindow {
    timestamps: VecDeque<Instant>,
}

impl FixedWindow {
    pub fn new() -> Self {
        Self { timestamps: VecDeque::new() }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) >= WINDOW {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn try_consume(&mut self, max_rpm: u32) -> bool {
        let now = Instant::now();
        self.evict_expired(now);
        if (self.timestamps.len() as u32) < max_rpm {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Time until the oldest in-window timestamp leaves, plus jitter.
    pub fn estimated_wait_ms(&mut self) -> u64 {
        let now = Instant::now();
        self.evict_expired(now);
        match self.timestamps.front() {
            None => 0,
            Some(&oldest) => {
                let elapsed = now.duration_since(oldest);
                let remaining = WINDOW.saturating_sub(elapsed);
                remaining.as_millis() as u64 + JITTER_BUFFER_MS
            }
        }
    }

    pub fn reset(&mut self) {
        self.timestamps.clear();
    }
}

impl Default for FixedWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_capacity_then_blocks() {
        let mut window = FixedWindow::new();
        assert!(window.try_consume(2));
        assert!(window.try_consume(2));
        assert!(!window.try_consume(2));
    }

    #[test]
    fn estimated_wait_is_zero_when_empty() {
        let mut window = FixedWindow::new();
        assert_eq!(window.estimated_wait_ms(), 0);
    }
}
