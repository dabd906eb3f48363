//! Wall-clock pacing for the control loop.

use std::thread;
use std::time::{Duration, Instant};

use log::warn;

use crate::app::ports::Ticker;

/// Sleeps to fixed tick boundaries.
///
/// Boundaries are computed from the first tick, so a slow iteration does
/// not push every later tick back.  If the loop falls more than one whole
/// interval behind, the schedule restarts from now instead of bursting.
pub struct SleepTicker {
    interval: Duration,
    next: Option<Instant>,
}

impl SleepTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn from_millis(ms: u32) -> Self {
        Self::new(Duration::from_millis(u64::from(ms)))
    }
}

impl Ticker for SleepTicker {
    fn wait(&mut self) {
        let now = Instant::now();
        let target = self.next.unwrap_or(now + self.interval);
        if target > now {
            thread::sleep(target - now);
            self.next = Some(target + self.interval);
        } else {
            let behind = now - target;
            if behind > self.interval {
                warn!("Control loop overran by {} ms, resynchronising", behind.as_millis());
                self.next = Some(now + self.interval);
            } else {
                self.next = Some(target + self.interval);
            }
        }
    }
}
