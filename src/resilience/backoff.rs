//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay schedule between retry attempts.
///
/// `delay_0 = initial`, `delay_{n+1} = min(delay_n * multiplier, max)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            next: initial.min(max),
            max,
            multiplier: multiplier.max(1.0),
            jitter: false,
        }
    }

    /// Add up to 10% random jitter on top of each delay.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Return the next delay and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);

        if self.jitter {
            current + jitter_for(current)
        } else {
            current
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// Jitter of 0 to 10% of the delay.
fn jitter_for(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    if jitter_range > 0 {
        Duration::from_millis(rand::thread_rng().gen_range(0..jitter_range))
    } else {
        Duration::ZERO
    }
}
