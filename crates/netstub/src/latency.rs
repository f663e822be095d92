//! Artificial Latency
//!
//! Optional random sleep before a stub emits, used to shake out ordering
//! assumptions in the code under test. Draws `n` uniformly from
//! `5..=100` and sleeps `1/n²` seconds, so short delays dominate.

use crate::config::LatencyPolicy;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MIN_DIVISOR: u64 = 5;
const MAX_DIVISOR: u64 = 100;

/// Simple xorshift64 PRNG
#[derive(Debug, Clone)]
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    const fn new(seed: u64) -> Self {
        // Ensure non-zero state
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    const fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in `min..=max`
    const fn next_inclusive(&mut self, min: u64, max: u64) -> u64 {
        min + (self.next() % (max - min + 1))
    }
}

/// Decides and draws per-completion latency
#[derive(Debug)]
pub struct LatencyInjector {
    policy: LatencyPolicy,
    rng: Mutex<Xorshift64>,
}

impl LatencyInjector {
    /// Injector with an explicit seed, or a clock-derived one
    #[must_use]
    pub fn new(policy: LatencyPolicy, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(clock_seed);
        Self {
            policy,
            rng: Mutex::new(Xorshift64::new(seed)),
        }
    }

    /// Configured policy
    #[must_use]
    pub const fn policy(&self) -> LatencyPolicy {
        self.policy
    }

    /// Draw one latency value in `[1/100² s, 1/5² s]`
    pub fn draw(&self) -> Duration {
        let divisor = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_inclusive(MIN_DIVISOR, MAX_DIVISOR);
        Duration::from_secs_f64(1.0 / (divisor * divisor) as f64)
    }

    /// Sleep for a drawn interval if the policy is on; returns the sleep
    pub fn maybe_sleep(&self) -> Option<Duration> {
        if !self.policy.is_enabled() {
            return None;
        }
        let latency = self.draw();
        tracing::trace!(latency_us = latency.as_micros() as u64, "injecting latency");
        std::thread::sleep(latency);
        Some(latency)
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0x5EED)
}
