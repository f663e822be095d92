//! Stub Configuration
//!
//! Latch timeouts and the artificial-latency switch, with optional
//! environment overrides.

use crate::latch::DEFAULT_LATCH_TIMEOUT;
use crate::result::{StubError, StubResult};
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Boolean flag enabling randomized response latency
pub const RANDOM_LATENCY_ENV: &str = "NETSTUB_RANDOM_LATENCY";

/// Latch timeout override in milliseconds
pub const LATCH_TIMEOUT_ENV: &str = "NETSTUB_LATCH_TIMEOUT_MS";

/// Parse a boolean flag value (`1`, `true`, `yes`, `on`, any case)
fn flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// =============================================================================
// LATENCY POLICY
// =============================================================================

/// Whether completions sleep for a random interval before emitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyPolicy {
    /// Never inject latency
    Disabled,
    /// Always inject latency
    Enabled,
    /// Read [`RANDOM_LATENCY_ENV`] on every completion
    #[default]
    FromEnv,
}

impl LatencyPolicy {
    /// Resolve the policy for one completion
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::Enabled => true,
            Self::FromEnv => std::env::var(RANDOM_LATENCY_ENV)
                .map(|value| flag_enabled(&value))
                .unwrap_or(false),
        }
    }
}

// =============================================================================
// STUB CONFIG
// =============================================================================

/// Configuration shared by a registry and its interceptor
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Bound for every latch wait
    pub latch_timeout: Duration,
    /// Artificial latency switch
    pub latency: LatencyPolicy,
    /// Seed for latency draws; `None` seeds from the clock
    pub latency_seed: Option<u64>,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            latch_timeout: DEFAULT_LATCH_TIMEOUT,
            latency: LatencyPolicy::FromEnv,
            latency_seed: None,
        }
    }
}

impl StubConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus overrides from the process environment
    pub fn from_env() -> StubResult<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(LATCH_TIMEOUT_ENV) {
            config.latch_timeout = parse_timeout_ms(&raw)?;
        }
        Ok(config)
    }

    /// Set latch timeout
    #[must_use]
    pub const fn with_latch_timeout(mut self, timeout: Duration) -> Self {
        self.latch_timeout = timeout;
        self
    }

    /// Set latency policy
    #[must_use]
    pub const fn with_latency(mut self, latency: LatencyPolicy) -> Self {
        self.latency = latency;
        self
    }

    /// Seed latency draws for reproducible sequences
    #[must_use]
    pub const fn with_latency_seed(mut self, seed: u64) -> Self {
        self.latency_seed = Some(seed);
        self
    }
}

fn parse_timeout_ms(raw: &str) -> StubResult<Duration> {
    let millis: u64 = raw.trim().parse().map_err(|e| StubError::InvalidConfig {
        key: LATCH_TIMEOUT_ENV.to_string(),
        message: format!("{raw:?} is not a millisecond count: {e}"),
    })?;
    if millis == 0 {
        return Err(StubError::InvalidConfig {
            key: LATCH_TIMEOUT_ENV.to_string(),
            message: "timeout must be positive".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}
