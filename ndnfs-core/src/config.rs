//! Tunables consumed by the request pipeline and the segmented reader.

use std::time::Duration;

use crate::error::ConfigError;
use crate::namespace::{DEFAULT_INTEREST_LIFETIME, DEFAULT_PREFIX, MAX_PAYLOAD_SIZE};

pub const DEFAULT_WINDOW: usize = 64;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_NACK_CONGESTION: u32 = 4;
pub const DEFAULT_MAX_NACK_DUPLICATE: u32 = 4;
pub const DEFAULT_MAX_TIMEOUTS: u32 = 4;
pub const DEFAULT_CONGESTION_BACKOFF_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_CONGESTION_BACKOFF_CAP: Duration = Duration::from_secs(8);
pub const DEFAULT_SUBMIT_QUEUE: usize = 512;
pub const DEFAULT_RESPONSE_QUEUE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root name prefix of the file namespace.
    pub prefix: String,
    /// Segment size in bytes, shared with the responder.
    pub segment_size: u64,
    /// Maximum number of outstanding requests.
    pub window: usize,
    pub interest_lifetime: Duration,
    /// Period of the timeout sweep; must be shorter than the lifetime.
    pub sweep_interval: Duration,
    pub max_nack_congestion: u32,
    pub max_nack_duplicate: u32,
    pub max_timeouts: u32,
    pub congestion_backoff_base: Duration,
    pub congestion_backoff_cap: Duration,
    /// Depth of the submit queue in front of the window.
    pub submit_queue: usize,
    /// Depth of the response and failure queues.
    pub response_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            segment_size: MAX_PAYLOAD_SIZE,
            window: DEFAULT_WINDOW,
            interest_lifetime: DEFAULT_INTEREST_LIFETIME,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_nack_congestion: DEFAULT_MAX_NACK_CONGESTION,
            max_nack_duplicate: DEFAULT_MAX_NACK_DUPLICATE,
            max_timeouts: DEFAULT_MAX_TIMEOUTS,
            congestion_backoff_base: DEFAULT_CONGESTION_BACKOFF_BASE,
            congestion_backoff_cap: DEFAULT_CONGESTION_BACKOFF_CAP,
            submit_queue: DEFAULT_SUBMIT_QUEUE,
            response_queue: DEFAULT_RESPONSE_QUEUE,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.segment_size == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }
        if self.sweep_interval >= self.interest_lifetime {
            return Err(ConfigError::SweepNotShorterThanLifetime);
        }
        if self.congestion_backoff_base > self.congestion_backoff_cap {
            return Err(ConfigError::BackoffBaseAboveCap);
        }
        if self.submit_queue == 0 || self.response_queue == 0 {
            return Err(ConfigError::ZeroQueue);
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_nack_congestion: self.max_nack_congestion,
            max_nack_duplicate: self.max_nack_duplicate,
            max_timeouts: self.max_timeouts,
            backoff_base: self.congestion_backoff_base,
            backoff_cap: self.congestion_backoff_cap,
        }
    }
}

/// Retry budgets and congestion backoff of the fetch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_nack_congestion: u32,
    pub max_nack_duplicate: u32,
    pub max_timeouts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    /// Backoff before the resend that follows the `count`-th congestion
    /// Nack: `base * 2^(count-1)`, capped. With the 2s default this is
    /// 2s, 4s, 8s, 8s.
    pub fn congestion_backoff(&self, count: u32) -> Duration {
        let shift = count.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Config::default().retry_policy()
    }
}
