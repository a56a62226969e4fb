//! Limit policies and admission results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many events are permitted per period, and how many may arrive at once.
///
/// A `Limit` is a plain value: it is never mutated by the limiter and can be
/// shared freely between concurrent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Limit {
    /// Events permitted per `period` at the steady rate
    pub rate: u64,
    /// Length of one rate period
    pub period: Duration,
    /// Events that may be admitted instantaneously
    pub burst: u64,
}

impl Limit {
    /// Create a limit with an explicit burst.
    pub const fn new(rate: u64, period: Duration, burst: u64) -> Self {
        Self {
            rate,
            period,
            burst,
        }
    }

    /// `rate` events per second with no burst beyond the rate.
    pub const fn per_second(rate: u64) -> Self {
        Self::new(rate, Duration::from_secs(1), rate)
    }

    /// `rate` events per minute with no burst beyond the rate.
    pub const fn per_minute(rate: u64) -> Self {
        Self::new(rate, Duration::from_secs(60), rate)
    }

    /// `rate` events per hour with no burst beyond the rate.
    pub const fn per_hour(rate: u64) -> Self {
        Self::new(rate, Duration::from_secs(3600), rate)
    }

    /// Replace the burst allowance.
    pub const fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// True for the unconfigured limit: rate, period and burst all zero.
    pub fn is_zero(&self) -> bool {
        *self == Limit::default()
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.period.as_secs(), self.period.subsec_nanos()) {
            (1, 0) => write!(f, "{} req/s (burst {})", self.rate, self.burst),
            (60, 0) => write!(f, "{} req/m (burst {})", self.rate, self.burst),
            (3600, 0) => write!(f, "{} req/h (burst {})", self.rate, self.burst),
            _ => write!(f, "{} req/{:?} (burst {})", self.rate, self.period, self.burst),
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitResult {
    /// The limit that was used to obtain this result
    pub limit: Limit,

    /// Number of events admitted now
    pub allowed: u64,

    /// Events that could still be admitted instantaneously after this call.
    /// With 10 req/s and 6 requests already seen this second, this is 4.
    pub remaining: u64,

    /// Minimum wait before another request could succeed; `None` when the
    /// request was admitted and no wait is needed.
    pub retry_after: Option<Duration>,

    /// Time until the key is fully replenished, i.e. until `remaining`
    /// equals the burst again.
    pub reset_after: Duration,
}

impl RateLimitResult {
    /// Whether at least one event was admitted.
    pub fn is_allowed(&self) -> bool {
        self.allowed > 0
    }
}
