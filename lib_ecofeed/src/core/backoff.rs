//! # Reconnect Backoff Policy
//!
//! Exponential backoff with a per-client jitter spread.
//!
//! ## Core Design Principles:
//!
//! 1.  **Capped exponential floor**: the nominal delay of retry `n` (0-based)
//!     is `floor_n = min(base * 2^n, max)`.
//! 2.  **Jitter band**: retry `n` waits somewhere in
//!     `[min(floor_n, max / (1 + jitter_ratio)), min(floor_n * (1 + jitter_ratio), max)]`.
//!     Below the cap the band starts at the floor. Once the floor reaches
//!     `max` the band reaches below it, so clients still spread out when
//!     `base == max` or after many failures.
//! 3.  **Per-client spread**: each policy draws one `spread` in `0.0..=1.0`
//!     and always lands at that fraction of the band. Both band edges are
//!     non-decreasing in `n`, so one client's delays never shrink and never
//!     exceed `max`, while separate clients sit at different points.
//! 4.  **Explicit budget**: `max_attempts` counts reconnect attempts after the
//!     failure that started the cycle. `None` is unbounded and `Some(0)` fails
//!     on the very first error.

use std::cmp::min;
use std::time::Duration;

use rand::Rng;

/// Backoff parameters for one connection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    max_attempts: Option<u32>,
    jitter_ratio: f64,
    spread: f64,
}

impl ReconnectPolicy {
    /// Builds a policy with a random spread. `jitter_ratio` is clamped to `0.0..=1.0`.
    pub fn new(base: Duration, max: Duration, max_attempts: Option<u32>, jitter_ratio: f64) -> Self {
        let spread = rand::rng().random_range(0.0..=1.0);
        Self::with_spread(base, max, max_attempts, jitter_ratio, spread)
    }

    /// Builds a policy with a fixed position inside the jitter band.
    pub fn with_spread(
        base: Duration,
        max: Duration,
        max_attempts: Option<u32>,
        jitter_ratio: f64,
        spread: f64,
    ) -> Self {
        Self {
            base,
            max: max.max(base),
            max_attempts,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
            spread: spread.clamp(0.0, 1.0),
        }
    }

    /// Nominal delay before retry `attempt` (0-based): `min(base * 2^n, max)`.
    pub fn floor(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(min(base_ms.saturating_mul(factor), max_ms))
    }

    /// Shortest delay any client may wait before retry `attempt`.
    pub fn lower(&self, attempt: u32) -> Duration {
        let floor_ms = self.floor(attempt).as_millis() as u64;
        let max_ms = self.max.as_millis() as f64;
        let cap_band = (max_ms / (1.0 + self.jitter_ratio)).floor() as u64;
        Duration::from_millis(min(floor_ms, cap_band))
    }

    /// Longest delay any client may wait before retry `attempt`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let floor_ms = self.floor(attempt).as_millis() as u64;
        let spread = (floor_ms as f64 * self.jitter_ratio).floor() as u64;
        Duration::from_millis(min(floor_ms.saturating_add(spread), self.max.as_millis() as u64))
    }

    /// This client's delay before retry `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let lower_ms = self.lower(attempt).as_millis() as u64;
        let ceiling_ms = self.ceiling(attempt).as_millis() as u64;
        let width = ceiling_ms.saturating_sub(lower_ms) as f64;
        Duration::from_millis(lower_ms + (width * self.spread).round() as u64)
    }

    /// True once `consecutive_failures` leave no reconnect attempt in the budget.
    ///
    /// The first failure opens the cycle; each later one consumes an attempt.
    pub fn is_exhausted(&self, consecutive_failures: u32) -> bool {
        match self.max_attempts {
            None => false,
            Some(limit) => consecutive_failures.saturating_sub(1) >= limit,
        }
    }

    /// Configured reconnect budget.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}
