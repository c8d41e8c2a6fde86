//! Delay schedules between attempts

use std::time::Duration;

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: `initial_delay + attempt * increment`
    Linear { initial_delay: Duration, increment: Duration },
}

impl BackoffStrategy {
    /// Linear schedule sleeping `base * (attempt + 1)` after 0-based `attempt`.
    #[must_use]
    pub const fn linear(base: Duration) -> Self {
        Self::Linear { initial_delay: base, increment: base }
    }

    /// Delay to wait after the failed 0-based `attempt`.
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment } => {
                initial_delay.saturating_add(increment.saturating_mul(attempt))
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::linear(Duration::from_secs(1))
    }
}
