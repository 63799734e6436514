//! Exponential backoff schedule for retried requests
//!
//! The delay before retry `n` (0-indexed, i.e. after the `n`-th failed
//! attempt) is `base_delay * multiplier^n`, saturating on overflow.
//!
//! # Example
//!
//! ```rust
//! use apikit_core::retry::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(800));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base delay between attempts
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: 2,
        }
    }
}

impl BackoffPolicy {
    /// Calculate the delay that follows the given 0-indexed failed attempt
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}
