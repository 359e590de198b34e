//! Step configuration: retries and backoff

use crate::duration::{DurationError, DurationInput};

/// Backoff strategy between retry attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Every retry waits the base delay
    #[default]
    Constant,

    /// Retry `n` waits `delay * 2^(n-1)`
    Exponential,
}

/// Retry policy for a work step
///
/// `limit` is the number of retries allowed after the initial attempt, so
/// the default of zero means one attempt and no retry.
///
/// # Example
///
/// ```
/// use holdfast::step::{Backoff, RetryConfig};
///
/// let retries = RetryConfig::new(3, "5 seconds").with_backoff(Backoff::Exponential);
/// assert_eq!(retries.delay_for_retry(1).unwrap(), 5_000);
/// assert_eq!(retries.delay_for_retry(2).unwrap(), 10_000);
/// assert_eq!(retries.delay_for_retry(3).unwrap(), 20_000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the initial attempt
    pub limit: u32,

    /// Base delay between attempts
    pub delay: DurationInput,

    /// Backoff strategy
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            delay: DurationInput::Millis(0),
            backoff: Backoff::Constant,
        }
    }
}

impl RetryConfig {
    /// Create a policy with the given retry budget and base delay
    pub fn new(limit: u32, delay: impl Into<DurationInput>) -> Self {
        Self {
            limit,
            delay: delay.into(),
            backoff: Backoff::Constant,
        }
    }

    /// Set the backoff strategy
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay in milliseconds before retry `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Result<u64, DurationError> {
        let base = self.delay.to_millis()?;
        Ok(match self.backoff {
            Backoff::Constant => base,
            Backoff::Exponential => {
                let shift = retry.saturating_sub(1).min(63);
                base.saturating_mul(1u64 << shift)
            }
        })
    }
}

/// Configuration for a work step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepConfig {
    /// Retry policy; omitted means one attempt, no retry
    pub retries: Option<RetryConfig>,

    /// Accepted for API compatibility; advisory, not enforced
    pub timeout: Option<DurationInput>,
}

impl StepConfig {
    /// Empty config: one attempt, no retry
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry policy
    pub fn with_retries(mut self, retries: RetryConfig) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the advisory timeout
    pub fn with_timeout(mut self, timeout: impl Into<DurationInput>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_single_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.limit, 0);
        assert_eq!(config.backoff, Backoff::Constant);
    }

    #[test]
    fn test_constant_delay() {
        let config = RetryConfig::new(5, 200u64);
        assert_eq!(config.delay_for_retry(1).unwrap(), 200);
        assert_eq!(config.delay_for_retry(4).unwrap(), 200);
    }

    #[test]
    fn test_exponential_delay_doubles() {
        let config = RetryConfig::new(4, 50u64).with_backoff(Backoff::Exponential);
        assert_eq!(config.delay_for_retry(1).unwrap(), 50);
        assert_eq!(config.delay_for_retry(2).unwrap(), 100);
        assert_eq!(config.delay_for_retry(3).unwrap(), 200);
        assert_eq!(config.delay_for_retry(4).unwrap(), 400);
    }

    #[test]
    fn test_string_delay_parsed() {
        let config = RetryConfig::new(1, "1 minute");
        assert_eq!(config.delay_for_retry(1).unwrap(), 60_000);
    }

    #[test]
    fn test_invalid_delay_surfaces() {
        let config = RetryConfig::new(1, "soon");
        assert!(config.delay_for_retry(1).is_err());
    }

    #[test]
    fn test_exponential_saturates() {
        let config = RetryConfig::new(200, u64::MAX).with_backoff(Backoff::Exponential);
        assert_eq!(config.delay_for_retry(100).unwrap(), u64::MAX);
    }
}
