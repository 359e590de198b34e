//! Duration parsing and wall-clock helpers.
//!
//! Durations cross the API boundary as raw millisecond counts or human
//! strings ("30 seconds", "1 hour"). Internally every wait is an absolute
//! epoch-millisecond deadline, so replays after a restart pick up exactly
//! where the original run left off.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Error type for duration and timestamp validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// The input did not match the duration grammar
    #[error("invalid duration: {0}")]
    Invalid(String),

    /// A sleep duration resolved to zero milliseconds
    #[error("sleep duration must be positive")]
    NonPositive,

    /// A sleep-until target that is not in the future
    #[error("timestamp must be in the future")]
    InPast,
}

/// A duration supplied by user code
///
/// Either a raw non-negative millisecond count or a human string such as
/// `"30 seconds"` or `"1 hour"`.
///
/// # Example
///
/// ```
/// use holdfast::duration::DurationInput;
///
/// assert_eq!(DurationInput::from(1500u64).to_millis().unwrap(), 1500);
/// assert_eq!(DurationInput::from("2 minutes").to_millis().unwrap(), 120_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurationInput {
    /// Milliseconds
    Millis(u64),
    /// Human string, parsed by [`parse_duration`]
    Text(String),
}

impl DurationInput {
    /// Resolve to milliseconds
    pub fn to_millis(&self) -> Result<u64, DurationError> {
        match self {
            Self::Millis(millis) => Ok(*millis),
            Self::Text(text) => parse_duration(text),
        }
    }
}

impl From<u64> for DurationInput {
    fn from(millis: u64) -> Self {
        Self::Millis(millis)
    }
}

impl From<&str> for DurationInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for DurationInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Target accepted by `sleep_until`: a date or a seconds-since-epoch numeric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTarget {
    /// An absolute point in time
    Date(DateTime<Utc>),
    /// Seconds since the Unix epoch
    EpochSeconds(i64),
}

impl SleepTarget {
    /// The target as epoch milliseconds
    pub fn epoch_millis(&self) -> i64 {
        match self {
            Self::Date(date) => date.timestamp_millis(),
            Self::EpochSeconds(seconds) => seconds.saturating_mul(1000),
        }
    }
}

impl From<DateTime<Utc>> for SleepTarget {
    fn from(date: DateTime<Utc>) -> Self {
        Self::Date(date)
    }
}

impl From<i64> for SleepTarget {
    fn from(seconds: i64) -> Self {
        Self::EpochSeconds(seconds)
    }
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*(second|minute|hour|day)s?\s*$").expect("valid duration pattern")
    })
}

/// Parse a human duration string into milliseconds
///
/// Accepts `"<count> <unit>"` where the unit is `second`, `minute`, `hour`
/// or `day`, with an optional plural `s`.
pub fn parse_duration(text: &str) -> Result<u64, DurationError> {
    let captures = duration_pattern()
        .captures(text)
        .ok_or_else(|| DurationError::Invalid(text.to_string()))?;

    let count: u64 = captures[1]
        .parse()
        .map_err(|_| DurationError::Invalid(text.to_string()))?;

    let unit_millis: u64 = match &captures[2] {
        "second" => 1_000,
        "minute" => 60_000,
        "hour" => 3_600_000,
        "day" => 86_400_000,
        _ => unreachable!("pattern restricts units"),
    };

    Ok(count.saturating_mul(unit_millis))
}

/// Current wall-clock time as epoch milliseconds
pub(crate) fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("30 seconds").unwrap(), 30_000);
        assert_eq!(parse_duration("1 second").unwrap(), 1_000);
        assert_eq!(parse_duration("5 minutes").unwrap(), 300_000);
        assert_eq!(parse_duration("1 hour").unwrap(), 3_600_000);
        assert_eq!(parse_duration("2 days").unwrap(), 172_800_000);
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(parse_duration("  10  seconds  ").unwrap(), 10_000);
        assert_eq!(parse_duration("10seconds").unwrap(), 10_000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("ten seconds").is_err());
        assert!(parse_duration("10 fortnights").is_err());
        assert!(parse_duration("-5 seconds").is_err());
        assert!(parse_duration("1.5 hours").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_millis_passthrough() {
        assert_eq!(DurationInput::from(0u64).to_millis().unwrap(), 0);
        assert_eq!(DurationInput::from(86_400_000u64).to_millis().unwrap(), 86_400_000);
    }

    #[test]
    fn test_text_input() {
        let input: DurationInput = "1 minute".into();
        assert_eq!(input.to_millis().unwrap(), 60_000);

        let input: DurationInput = "bogus".into();
        assert!(input.to_millis().is_err());
    }

    #[test]
    fn test_sleep_target_seconds_scaled() {
        let target = SleepTarget::from(1_700_000_000i64);
        assert_eq!(target.epoch_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_sleep_target_date() {
        let date = Utc::now();
        let target = SleepTarget::from(date);
        assert_eq!(target.epoch_millis(), date.timestamp_millis());
    }
}
