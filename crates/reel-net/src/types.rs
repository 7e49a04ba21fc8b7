#![forbid(unsafe_code)]

use std::{cmp::min, time::Duration};

/// Byte range of a media segment within a larger resource.
///
/// Maps to an HTTP `Range` request header. `end` is inclusive, matching the
/// header semantics; `None` means "to the end of the resource".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Length in bytes, if the range is bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|e| e.saturating_sub(self.start) + 1)
    }

    pub fn to_header_value(&self) -> String {
        if let Some(end) = self.end {
            format!("bytes={}-{}", self.start, end)
        } else {
            format!("bytes={}-", self.start)
        }
    }
}

/// Exponential backoff retry schedule for transient fetch failures.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before the given attempt. Attempt 0 is the initial request and
    /// is never delayed; each following attempt doubles the base delay,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponential = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
        min(exponential, self.max_delay)
    }
}

/// Network configuration for the fetch layer.
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Per-request timeout, enforced on every fetch.
    pub request_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// Max idle connections per host. Set to 0 to disable pooling.
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
            pool_max_idle_per_host: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::bounded(0, Some(99), "bytes=0-99")]
    #[case::open_ended(512, None, "bytes=512-")]
    #[case::single_byte(10, Some(10), "bytes=10-10")]
    fn byte_range_header_value(
        #[case] start: u64,
        #[case] end: Option<u64>,
        #[case] expected: &str,
    ) {
        assert_eq!(ByteRange::new(start, end).to_header_value(), expected);
    }

    #[test]
    fn byte_range_len() {
        assert_eq!(ByteRange::new(0, Some(99)).len(), Some(100));
        assert_eq!(ByteRange::from_start(5).len(), None);
    }

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(1, Duration::from_millis(500))]
    #[case(2, Duration::from_secs(1))]
    #[case(3, Duration::from_secs(2))]
    #[case(4, Duration::from_secs(4))]
    #[case(5, Duration::from_secs(4))] // capped at max_delay
    #[case(12, Duration::from_secs(4))]
    fn backoff_schedule(#[case] attempt: u32, #[case] expected: Duration) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(attempt), expected);
    }

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(4));
    }
}
