#![forbid(unsafe_code)]

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::{
    error::FetchError,
    traits::Net,
    types::{ByteRange, RetryPolicy},
};

/// Retry decorator for `Net` implementations.
///
/// Transient failures (timeouts, connection failures, retryable HTTP
/// statuses) are retried up to `policy.max_retries` times with exponential
/// backoff. Non-retryable errors are returned immediately.
pub struct RetryNet<N> {
    inner: N,
    policy: RetryPolicy,
}

impl<N: Net> RetryNet<N> {
    pub fn new(inner: N, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, url: &Url, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=self.policy.max_retries {
            let delay = self.policy.delay_for_attempt(attempt);
            if delay > std::time::Duration::ZERO {
                sleep(delay).await;
            }

            match op().await {
                Ok(out) => return Ok(out),
                Err(error) => {
                    if !error.is_retryable() || attempt == self.policy.max_retries {
                        return Err(error);
                    }
                    debug!(
                        url = %url,
                        attempt,
                        max_retries = self.policy.max_retries,
                        error = %error,
                        "reel-net: transient fetch failure, will retry"
                    );
                    last_error = Some(error);
                }
            }
        }

        // Unreachable: the loop always returns from its last iteration.
        Err(last_error.unwrap_or(FetchError::Timeout))
    }
}

#[async_trait]
impl<N: Net> Net for RetryNet<N> {
    async fn get_bytes(&self, url: Url) -> Result<Bytes, FetchError> {
        self.run(&url, || self.inner.get_bytes(url.clone())).await
    }

    async fn get_range(&self, url: Url, range: ByteRange) -> Result<Bytes, FetchError> {
        self.run(&url, || self.inner.get_range(url.clone(), range))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use unimock::{matching, MockFn, Unimock};

    use super::*;
    use crate::traits::NetMock;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn success_on_first_try() {
        let mock = Unimock::new(
            NetMock::get_bytes
                .some_call(matching!(_))
                .returns(Ok(Bytes::from("success"))),
        );
        let retry_net = RetryNet::new(mock, fast_policy(3));

        let url = Url::parse("http://test.local/a.ts").unwrap();
        let result = retry_net.get_bytes(url).await;

        assert!(result.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn three_connection_failures_then_success() {
        let mock = Unimock::new((
            NetMock::get_bytes
                .next_call(matching!(_))
                .returns(Err(FetchError::ConnectionFailed("reset".into()))),
            NetMock::get_bytes
                .next_call(matching!(_))
                .returns(Err(FetchError::ConnectionFailed("reset".into()))),
            NetMock::get_bytes
                .next_call(matching!(_))
                .returns(Err(FetchError::ConnectionFailed("reset".into()))),
            NetMock::get_bytes
                .next_call(matching!(_))
                .returns(Ok(Bytes::from("success"))),
        ));
        let retry_net = RetryNet::new(mock, fast_policy(3));

        let url = Url::parse("http://test.local/a.ts").unwrap();
        let result = retry_net.get_bytes(url).await;

        // Three retries after the initial attempt, then success.
        assert_eq!(result.unwrap(), Bytes::from("success"));
    }

    #[rstest]
    #[tokio::test]
    async fn retries_exhausted_returns_last_error() {
        let mock = Unimock::new(
            NetMock::get_bytes
                .each_call(matching!(_))
                .returns(Err(FetchError::Timeout)),
        );
        let retry_net = RetryNet::new(mock, fast_policy(2));

        let url = Url::parse("http://test.local/a.ts").unwrap();
        let result = retry_net.get_bytes(url).await;

        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[rstest]
    #[tokio::test]
    async fn not_found_is_not_retried() {
        let mock = Unimock::new(
            NetMock::get_bytes
                .some_call(matching!(_))
                .returns(Err(FetchError::not_found("http://test.local/a.ts"))),
        );
        let retry_net = RetryNet::new(mock, fast_policy(3));

        let url = Url::parse("http://test.local/a.ts").unwrap();
        let result = retry_net.get_bytes(url).await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn client_rejection_is_not_retried() {
        let mock = Unimock::new(
            NetMock::get_range
                .some_call(matching!(_, _))
                .returns(Err(FetchError::rejected(403, "http://test.local/a.ts"))),
        );
        let retry_net = RetryNet::new(mock, fast_policy(3));

        let url = Url::parse("http://test.local/a.ts").unwrap();
        let result = retry_net.get_range(url, ByteRange::from_start(0)).await;

        assert!(matches!(
            result,
            Err(FetchError::Rejected { status: 403, .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn server_error_is_retried() {
        let mock = Unimock::new((
            NetMock::get_bytes
                .next_call(matching!(_))
                .returns(Err(FetchError::rejected(503, "http://test.local/a.ts"))),
            NetMock::get_bytes
                .next_call(matching!(_))
                .returns(Ok(Bytes::from("recovered"))),
        ));
        let retry_net = RetryNet::new(mock, fast_policy(3));

        let url = Url::parse("http://test.local/a.ts").unwrap();
        let result = retry_net.get_bytes(url).await;

        assert_eq!(result.unwrap(), Bytes::from("recovered"));
    }
}
