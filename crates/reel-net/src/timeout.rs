#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{error::FetchError, traits::Net, types::ByteRange};

/// Timeout decorator for `Net` implementations.
///
/// Bounds the whole call, including connection setup and body transfer, so a
/// stuck transfer surfaces as `FetchError::Timeout` instead of hanging the
/// session's control loop.
pub struct TimeoutNet<N> {
    inner: N,
    timeout: Duration,
}

impl<N: Net> TimeoutNet<N> {
    pub fn new(inner: N, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<N: Net> Net for TimeoutNet<N> {
    async fn get_bytes(&self, url: Url) -> Result<Bytes, FetchError> {
        tokio::time::timeout(self.timeout, self.inner.get_bytes(url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn get_range(&self, url: Url, range: ByteRange) -> Result<Bytes, FetchError> {
        tokio::time::timeout(self.timeout, self.inner.get_range(url, range))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use unimock::{matching, MockFn, Unimock};

    use super::*;
    use crate::traits::NetMock;

    #[tokio::test]
    async fn passes_through_fast_responses() {
        let mock = Unimock::new(
            NetMock::get_bytes
                .some_call(matching!(_))
                .returns(Ok(Bytes::from("payload"))),
        );
        let net = TimeoutNet::new(mock, Duration::from_secs(1));

        let url = Url::parse("http://test.local/seg.ts").unwrap();
        let out = net.get_bytes(url).await.unwrap();
        assert_eq!(out, Bytes::from("payload"));
    }
}
