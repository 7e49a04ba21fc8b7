#![forbid(unsafe_code)]

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use tracing::trace;
use url::Url;

use crate::{
    client::HttpClient,
    error::NetResult,
    retry::RetryNet,
    throughput::{MeteredNet, ThroughputObserver},
    timeout::TimeoutNet,
    traits::{Net, NetExt},
    types::{ByteRange, NetOptions},
};

/// Fetch facade for playback sessions.
///
/// Wraps a transport in the timeout, metering and retry layers. This is the
/// only component of the engine that touches the network.
pub struct SegmentFetcher<N> {
    net: Arc<N>,
}

impl SegmentFetcher<RetryNet<MeteredNet<TimeoutNet<HttpClient>>>> {
    /// Builds the default production stack: reqwest transport, whole-call
    /// timeout, per-attempt throughput metering, retry with exponential
    /// backoff. The meter sits inside the retry layer so a sample never
    /// includes backoff sleeps or failed attempts.
    #[must_use]
    pub fn with_default_stack(options: &NetOptions, observer: Arc<dyn ThroughputObserver>) -> Self {
        let net = HttpClient::new(options.clone())
            .with_timeout(options.request_timeout)
            .with_meter(observer)
            .with_retry(options.retry_policy.clone());
        Self::new(net)
    }
}

impl<N: Net> SegmentFetcher<N> {
    pub fn new(net: N) -> Self {
        Self { net: Arc::new(net) }
    }

    /// Fetch raw segment bytes, optionally limited to a byte range.
    pub async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> NetResult<Bytes> {
        let started = Instant::now();
        let bytes = match range {
            Some(range) => self.net.get_range(url.clone(), range).await?,
            None => self.net.get_bytes(url.clone()).await?,
        };
        trace!(
            url = %url,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reel-net: fetch complete"
        );
        Ok(bytes)
    }

    /// Fetch a text document (manifest or subtitle file).
    ///
    /// Byte sequences that are not valid UTF-8 are replaced rather than
    /// rejected; the parsers reject malformed lines with line numbers, which
    /// is more useful than a transport-level encoding error.
    pub async fn fetch_text(&self, url: &Url) -> NetResult<String> {
        let bytes = self.net.get_bytes(url.clone()).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<N> Clone for SegmentFetcher<N> {
    fn clone(&self) -> Self {
        Self {
            net: Arc::clone(&self.net),
        }
    }
}

#[cfg(test)]
mod tests {
    use unimock::{matching, MockFn, Unimock};

    use super::*;
    use crate::traits::NetMock;

    #[tokio::test]
    async fn whole_fetch_uses_get_bytes() {
        let mock = Unimock::new(
            NetMock::get_bytes
                .some_call(matching!(_))
                .returns(Ok(Bytes::from("whole"))),
        );
        let fetcher = SegmentFetcher::new(mock);

        let url = Url::parse("http://test.local/seg-0.ts").unwrap();
        let out = fetcher.fetch(&url, None).await.unwrap();
        assert_eq!(out, Bytes::from("whole"));
    }

    #[tokio::test]
    async fn ranged_fetch_uses_get_range() {
        let mock = Unimock::new(
            NetMock::get_range
                .some_call(matching!(_, _))
                .returns(Ok(Bytes::from("ranged"))),
        );
        let fetcher = SegmentFetcher::new(mock);

        let url = Url::parse("http://test.local/seg.ts").unwrap();
        let out = fetcher
            .fetch(&url, Some(ByteRange::new(0, Some(5))))
            .await
            .unwrap();
        assert_eq!(out, Bytes::from("ranged"));
    }

    #[tokio::test]
    async fn text_fetch_replaces_invalid_utf8() {
        let mock = Unimock::new(
            NetMock::get_bytes
                .some_call(matching!(_))
                .returns(Ok(Bytes::from(vec![b'#', 0xff, b'!']))),
        );
        let fetcher = SegmentFetcher::new(mock);

        let url = Url::parse("http://test.local/playlist.m3u8").unwrap();
        let out = fetcher.fetch_text(&url).await.unwrap();
        assert_eq!(out, "#\u{fffd}!");
    }
}
