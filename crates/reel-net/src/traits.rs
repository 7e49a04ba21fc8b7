#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{
    error::FetchError,
    retry::RetryNet,
    throughput::{MeteredNet, ThroughputObserver},
    timeout::TimeoutNet,
    types::{ByteRange, RetryPolicy},
};

/// Low-level byte transport.
///
/// Implemented by [`crate::HttpClient`] for real traffic and by in-memory
/// fakes in tests. Decorators ([`TimeoutNet`], [`RetryNet`]) wrap any `Net`.
#[cfg_attr(test, unimock::unimock(api = NetMock))]
#[async_trait]
pub trait Net: Send + Sync {
    /// Get all bytes from a URL.
    async fn get_bytes(&self, url: Url) -> Result<Bytes, FetchError>;

    /// Get a byte range from a URL.
    async fn get_range(&self, url: Url, range: ByteRange) -> Result<Bytes, FetchError>;
}

pub trait NetExt: Net + Sized {
    /// Add a whole-call timeout layer.
    fn with_timeout(self, timeout: Duration) -> TimeoutNet<Self> {
        TimeoutNet::new(self, timeout)
    }

    /// Add a retry layer for transient failures.
    fn with_retry(self, policy: RetryPolicy) -> RetryNet<Self> {
        RetryNet::new(self, policy)
    }

    /// Add per-call throughput measurement.
    fn with_meter(self, observer: Arc<dyn ThroughputObserver>) -> MeteredNet<Self> {
        MeteredNet::new(self, observer)
    }
}

impl<T: Net> NetExt for T {}
