#![forbid(unsafe_code)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{error::FetchError, traits::Net, types::ByteRange};

/// Receiver of per-transfer throughput measurements.
///
/// The metering layer reports exactly one measurement per successful
/// transfer; failed transfers report nothing. The ABR layer implements this
/// to feed its sliding sample window.
pub trait ThroughputObserver: Send + Sync {
    fn on_transfer(&self, bytes: u64, elapsed: Duration);
}

/// Measurement decorator for `Net` implementations.
///
/// Times each individual transport call and reports successful ones to the
/// observer. Sits below the retry layer, so a sample covers a single network
/// attempt and never the backoff sleeps around it.
pub struct MeteredNet<N> {
    inner: N,
    observer: Arc<dyn ThroughputObserver>,
}

impl<N: Net> MeteredNet<N> {
    pub fn new(inner: N, observer: Arc<dyn ThroughputObserver>) -> Self {
        Self { inner, observer }
    }

    async fn measure<Fut>(&self, fut: Fut) -> Result<Bytes, FetchError>
    where
        Fut: std::future::Future<Output = Result<Bytes, FetchError>>,
    {
        let started = Instant::now();
        let bytes = fut.await?;
        self.observer
            .on_transfer(bytes.len() as u64, started.elapsed());
        Ok(bytes)
    }
}

#[async_trait]
impl<N: Net> Net for MeteredNet<N> {
    async fn get_bytes(&self, url: Url) -> Result<Bytes, FetchError> {
        self.measure(self.inner.get_bytes(url)).await
    }

    async fn get_range(&self, url: Url, range: ByteRange) -> Result<Bytes, FetchError> {
        self.measure(self.inner.get_range(url, range)).await
    }
}
