#![forbid(unsafe_code)]

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use url::Url;

use crate::{
    error::{FetchError, NetResult},
    traits::Net,
    types::{ByteRange, NetOptions},
};

/// HTTP transport built on reqwest.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    fn map_status(url: &Url, status: reqwest::StatusCode) -> Option<FetchError> {
        if status.is_success() {
            return None;
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Some(FetchError::not_found(url.as_str()));
        }
        Some(FetchError::rejected(status.as_u16(), url.as_str()))
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_bytes(&self, url: Url) -> NetResult<Bytes> {
        let req = self
            .inner
            .get(url.clone())
            .timeout(self.options.request_timeout);

        let resp = req.send().await.map_err(FetchError::from)?;
        if let Some(err) = Self::map_status(&url, resp.status()) {
            return Err(err);
        }

        resp.bytes().await.map_err(FetchError::from)
    }

    async fn get_range(&self, url: Url, range: ByteRange) -> NetResult<Bytes> {
        let req = self
            .inner
            .get(url.clone())
            .header("Range", range.to_header_value())
            .timeout(self.options.request_timeout);

        let resp = req.send().await.map_err(FetchError::from)?;
        let status = resp.status();
        // 206 is the expected answer for a ranged request; a plain 200 means
        // the server ignored the Range header, which is still usable bytes.
        if !(status.is_success() || status == reqwest::StatusCode::PARTIAL_CONTENT) {
            if let Some(err) = Self::map_status(&url, status) {
                return Err(err);
            }
        }

        resp.bytes().await.map_err(FetchError::from)
    }
}
