#![forbid(unsafe_code)]

mod client;
mod error;
mod fetcher;
mod retry;
mod throughput;
mod timeout;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{FetchError, NetResult},
    fetcher::SegmentFetcher,
    retry::RetryNet,
    throughput::{MeteredNet, ThroughputObserver},
    timeout::TimeoutNet,
    traits::{Net, NetExt},
    types::{ByteRange, NetOptions, RetryPolicy},
};
