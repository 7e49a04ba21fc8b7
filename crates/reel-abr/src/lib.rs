//! Adaptive bitrate selection.
//!
//! [`ThroughputWindow`] keeps a sliding window of download samples and
//! estimates the sustainable bandwidth as their harmonic mean.
//! [`AbrController`] turns that estimate, the buffer level and the available
//! variants into switching decisions.

#![forbid(unsafe_code)]

mod controller;
mod estimator;
mod types;

pub use crate::{
    controller::{AbrController, AbrDecision, SwitchReason},
    estimator::{SharedEstimator, ThroughputSample, ThroughputWindow},
    types::{AbrMode, AbrOptions, Variant},
};
