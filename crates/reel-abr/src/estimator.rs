//! Sliding-window throughput estimation.

#![forbid(unsafe_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use reel_net::ThroughputObserver;
use tracing::trace;

/// One completed transfer.
#[derive(Clone, Copy, Debug)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub elapsed: Duration,
    pub at: Instant,
}

impl ThroughputSample {
    /// Observed rate in bits per second.
    fn bps(&self) -> f64 {
        (self.bytes * 8) as f64 / self.elapsed.as_secs_f64()
    }
}

/// Sliding window of transfer samples, bounded by count and by age.
///
/// The estimate is the harmonic mean of the per-sample rates. The harmonic
/// mean weights slow transfers more heavily than an arithmetic mean would,
/// which keeps one lucky burst from masking a congested link.
#[derive(Debug)]
pub struct ThroughputWindow {
    samples: VecDeque<ThroughputSample>,
    max_samples: usize,
    max_age: Duration,
}

impl ThroughputWindow {
    pub fn new(max_samples: usize, max_age: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            max_age,
        }
    }

    pub fn push(&mut self, bytes: u64, elapsed: Duration, at: Instant) {
        if bytes == 0 || elapsed.is_zero() {
            // Degenerate sample, no rate to learn from.
            return;
        }
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(ThroughputSample { bytes, elapsed, at });
    }

    /// Harmonic mean of the samples still inside the age bound, or `None`
    /// when the window is empty.
    pub fn estimate_bps(&mut self, now: Instant) -> Option<f64> {
        self.evict_stale(now);
        if self.samples.is_empty() {
            return None;
        }

        let reciprocal_sum: f64 = self.samples.iter().map(|s| 1.0 / s.bps()).sum();
        Some(self.samples.len() as f64 / reciprocal_sum)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    fn evict_stale(&mut self, now: Instant) {
        while let Some(oldest) = self.samples.front() {
            if now.duration_since(oldest.at) <= self.max_age {
                break;
            }
            self.samples.pop_front();
        }
    }
}

/// Shared handle over a [`ThroughputWindow`].
///
/// Implements [`ThroughputObserver`] so the fetch layer can feed samples in
/// while the controller reads estimates out.
#[derive(Clone, Debug)]
pub struct SharedEstimator {
    window: Arc<Mutex<ThroughputWindow>>,
}

impl SharedEstimator {
    pub fn new(max_samples: usize, max_age: Duration) -> Self {
        Self {
            window: Arc::new(Mutex::new(ThroughputWindow::new(max_samples, max_age))),
        }
    }

    pub fn estimate_bps(&self, now: Instant) -> Option<f64> {
        self.lock().estimate_bps(now)
    }

    pub fn sample_count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThroughputWindow> {
        // Nothing holds the lock across await points, poisoning means a
        // panic already tore the process state apart.
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ThroughputObserver for SharedEstimator {
    fn on_transfer(&self, bytes: u64, elapsed: Duration) {
        trace!(bytes, ?elapsed, "reel-abr: throughput sample");
        self.lock().push(bytes, elapsed, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> ThroughputWindow {
        ThroughputWindow::new(5, Duration::from_secs(30))
    }

    /// bytes such that one second of transfer equals `mbps` megabits.
    fn mb_bytes(mbps: f64) -> u64 {
        (mbps * 1_000_000.0 / 8.0) as u64
    }

    #[test]
    fn empty_window_has_no_estimate() {
        assert_eq!(window().estimate_bps(Instant::now()), None);
    }

    #[test]
    fn single_sample_estimate_is_its_rate() {
        let mut w = window();
        let now = Instant::now();
        w.push(mb_bytes(2.0), Duration::from_secs(1), now);

        let est = w.estimate_bps(now).unwrap();
        assert!((est - 2_000_000.0).abs() < 1.0);
    }

    #[test]
    fn harmonic_mean_weights_slow_samples() {
        let mut w = window();
        let now = Instant::now();
        w.push(mb_bytes(1.0), Duration::from_secs(1), now);
        w.push(mb_bytes(4.0), Duration::from_secs(1), now);

        // Harmonic mean of 1 and 4 Mbps is 1.6, not the arithmetic 2.5.
        let est = w.estimate_bps(now).unwrap();
        assert!((est - 1_600_000.0).abs() < 1.0);
    }

    #[test]
    fn window_is_bounded_by_count() {
        let mut w = window();
        let now = Instant::now();
        for _ in 0..5 {
            w.push(mb_bytes(1.0), Duration::from_secs(1), now);
        }
        w.push(mb_bytes(8.0), Duration::from_secs(1), now);

        assert_eq!(w.len(), 5);
        // The oldest 1 Mbps sample was evicted, so the estimate moves up.
        let est = w.estimate_bps(now).unwrap();
        assert!(est > 1_000_000.0);
    }

    #[test]
    fn stale_samples_are_evicted_by_age() {
        let mut w = window();
        let start = Instant::now();
        w.push(mb_bytes(1.0), Duration::from_secs(1), start);

        let later = start + Duration::from_secs(31);
        assert_eq!(w.estimate_bps(later), None);
        assert!(w.is_empty());
    }

    #[test]
    fn degenerate_samples_are_ignored() {
        let mut w = window();
        let now = Instant::now();
        w.push(0, Duration::from_secs(1), now);
        w.push(1000, Duration::ZERO, now);
        assert!(w.is_empty());
    }

    #[test]
    fn shared_estimator_records_observer_samples() {
        let est = SharedEstimator::new(5, Duration::from_secs(30));
        est.on_transfer(mb_bytes(2.0), Duration::from_secs(1));

        assert_eq!(est.sample_count(), 1);
        let bps = est.estimate_bps(Instant::now()).unwrap();
        assert!((bps - 2_000_000.0).abs() < 10_000.0);
    }
}
