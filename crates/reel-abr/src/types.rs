#![forbid(unsafe_code)]

use std::time::Duration;

/// A selectable rendition, as the controller sees it. `index` is the
/// variant's position in the manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Variant {
    pub index: usize,
    pub bandwidth_bps: u64,
}

/// Selection mode. `Manual` pins a variant and suspends automatic
/// switching until the mode returns to `Auto`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AbrMode {
    #[default]
    Auto,
    Manual(usize),
}

/// Tuning knobs for the switching policy.
#[derive(Clone, Debug)]
pub struct AbrOptions {
    /// Fraction of the estimated bandwidth a variant may consume. Leaves
    /// headroom for estimate error and bandwidth fluctuation.
    pub safety_factor: f64,
    /// Below this much buffered media, the controller drops to the lowest
    /// variant unconditionally.
    pub low_water: Duration,
    /// Max number of samples in the throughput window.
    pub window_size: usize,
    /// Samples older than this are evicted from the window.
    pub window_age: Duration,
    /// Consecutive decision cycles an up-switch candidate must persist
    /// before it is taken. Down-switches are immediate.
    pub up_switch_stable_cycles: u32,
    pub mode: AbrMode,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            safety_factor: 0.8,
            low_water: Duration::from_secs(5),
            window_size: 5,
            window_age: Duration::from_secs(30),
            up_switch_stable_cycles: 2,
            mode: AbrMode::Auto,
        }
    }
}

impl AbrOptions {
    pub fn with_safety_factor(mut self, factor: f64) -> Self {
        self.safety_factor = factor;
        self
    }

    pub fn with_low_water(mut self, low_water: Duration) -> Self {
        self.low_water = low_water;
        self
    }

    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    pub fn with_window_age(mut self, age: Duration) -> Self {
        self.window_age = age;
        self
    }

    pub fn with_up_switch_stable_cycles(mut self, cycles: u32) -> Self {
        self.up_switch_stable_cycles = cycles;
        self
    }

    pub fn with_mode(mut self, mode: AbrMode) -> Self {
        self.mode = mode;
        self
    }
}
