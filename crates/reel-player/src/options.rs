#![forbid(unsafe_code)]

use std::time::Duration;

use reel_abr::{AbrMode, AbrOptions};
use reel_net::NetOptions;

/// Session configuration. Defaults follow the tuning the engine ships with;
/// every knob has a `with_` builder.
#[derive(Clone, Debug)]
pub struct PlayerOptions {
    /// How much media to keep buffered ahead of the playhead.
    pub target_buffer: Duration,
    /// Below this much buffered media the session is considered at stall
    /// risk: ABR drops to the lowest variant and a stalled session only
    /// recovers once buffered-ahead rises back above it.
    pub low_water: Duration,
    /// Remaining `Stalled` longer than this escalates to `Errored`.
    pub max_stall: Duration,
    /// Step applied by `skip_forward` / `skip_back`.
    pub skip_step: Duration,
    pub throughput_window_size: usize,
    pub throughput_window_age: Duration,
    pub abr_safety_factor: f64,
    pub abr_up_switch_stable_cycles: u32,
    pub abr_mode: AbrMode,
    pub net: NetOptions,
    /// Capacity of the media chunk channel handed to the host sink.
    pub chunk_capacity: usize,
    /// Capacity of the broadcast event channel.
    pub event_capacity: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            target_buffer: Duration::from_secs(30),
            low_water: Duration::from_secs(5),
            max_stall: Duration::from_secs(15),
            skip_step: Duration::from_secs(10),
            throughput_window_size: 5,
            throughput_window_age: Duration::from_secs(30),
            abr_safety_factor: 0.8,
            abr_up_switch_stable_cycles: 2,
            abr_mode: AbrMode::Auto,
            net: NetOptions::default(),
            chunk_capacity: 16,
            event_capacity: 64,
        }
    }
}

impl PlayerOptions {
    pub fn with_target_buffer(mut self, target: Duration) -> Self {
        self.target_buffer = target;
        self
    }

    pub fn with_low_water(mut self, low_water: Duration) -> Self {
        self.low_water = low_water;
        self
    }

    pub fn with_max_stall(mut self, max_stall: Duration) -> Self {
        self.max_stall = max_stall;
        self
    }

    pub fn with_skip_step(mut self, step: Duration) -> Self {
        self.skip_step = step;
        self
    }

    pub fn with_throughput_window_size(mut self, size: usize) -> Self {
        self.throughput_window_size = size;
        self
    }

    pub fn with_abr_safety_factor(mut self, factor: f64) -> Self {
        self.abr_safety_factor = factor;
        self
    }

    pub fn with_abr_mode(mut self, mode: AbrMode) -> Self {
        self.abr_mode = mode;
        self
    }

    pub fn with_net(mut self, net: NetOptions) -> Self {
        self.net = net;
        self
    }

    pub(crate) fn abr_options(&self) -> AbrOptions {
        AbrOptions::default()
            .with_safety_factor(self.abr_safety_factor)
            .with_low_water(self.low_water)
            .with_window_size(self.throughput_window_size)
            .with_window_age(self.throughput_window_age)
            .with_up_switch_stable_cycles(self.abr_up_switch_stable_cycles)
            .with_mode(self.abr_mode)
    }
}
