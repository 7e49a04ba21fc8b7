//! Variant switching policy.

#![forbid(unsafe_code)]

use std::time::Duration;

use tracing::{debug, info};

use crate::types::{AbrMode, AbrOptions, Variant};

/// Why a decision picked its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchReason {
    /// A manual override pins the variant.
    ManualOverride,
    /// The buffer fell below the low-water mark.
    LowBuffer,
    /// No throughput samples yet, holding the current variant.
    NoEstimate,
    /// Sustained headroom justified moving up.
    UpSwitch,
    /// An up-switch candidate exists but has not been stable long enough.
    UpSwitchPending,
    /// The estimate no longer sustains the current variant.
    DownSwitch,
    /// The current variant is already the best sustainable one.
    AlreadyOptimal,
}

/// Outcome of one decision cycle. `changed` is true when `target` differs
/// from the current variant and the switch should be taken now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbrDecision {
    pub target: usize,
    pub reason: SwitchReason,
    pub changed: bool,
}

/// Picks the variant to fetch next. Evaluated once per control cycle;
/// the caller applies the decision by re-pointing its fetch position and
/// calling [`AbrController::apply`].
#[derive(Debug)]
pub struct AbrController {
    options: AbrOptions,
    current: usize,
    /// Up-switch hysteresis: the candidate proposed last cycle and how many
    /// consecutive cycles it has persisted.
    up_candidate: Option<(usize, u32)>,
}

impl AbrController {
    pub fn new(options: AbrOptions, initial_variant: usize) -> Self {
        Self {
            options,
            current: initial_variant,
            up_candidate: None,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn mode(&self) -> AbrMode {
        self.options.mode
    }

    pub fn set_mode(&mut self, mode: AbrMode) {
        if self.options.mode != mode {
            info!(?mode, "reel-abr: mode changed");
            self.options.mode = mode;
            self.up_candidate = None;
        }
    }

    /// Evaluates one decision cycle.
    ///
    /// `variants` must be non-empty and indexed consistently with the
    /// controller's current variant. Down-switches and low-buffer drops take
    /// effect immediately; up-switches must persist for
    /// `up_switch_stable_cycles` consecutive cycles first.
    pub fn decide(
        &mut self,
        variants: &[Variant],
        buffer_ahead: Duration,
        estimate_bps: Option<f64>,
    ) -> AbrDecision {
        if let AbrMode::Manual(pinned) = self.options.mode {
            let target = pinned.min(variants.len().saturating_sub(1));
            self.up_candidate = None;
            return self.decision(target, SwitchReason::ManualOverride);
        }

        if buffer_ahead < self.options.low_water {
            let target = lowest_variant(variants);
            self.up_candidate = None;
            return self.decision(target, SwitchReason::LowBuffer);
        }

        let Some(estimate) = estimate_bps else {
            self.up_candidate = None;
            return self.decision(self.current, SwitchReason::NoEstimate);
        };

        let best = best_sustainable(variants, estimate * self.options.safety_factor);
        let current_bw = bandwidth_of(variants, self.current);
        let best_bw = bandwidth_of(variants, best);

        if best == self.current {
            self.up_candidate = None;
            return self.decision(best, SwitchReason::AlreadyOptimal);
        }

        if best_bw < current_bw {
            self.up_candidate = None;
            return self.decision(best, SwitchReason::DownSwitch);
        }

        // Higher variant affordable. Require it to persist before switching.
        let streak = match self.up_candidate {
            Some((candidate, n)) if candidate == best => n + 1,
            _ => 1,
        };
        self.up_candidate = Some((best, streak));

        if streak >= self.options.up_switch_stable_cycles {
            self.decision(best, SwitchReason::UpSwitch)
        } else {
            debug!(
                candidate = best,
                streak, "reel-abr: up-switch pending stability"
            );
            AbrDecision {
                target: self.current,
                reason: SwitchReason::UpSwitchPending,
                changed: false,
            }
        }
    }

    /// Commits a taken decision.
    pub fn apply(&mut self, decision: &AbrDecision) {
        if decision.changed {
            info!(
                from = self.current,
                to = decision.target,
                reason = ?decision.reason,
                "reel-abr: switching variant"
            );
            self.current = decision.target;
            self.up_candidate = None;
        }
    }

    fn decision(&self, target: usize, reason: SwitchReason) -> AbrDecision {
        AbrDecision {
            target,
            reason,
            changed: target != self.current,
        }
    }
}

fn lowest_variant(variants: &[Variant]) -> usize {
    variants
        .iter()
        .min_by_key(|v| v.bandwidth_bps)
        .map(|v| v.index)
        .unwrap_or(0)
}

/// Highest-bandwidth variant not exceeding `budget_bps`, or the lowest
/// variant when none fits.
fn best_sustainable(variants: &[Variant], budget_bps: f64) -> usize {
    variants
        .iter()
        .filter(|v| (v.bandwidth_bps as f64) <= budget_bps)
        .max_by_key(|v| v.bandwidth_bps)
        .map(|v| v.index)
        .unwrap_or_else(|| lowest_variant(variants))
}

fn bandwidth_of(variants: &[Variant], index: usize) -> u64 {
    variants
        .iter()
        .find(|v| v.index == index)
        .map(|v| v.bandwidth_bps)
        .unwrap_or(0)
}
