//! Adaptive spins-per-delay estimation.
//!
//! On a uniprocessor, spinning on a held lock is wasted work: the holder
//! cannot make progress until the waiter gives up the CPU. On a
//! multiprocessor it is usually cheaper to spin a little longer than to go to
//! sleep. A [`SpinEstimate`] tracks which of those situations an execution
//! context appears to be in:
//!
//! - acquiring a contended lock *without* sleeping suggests other cores are
//!   available, and raises the estimate quickly (by 100);
//! - having to sleep suggests the opposite (but not conclusively), and lowers
//!   it slowly (by 1).
//!
//! The estimate should converge to [`Config::min_spins`] on a uniprocessor
//! and [`Config::max_spins`] on a multiprocessor.
//!
//! Contended acquisitions are rare, so a single short-lived context may never
//! see enough of them to converge. Contexts therefore share their
//! observations through a value owned by the enclosing runtime: seed from it
//! with [`SpinEstimate::set_estimate`] when starting, and fold the local
//! estimate back into it with [`SpinEstimate::fold_estimate`] when exiting.
use crate::config::{Config, ConfigError};

/// Amount the estimate grows by after a contended acquisition that never
/// slept.
const SPIN_SUCCESS_INCREMENT: u32 = 100;

/// Amount the estimate shrinks by after a contended acquisition that slept.
const SLEEP_DECREMENT: u32 = 1;

/// A context-local estimate of how many times to spin on a contended lock
/// before sleeping.
///
/// The estimate always lies within `min_spins..=max_spins` of the [`Config`]
/// it was created with.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SpinEstimate {
    spins: u32,
    min: u32,
    max: u32,
}

/// Folds a context-local estimate into the shared estimate.
///
/// This is an exponential moving average with a slow adaptation rate, so
/// that noise from any one context does not move the shared value much:
/// `(shared * 15 + local) / 16`. If both inputs lie within the configured
/// bounds, so does the result.
///
/// The division truncates rather than rounds. This lets a single adjustment
/// inside one context still move the shared value, which matters for the
/// asymmetric adjustment rules.
///
/// # Examples
///
/// ```
/// use hyphae::estimate::fold_estimate;
///
/// assert_eq!(fold_estimate(100, 100), 100);
/// assert_eq!(fold_estimate(1000, 10), 938);
/// assert_eq!(fold_estimate(10, 1000), 71);
/// ```
#[must_use]
pub const fn fold_estimate(shared: u32, local: u32) -> u32 {
    ((shared as u64 * 15 + local as u64) / 16) as u32
}

// === impl SpinEstimate ===

impl SpinEstimate {
    /// Returns a new estimate starting at `config.initial_spins`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` does not pass
    /// [`Config::validate`].
    pub const fn new(config: &Config) -> Result<Self, ConfigError> {
        match config.validate() {
            Ok(config) => Ok(Self::new_unchecked(&config)),
            Err(error) => Err(error),
        }
    }

    /// `config` must be valid.
    const fn new_unchecked(config: &Config) -> Self {
        Self {
            spins: config.initial_spins,
            min: config.min_spins,
            max: config.max_spins,
        }
    }

    /// Returns the current number of spins per delay.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.spins
    }

    /// Seeds this estimate from the shared estimate.
    ///
    /// This is intended to be called once, when an execution context starts.
    /// Values outside the configured bounds are clamped into them.
    pub fn set_estimate(&mut self, shared: u32) {
        self.spins = shared.clamp(self.min, self.max);
        tracing::debug!(shared, spins_per_delay = self.spins, "seeded spin estimate");
    }

    /// Returns the new shared estimate, after folding this estimate into
    /// `shared`.
    ///
    /// This is intended to be called once, when an execution context exits.
    /// The caller is responsible for storing the result back into the shared
    /// slot, under whatever lock protects it.
    #[must_use]
    pub fn fold_estimate(&self, shared: u32) -> u32 {
        let folded = fold_estimate(shared, self.spins);
        tracing::debug!(
            shared,
            spins_per_delay = self.spins,
            folded,
            "folded spin estimate"
        );
        folded
    }

    /// Updates the estimate after a contended acquisition completes.
    ///
    /// `slept` is whether the waiter had to sleep at least once before
    /// acquiring the lock.
    pub fn record(&mut self, slept: bool) {
        let prev = self.spins;
        if slept {
            if self.spins > self.min {
                self.spins = self.spins.saturating_sub(SLEEP_DECREMENT).max(self.min);
            }
        } else if self.spins < self.max {
            self.spins = self.spins.saturating_add(SPIN_SUCCESS_INCREMENT).min(self.max);
        }
        tracing::trace!(slept, prev, spins_per_delay = self.spins, "adjusted spin estimate");
    }
}

impl Default for SpinEstimate {
    fn default() -> Self {
        Self::new_unchecked(&Config::DEFAULT)
    }
}
