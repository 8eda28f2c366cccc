//! Randomized sleep backoff for contended spinlocks.
//!
//! Once a waiter has spun for its whole budget without acquiring the lock, it
//! starts sleeping between bursts of spinning. The first sleep is
//! [`Config::min_delay_ms`]. Each subsequent sleep grows by a random factor
//! between 1x and 2x, until it would exceed [`Config::max_delay_ms`], at which
//! point it wraps back around to the minimum.
//!
//! A holder that has been deprioritized by the scheduler may not run again
//! until every waiter is asleep, so the delay has to grow. It must not settle
//! on a single value either, or every waiter ends up waking at once.
use crate::config::Config;
use rand::Rng;

/// Returns the next sleep duration, in milliseconds, after `current_ms`.
///
/// `frac` is a uniformly distributed random fraction in `[0, 1)`. If
/// `current_ms` is 0 (no sleep has happened yet), the result is
/// [`Config::min_delay_ms`]. Otherwise the delay grows by `current_ms * frac`,
/// rounded to the nearest millisecond, and wraps to `min_delay_ms` if it
/// would exceed [`Config::max_delay_ms`].
///
/// # Examples
///
/// ```
/// use hyphae::{backoff::next_delay, Config};
///
/// let config = Config::DEFAULT;
/// assert_eq!(next_delay(0, 0.7, &config), 1);
/// assert_eq!(next_delay(10, 0.0, &config), 10);
/// assert_eq!(next_delay(10, 0.99, &config), 20);
/// assert_eq!(next_delay(900, 0.5, &config), 1);
/// ```
#[must_use]
pub fn next_delay(current_ms: u32, frac: f64, config: &Config) -> u32 {
    if current_ms == 0 {
        return config.min_delay_ms;
    }

    let grow = (f64::from(current_ms) * frac + 0.5) as u32;
    match current_ms.checked_add(grow) {
        Some(next) if next <= config.max_delay_ms => next,
        _ => config.min_delay_ms,
    }
}

/// The state of one contended acquisition.
///
/// A new `Backoff` is created every time a [`SpinContext`] enters the slow
/// path, and the final state is returned to the caller once the lock is
/// acquired.
///
/// [`SpinContext`]: crate::SpinContext
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Backoff {
    spins: u32,
    delays: u32,
    cur_delay_ms: u32,
}

/// What a waiter should do after a failed attempt to acquire the lock.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Step {
    /// Keep spinning.
    Spin,
    /// Sleep for this many milliseconds, then resume spinning.
    Sleep(u32),
    /// The delay budget is exhausted.
    Stuck,
}

// === impl Backoff ===

impl Backoff {
    /// Returns a new `Backoff` that has not spun or slept.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            spins: 0,
            delays: 0,
            cur_delay_ms: 0,
        }
    }

    /// Returns the number of spins performed since the last sleep.
    #[must_use]
    pub const fn spins(&self) -> u32 {
        self.spins
    }

    /// Returns the number of times the waiter escalated to sleeping.
    #[must_use]
    pub const fn delays(&self) -> u32 {
        self.delays
    }

    /// Returns the length of the most recent sleep, or 0 if the waiter never
    /// slept.
    #[must_use]
    pub const fn current_delay_ms(&self) -> u32 {
        self.cur_delay_ms
    }

    /// Returns `true` if the waiter slept at least once.
    #[must_use]
    pub const fn has_slept(&self) -> bool {
        self.cur_delay_ms != 0
    }

    /// Records one failed acquisition attempt.
    pub(crate) fn on_failure(
        &mut self,
        spins_per_delay: u32,
        config: &Config,
        rng: &mut impl Rng,
    ) -> Step {
        self.spins += 1;
        if self.spins < spins_per_delay {
            return Step::Spin;
        }

        self.spins = 0;
        self.delays += 1;
        if self.delays > config.num_delays {
            return Step::Stuck;
        }

        self.cur_delay_ms = next_delay(self.cur_delay_ms, rng.gen::<f64>(), config);
        Step::Sleep(self.cur_delay_ms)
    }
}
