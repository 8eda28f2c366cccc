//! Adaptive spinlock acquisition.
//!
//! A [`SpinContext`] holds everything a single execution context (a thread,
//! or a process attached to shared memory) needs to wait for contended
//! [`AtomicFlag`]s: its [`SpinEstimate`], tuning [`Config`], a random number
//! generator for the sleep [backoff], a [`Sleep`] implementation and a
//! [`StuckHandler`].
//!
//! Acquisition proceeds as follows:
//!
//! 1. Try to acquire the flag once. If that succeeds, the lock was not
//!    contended, and nothing else happens.
//! 2. Otherwise, spin: retry the flag, issuing a spin loop hint after every
//!    failure. After [`SpinEstimate::get`] failures in a row, sleep, with the
//!    sleep duration chosen by the [backoff], and then resume spinning.
//! 3. If the waiter would sleep more than [`Config::num_delays`] times, the
//!    lock is declared stuck and the [`StuckHandler`] is called. It does not
//!    return.
//! 4. Once the flag is acquired, update the [`SpinEstimate`] based on whether
//!    the waiter had to sleep.
//!
//! Waiters are not queued: a waiter that started spinning later may acquire
//! the lock before one that started earlier.
//!
//! [backoff]: crate::backoff
use crate::{
    backoff::{Backoff, Step},
    config::{Config, ConfigError},
    estimate::SpinEstimate,
    flag::AtomicFlag,
    loom::hint,
    stuck::{self, StuckHandler, StuckLock},
    util::fmt,
};
use core::panic::Location;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

#[cfg(test)]
mod tests;

/// Puts the current execution context to sleep.
///
/// This is how a [`SpinContext`] blocks once it has given up spinning. Any
/// `FnMut(u32)` closure may be used as a `Sleep`.
pub trait Sleep {
    /// Sleeps for at least `ms` milliseconds.
    ///
    /// Implementations may sleep longer than requested (for instance, if the
    /// OS timer resolution is coarser than one millisecond).
    fn sleep_ms(&mut self, ms: u32);
}

feature! {
    #![feature = "std"]

    /// A [`Sleep`] implementation that uses [`std::thread::sleep`].
    #[derive(Debug, Copy, Clone, Default)]
    pub struct ThreadSleep;

    impl Sleep for ThreadSleep {
        #[inline]
        fn sleep_ms(&mut self, ms: u32) {
            #[cfg(not(loom))]
            std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));

            #[cfg(loom)]
            {
                test_trace!(ms, "would sleep");
                loom::thread::yield_now();
            }
        }
    }
}

impl<F> Sleep for F
where
    F: FnMut(u32),
{
    #[inline]
    fn sleep_ms(&mut self, ms: u32) {
        self(ms)
    }
}

/// Per-execution-context state for acquiring contended spinlocks.
///
/// A `SpinContext` is owned by one thread (or process) and passed by mutable
/// reference to every acquisition. It is never shared: the only state shared
/// between contexts is the lock word itself, and the optional shared spin
/// estimate, which is synchronized explicitly with
/// [`set_estimate`](Self::set_estimate) and
/// [`fold_estimate`](Self::fold_estimate).
///
/// # Examples
///
/// ```
/// use hyphae::{AtomicFlag, Config, SLock, SpinContext};
///
/// static LOCK: SLock = SLock::new();
///
/// let mut ctx = SpinContext::new(Config::DEFAULT)?;
/// ctx.acquire(&LOCK);
/// // ... critical section ...
/// unsafe { LOCK.release() };
/// # Ok::<(), hyphae::ConfigError>(())
/// ```
pub struct SpinContext<S = DefaultSleep> {
    config: Config,
    estimate: SpinEstimate,
    rng: Xoshiro256PlusPlus,
    sleep: S,
    on_stuck: StuckHandler,
}

/// The [`Sleep`] implementation used by [`SpinContext`] when none is
/// specified.
#[cfg(feature = "std")]
pub type DefaultSleep = ThreadSleep;

/// The [`Sleep`] implementation used by [`SpinContext`] when none is
/// specified.
#[cfg(not(feature = "std"))]
pub type DefaultSleep = fn(u32);

// === impl SpinContext ===

feature! {
    #![feature = "std"]

    impl SpinContext<ThreadSleep> {
        /// Returns a new `SpinContext` that sleeps using
        /// [`std::thread::sleep`], with a randomly seeded backoff.
        ///
        /// # Errors
        ///
        /// Returns a [`ConfigError`] if `config` is not valid.
        pub fn new(config: Config) -> Result<Self, ConfigError> {
            Self::with_sleep(config, ThreadSleep, random_seed())
        }
    }

    impl Default for SpinContext<ThreadSleep> {
        fn default() -> Self {
            Self::from_parts(Config::DEFAULT, SpinEstimate::default(), ThreadSleep, random_seed())
        }
    }
}

impl<S: Sleep> SpinContext<S> {
    /// Returns a new `SpinContext` that sleeps using the provided [`Sleep`]
    /// implementation, with its backoff seeded by `seed`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` does not pass
    /// [`Config::validate`].
    pub fn with_sleep(config: Config, sleep: S, seed: u64) -> Result<Self, ConfigError> {
        let estimate = SpinEstimate::new(&config)?;
        Ok(Self::from_parts(config, estimate, sleep, seed))
    }

    fn from_parts(config: Config, estimate: SpinEstimate, sleep: S, seed: u64) -> Self {
        Self {
            config,
            estimate,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            sleep,
            on_stuck: stuck::report_stuck_lock,
        }
    }

    /// Replaces the function called when a lock is declared stuck.
    ///
    /// By default, this is [`stuck::report_stuck_lock`].
    #[must_use]
    pub fn with_stuck_handler(self, on_stuck: StuckHandler) -> Self {
        Self { on_stuck, ..self }
    }

    /// Returns this context's tuning.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns this context's current spins-per-delay estimate.
    #[must_use]
    pub fn estimate(&self) -> &SpinEstimate {
        &self.estimate
    }

    /// Returns a mutable reference to the [`Sleep`] implementation.
    pub fn sleep_mut(&mut self) -> &mut S {
        &mut self.sleep
    }

    /// Seeds this context's spin estimate from the shared estimate.
    ///
    /// See [`SpinEstimate::set_estimate`].
    pub fn set_estimate(&mut self, shared: u32) {
        self.estimate.set_estimate(shared);
    }

    /// Returns the shared estimate with this context's estimate folded into
    /// it.
    ///
    /// See [`SpinEstimate::fold_estimate`].
    #[must_use]
    pub fn fold_estimate(&self, shared: u32) -> u32 {
        self.estimate.fold_estimate(shared)
    }

    /// Acquires `flag`, spinning and then sleeping until it is available.
    ///
    /// If the flag is free, it is acquired immediately and the spin estimate
    /// is not touched. Otherwise, this falls back to
    /// [`acquire_slow`](Self::acquire_slow), recording the caller's source
    /// location for stuck-lock reports.
    ///
    /// This never fails: if the flag cannot be acquired within the delay
    /// budget, the [`StuckHandler`] is called, and it does not return.
    #[track_caller]
    #[inline]
    pub fn acquire<F: AtomicFlag + ?Sized>(&mut self, flag: &F) {
        if flag.try_acquire() {
            return;
        }

        self.acquire_slow(flag, Location::caller());
    }

    /// Waits for a contended `flag`, returning the final state of the
    /// backoff once it is acquired.
    ///
    /// `location` identifies the caller in stuck-lock reports.
    pub fn acquire_slow<F: AtomicFlag + ?Sized>(
        &mut self,
        flag: &F,
        location: &'static Location<'static>,
    ) -> Backoff {
        let mut backoff = Backoff::new();
        let spins_per_delay = self.estimate.get();

        while !flag.try_acquire() {
            hint::spin_loop();

            match backoff.on_failure(spins_per_delay, &self.config, &mut self.rng) {
                Step::Spin => {}
                Step::Sleep(ms) => {
                    tracing::trace!(
                        lock = %fmt::ptr(addr_of(flag)),
                        %location,
                        delay_ms = ms,
                        delays = backoff.delays(),
                        "spinlock contended; sleeping"
                    );
                    self.sleep.sleep_ms(ms);
                }
                Step::Stuck => {
                    let stuck = StuckLock::new(
                        addr_of(flag),
                        location,
                        backoff.delays().saturating_sub(1),
                    );
                    (self.on_stuck)(&stuck)
                }
            }
        }

        self.estimate.record(backoff.has_slept());
        test_trace!(?backoff, spins_per_delay = self.estimate.get(), "acquired");
        backoff
    }
}

impl<S: fmt::Debug> fmt::Debug for SpinContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinContext")
            .field("config", &self.config)
            .field("estimate", &self.estimate)
            .field("sleep", &self.sleep)
            .finish_non_exhaustive()
    }
}

fn addr_of<F: ?Sized>(flag: &F) -> usize {
    (flag as *const F).cast::<()>() as usize
}

#[cfg(feature = "std")]
fn random_seed() -> u64 {
    use std::{
        collections::hash_map::RandomState,
        hash::{BuildHasher, Hasher},
    };

    // `RandomState` is keyed randomly per process, and differently for each
    // instance within a thread.
    RandomState::new().build_hasher().finish()
}
