//! Self-test for a lock word and the acquisition path.
//!
//! This checks that [`SLock`] has the size the surrounding code assumes (by
//! surrounding it with sentinel bytes and checking that they are never
//! clobbered), that it moves between the free and locked states as expected,
//! and finally that acquiring a lock which is never released is detected as
//! stuck.
//!
//! The final step does not return. It is meant to be run from a binary built
//! with the `stuck-exit` feature, such as `hyphae-check selftest`, which then
//! exits with status 1 and a "stuck spinlock" report.
use crate::{
    acquire::{Sleep, SpinContext},
    flag::{AtomicFlag, SLock},
};
use core::{panic::Location, ptr};

/// The value written to the padding on either side of the lock word.
pub const SENTINEL: u8 = 0x44;

/// A lock word surrounded by sentinel bytes.
#[derive(Debug)]
#[repr(C)]
pub struct TestLock {
    pad1: u8,
    lock: SLock,
    pad2: u8,
}

/// Errors returned when the self-test sequence fails.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SelfTestError {
    /// A lock operation wrote outside the lock word.
    #[error("declared datatype is wrong size")]
    WrongSize,
    /// A freshly initialized lock was not free.
    #[error("lock not initialized")]
    NotInitialized,
    /// A lock was still free after being acquired.
    #[error("lock not locked")]
    NotLocked,
    /// A lock was still held after being released.
    #[error("lock not unlocked")]
    NotUnlocked,
    /// A lock was still free after being acquired a second time.
    #[error("lock not re-locked")]
    NotRelocked,
}

// === impl TestLock ===

impl TestLock {
    loom_const_fn! {
        /// Returns a new `TestLock` with the sentinels set and the lock free.
        #[must_use]
        pub fn new() -> Self {
            Self {
                pad1: SENTINEL,
                lock: SLock::new(),
                pad2: SENTINEL,
            }
        }
    }

    /// Returns the lock word under test.
    #[must_use]
    pub fn lock(&self) -> &SLock {
        &self.lock
    }

    /// Runs the lock state sequence, leaving the lock held on success.
    ///
    /// The lock is reinitialized first, acquired, released and then acquired
    /// again. The sentinels are checked after every step.
    #[track_caller]
    pub fn check<S: Sleep>(&mut self, ctx: &mut SpinContext<S>) -> Result<(), SelfTestError> {
        self.pad1 = SENTINEL;
        self.pad2 = SENTINEL;

        self.lock.init();
        self.check_sentinels()?;
        if !self.lock.is_free() {
            return Err(SelfTestError::NotInitialized);
        }

        ctx.acquire(&self.lock);
        self.check_sentinels()?;
        if self.lock.is_free() {
            return Err(SelfTestError::NotLocked);
        }

        unsafe {
            // Safety: acquired above.
            self.lock.release();
        }
        self.check_sentinels()?;
        if !self.lock.is_free() {
            return Err(SelfTestError::NotUnlocked);
        }

        ctx.acquire(&self.lock);
        self.check_sentinels()?;
        if self.lock.is_free() {
            return Err(SelfTestError::NotRelocked);
        }

        Ok(())
    }

    fn check_sentinels(&self) -> Result<(), SelfTestError> {
        let (pad1, pad2) = unsafe {
            // Safety: both pointers come from references to fields of `self`.
            (ptr::read_volatile(&self.pad1), ptr::read_volatile(&self.pad2))
        };
        test_trace!(pad1, pad2, "checked sentinels");

        if pad1 != SENTINEL || pad2 != SENTINEL {
            return Err(SelfTestError::WrongSize);
        }
        Ok(())
    }
}

impl Default for TestLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the full self-test.
///
/// After [`TestLock::check`] succeeds, this waits for the lock that the check
/// left held. Nothing will release it, so the wait ends with the context's
/// [stuck handler] after [`Config::num_delays`] sleeps, and this function
/// does not return.
///
/// If the handler is never reached, the returned error describes what went
/// wrong: either a step of the check failed, or the lock was acquired even
/// though it was held.
///
/// [stuck handler]: crate::StuckHandler
/// [`Config::num_delays`]: crate::Config::num_delays
#[track_caller]
#[must_use = "a returned error means the self-test failed"]
pub fn run<S: Sleep>(ctx: &mut SpinContext<S>) -> SelfTestError {
    let location = Location::caller();
    let mut test = TestLock::new();

    if let Err(error) = test.check(ctx) {
        tracing::error!(%error, "lock self-test failed");
        return error;
    }

    tracing::debug!(
        num_delays = ctx.config().num_delays,
        "lock sequence ok; waiting for a lock that is never released"
    );
    let backoff = ctx.acquire_slow(&test.lock, location);

    tracing::error!(?backoff, "acquired a lock that was already held");
    SelfTestError::NotLocked
}
