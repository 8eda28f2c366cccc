//! Test-and-set flags.
//!
//! An [`AtomicFlag`] is the single bit of shared state underneath every
//! spinlock. This module defines the trait that the acquisition algorithm in
//! [`SpinContext`](crate::SpinContext) is written against, and [`SLock`], an
//! implementation backed by an atomic compare-and-swap.
use crate::loom::sync::atomic::{AtomicBool, Ordering::*};

/// A single-bit lock word that can be atomically tested and set.
///
/// # Safety
///
/// Implementations must ensure that the flag is actually exclusive: between
/// two calls to [`release`], at most one call to [`try_acquire`] may return
/// `true`. A successful [`try_acquire`] must synchronize-with the preceding
/// [`release`] (acquire/release ordering), so that everything written while
/// the flag was held is visible to the next holder.
///
/// [`release`]: AtomicFlag::release
/// [`try_acquire`]: AtomicFlag::try_acquire
pub unsafe trait AtomicFlag {
    /// Attempts to transition the flag from free to locked, without blocking.
    ///
    /// Returns `true` if the flag was acquired, or `false` if it was already
    /// locked.
    fn try_acquire(&self) -> bool;

    /// Transitions the flag from locked to free.
    ///
    /// # Safety
    ///
    /// This may only be called by the current holder of the flag, i.e. it
    /// must be paired with a successful call to [`try_acquire`] (or a
    /// successful [`SpinContext::acquire`](crate::SpinContext::acquire)).
    ///
    /// [`try_acquire`]: AtomicFlag::try_acquire
    unsafe fn release(&self);

    /// Returns `true` if the flag is not currently held.
    ///
    /// This is a diagnostic probe. Checking `is_free` and then calling
    /// [`try_acquire`](AtomicFlag::try_acquire) is *not* atomic, and must
    /// never be used in place of `try_acquire`.
    fn is_free(&self) -> bool;
}

/// A test-and-set spinlock word.
///
/// `SLock` is one byte wide and has the same layout as a `bool`, so it may be
/// embedded in `#[repr(C)]` structures placed in shared memory.
///
/// On its own, an `SLock` only supports non-blocking acquisition. Waiting
/// for a contended `SLock` is done by a [`SpinContext`](crate::SpinContext),
/// which adapts how long it spins before sleeping.
///
/// # Examples
///
/// ```
/// use hyphae::{AtomicFlag, SLock};
///
/// let lock = SLock::new();
/// assert!(lock.is_free());
///
/// assert!(lock.try_acquire());
/// assert!(!lock.try_acquire());
///
/// unsafe { lock.release() };
/// assert!(lock.is_free());
/// ```
#[derive(Debug)]
#[repr(transparent)]
pub struct SLock {
    locked: AtomicBool,
}

// === impl SLock ===

impl SLock {
    loom_const_fn! {
        /// Returns a new `SLock`, in the free state.
        #[must_use]
        pub fn new() -> Self {
            Self { locked: AtomicBool::new(false) }
        }
    }

    /// Resets this `SLock` to the free state.
    ///
    /// This is intended for initializing a lock word that lives in memory
    /// the caller did not construct with [`SLock::new`], such as a freshly
    /// mapped shared segment.
    pub fn init(&mut self) {
        *self = Self::new();
    }
}

impl Default for SLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl AtomicFlag for SLock {
    #[cfg_attr(test, track_caller)]
    #[inline]
    fn try_acquire(&self) -> bool {
        test_dbg!(self
            .locked
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_ok())
    }

    #[cfg_attr(test, track_caller)]
    #[inline]
    unsafe fn release(&self) {
        test_dbg!(self.locked.store(false, Release));
    }

    #[inline]
    fn is_free(&self) -> bool {
        !self.locked.load(Relaxed)
    }
}

unsafe impl<F: AtomicFlag + ?Sized> AtomicFlag for &F {
    #[inline]
    fn try_acquire(&self) -> bool {
        F::try_acquire(self)
    }

    #[inline]
    unsafe fn release(&self) {
        F::release(self)
    }

    #[inline]
    fn is_free(&self) -> bool {
        F::is_free(self)
    }
}
