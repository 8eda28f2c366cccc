use crate::{
    acquire::{Sleep, SpinContext},
    flag::{AtomicFlag, SLock},
    util::fmt,
};
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

/// A mutual exclusion lock protecting shared data, built on an [`SLock`].
///
/// The data can only be accessed through the RAII guards returned from
/// [`lock`] and [`try_lock`], which guarantees that the data is only ever
/// accessed when the mutex is locked. Waiting for a contended `Mutex` is done
/// by a caller-provided [`SpinContext`].
///
/// # Fairness
///
/// This is *not* a fair mutex.
///
/// # Examples
///
/// ```
/// use hyphae::{Config, Mutex, SpinContext};
///
/// let mutex = Mutex::new(0);
/// let mut ctx = SpinContext::new(Config::DEFAULT)?;
///
/// *mutex.lock(&mut ctx) += 1;
/// assert_eq!(*mutex.lock(&mut ctx), 1);
/// # Ok::<(), hyphae::ConfigError>(())
/// ```
///
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
pub struct Mutex<T: ?Sized> {
    lock: SLock,
    data: UnsafeCell<T>,
}

/// An RAII implementation of a "scoped lock" of a [`Mutex`]. When this
/// structure is dropped (falls out of scope), the lock will be unlocked.
///
/// This structure is created by the [`lock`] and [`try_lock`] methods on
/// [`Mutex`].
///
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
#[must_use = "if unused, the `Mutex` will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

// === impl Mutex ===

impl<T> Mutex<T> {
    loom_const_fn! {
        /// Returns a new `Mutex` protecting the provided `data`.
        ///
        /// The returned `Mutex` is in an unlocked state, ready for use.
        #[must_use]
        pub fn new(data: T) -> Self {
            Self {
                lock: SLock::new(),
                data: UnsafeCell::new(data),
            }
        }
    }

    /// Consumes this `Mutex`, returning the guarded data.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Locks this mutex, waiting for it using `ctx` if it is contended.
    ///
    /// The source location of the call is reported if the lock gets stuck.
    #[track_caller]
    pub fn lock<S: Sleep>(&self, ctx: &mut SpinContext<S>) -> MutexGuard<'_, T> {
        ctx.acquire(&self.lock);
        MutexGuard { mutex: self }
    }

    /// Attempts to lock this mutex without waiting, returning `None` if it is
    /// already locked.
    #[must_use]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.lock.try_acquire() {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Returns `true` if this mutex is currently locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        !self.lock.is_free()
    }

    /// Returns a mutable reference to the guarded data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking needs
    /// to take place.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("Mutex").field("data", &&*guard).finish(),
            None => f
                .debug_struct("Mutex")
                .field("data", &format_args!("<locked>"))
                .finish(),
        }
    }
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

// === impl MutexGuard ===

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe {
            // Safety: we are holding the lock, so it is okay to dereference
            // the data pointer.
            &*self.mutex.data.get()
        }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe {
            // Safety: we are holding the lock, so it is okay to dereference
            // the data pointer.
            &mut *self.mutex.data.get()
        }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            // Safety: the guard exists, so we hold the lock.
            self.mutex.lock.release()
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}
