//! Stuck spinlock detection.
//!
//! A waiter that exhausts its delay budget without acquiring a lock has
//! found a lock whose holder crashed without releasing it, or a severe bug.
//! Neither can be recovered from without risking corruption of whatever the
//! lock protects, so the only thing left to do is report the lock and stop.
use crate::util::fmt;
use core::panic::Location;

/// A function that is called when a lock is declared stuck.
///
/// Stuck handlers never return. The default handler is
/// [`report_stuck_lock`].
pub type StuckHandler = fn(&StuckLock) -> !;

/// Describes a lock that could not be acquired within the delay budget.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StuckLock {
    addr: usize,
    location: &'static Location<'static>,
    delays: u32,
}

// === impl StuckLock ===

impl StuckLock {
    pub(crate) fn new(addr: usize, location: &'static Location<'static>, delays: u32) -> Self {
        Self {
            addr,
            location,
            delays,
        }
    }

    /// Returns the address of the stuck lock word.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Returns the source location that attempted to acquire the lock.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Returns the number of sleeps the waiter took before giving up.
    #[must_use]
    pub fn delays(&self) -> u32 {
        self.delays
    }
}

impl fmt::Display for StuckLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stuck spinlock ({}) detected at {}:{}",
            fmt::ptr(self.addr),
            self.location.file(),
            self.location.line(),
        )
    }
}

/// Reports a stuck lock and terminates.
///
/// What "terminates" means depends on how the crate was built:
///
/// - with the `std` feature, an `ERROR` event is recorded first.
/// - with the `stuck-exit` feature, the report is written to stderr and the
///   process exits with status 1. This is intended for self-test builds, so
///   that a harness sees an ordinary failing exit rather than a crash.
/// - otherwise, with the `std` feature, the report is written to stderr and
///   the process aborts.
/// - without `std`, this panics with the report as the message.
#[cold]
#[inline(never)]
pub fn report_stuck_lock(stuck: &StuckLock) -> ! {
    #[cfg(feature = "std")]
    tracing::error!(
        lock = %fmt::ptr(stuck.addr),
        location = %stuck.location,
        delays = stuck.delays,
        "stuck spinlock detected"
    );

    #[cfg(feature = "stuck-exit")]
    {
        std::eprintln!("\n{stuck}.");
        std::process::exit(1)
    }

    #[cfg(all(feature = "std", not(feature = "stuck-exit")))]
    {
        std::eprintln!("PANIC: {stuck}");
        std::process::abort()
    }

    #[cfg(not(feature = "std"))]
    panic!("{stuck}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let location = Location::caller();
        let stuck = StuckLock::new(0xdead_beef, location, 1000);
        assert_eq!(
            stuck.to_string(),
            format!(
                "stuck spinlock (0xdeadbeef) detected at {}:{}",
                location.file(),
                location.line()
            )
        );
        assert_eq!(stuck.addr(), 0xdead_beef);
        assert_eq!(stuck.delays(), 1000);
    }
}
