use super::*;
use crate::{
    config::{Config, ConfigError},
    flag::{AtomicFlag, SLock},
    stuck::StuckLock,
};

#[cfg(not(loom))]
mod std_tests {
    use super::*;
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
        vec::Vec,
    };

    /// A stuck handler that unwinds with the report, so tests can inspect it.
    fn unwind_stuck(stuck: &StuckLock) -> ! {
        panic::panic_any(*stuck)
    }

    fn recording_ctx(config: Config) -> SpinContext<impl FnMut(u32)> {
        let mut sleeps = Vec::new();
        SpinContext::with_sleep(config, move |ms: u32| sleeps.push(ms), 0xf00d)
            .unwrap()
            .with_stuck_handler(unwind_stuck)
    }

    #[test]
    fn uncontended_fast_path() {
        let _trace = crate::util::trace_init();
        let lock = SLock::new();
        let mut ctx = recording_ctx(Config::DEFAULT);

        ctx.acquire(&lock);
        assert!(!lock.is_free());
        // the fast path does not adjust the estimate
        assert_eq!(ctx.estimate().get(), 100);
    }

    #[test]
    fn slow_path_without_sleeping_raises_estimate() {
        let _trace = crate::util::trace_init();
        let lock = SLock::new();
        let mut ctx = recording_ctx(Config::DEFAULT);

        let backoff = ctx.acquire_slow(&lock, Location::caller());
        assert!(!lock.is_free());
        assert!(!backoff.has_slept());
        assert_eq!(backoff.delays(), 0);
        assert_eq!(ctx.estimate().get(), 200);
    }

    #[test]
    fn sleeping_lowers_estimate() {
        let _trace = crate::util::trace_init();
        let lock = Arc::new(SLock::new());
        assert!(lock.try_acquire());

        // Release the lock from the first sleep, so the waiter acquires it
        // after sleeping exactly once.
        let sleeps = Arc::new(AtomicUsize::new(0));
        let mut ctx = SpinContext::with_sleep(
            Config::DEFAULT,
            {
                let lock = lock.clone();
                let sleeps = sleeps.clone();
                move |ms: u32| {
                    assert_eq!(ms, 1, "first sleep is the minimum delay");
                    if sleeps.fetch_add(1, Ordering::Relaxed) == 0 {
                        unsafe { lock.release() };
                    }
                }
            },
            1,
        )
        .unwrap()
        .with_stuck_handler(unwind_stuck);

        let backoff = ctx.acquire_slow(&*lock, Location::caller());
        assert!(backoff.has_slept());
        assert_eq!(backoff.delays(), 1);
        assert_eq!(backoff.current_delay_ms(), 1);
        assert_eq!(sleeps.load(Ordering::Relaxed), 1);
        assert_eq!(ctx.estimate().get(), 99);
        assert!(!lock.is_free());
    }

    #[test]
    fn spins_per_delay_before_each_sleep() {
        let _trace = crate::util::trace_init();

        // Counts attempts, and only becomes free after the waiter has slept
        // `SLEEPS` times.
        struct CountingFlag {
            attempts: AtomicUsize,
            open: AtomicBool,
        }

        unsafe impl AtomicFlag for CountingFlag {
            fn try_acquire(&self) -> bool {
                self.attempts.fetch_add(1, Ordering::Relaxed);
                self.open.swap(false, Ordering::Acquire)
            }

            unsafe fn release(&self) {
                self.open.store(true, Ordering::Release);
            }

            fn is_free(&self) -> bool {
                self.open.load(Ordering::Relaxed)
            }
        }

        const SLEEPS: usize = 3;
        let flag = Arc::new(CountingFlag {
            attempts: AtomicUsize::new(0),
            open: AtomicBool::new(false),
        });
        let config = Config::DEFAULT.with_initial_spins(25);
        let mut sleeps = 0;
        let mut ctx = SpinContext::with_sleep(
            config,
            {
                let flag = flag.clone();
                move |_: u32| {
                    sleeps += 1;
                    if sleeps == SLEEPS {
                        unsafe { flag.release() };
                    }
                }
            },
            7,
        )
        .unwrap()
        .with_stuck_handler(unwind_stuck);

        let backoff = ctx.acquire_slow(&*flag, Location::caller());
        assert_eq!(backoff.delays() as usize, SLEEPS);
        // 25 failed attempts before each sleep, plus the successful attempt.
        assert_eq!(flag.attempts.load(Ordering::Relaxed), 25 * SLEEPS + 1);
    }

    #[test]
    fn stuck_after_exactly_num_delays() {
        let _trace = crate::util::trace_init();
        let lock = SLock::new();
        assert!(lock.try_acquire());

        let config = Config::DEFAULT;
        let sleeps = Arc::new(AtomicUsize::new(0));
        let mut ctx = SpinContext::with_sleep(
            config,
            {
                let sleeps = sleeps.clone();
                move |ms: u32| {
                    assert!((config.min_delay_ms..=config.max_delay_ms).contains(&ms));
                    sleeps.fetch_add(1, Ordering::Relaxed);
                }
            },
            42,
        )
        .unwrap()
        .with_stuck_handler(unwind_stuck);

        let location = Location::caller();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.acquire_slow(&lock, location);
        }));

        let payload = result.expect_err("acquiring a held lock must get stuck");
        let stuck = payload
            .downcast_ref::<StuckLock>()
            .expect("panic payload must be a StuckLock");
        assert_eq!(stuck.delays(), 1000);
        assert_eq!(stuck.addr(), &lock as *const SLock as usize);
        assert_eq!(stuck.location(), location);
        assert_eq!(sleeps.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn stuck_reports_acquire_call_site() {
        let lock = SLock::new();
        assert!(lock.try_acquire());
        let mut ctx = recording_ctx(Config::DEFAULT.with_num_delays(2));

        let line = line!() + 2;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.acquire(&lock);
        }));

        let payload = result.expect_err("acquiring a held lock must get stuck");
        let stuck = payload
            .downcast_ref::<StuckLock>()
            .expect("panic payload must be a StuckLock");
        assert_eq!(stuck.delays(), 2);
        assert_eq!(stuck.location().file(), file!());
        assert_eq!(stuck.location().line(), line);
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        const THREADS: usize = 8;
        const ITERS: usize = 2_000;

        let _trace = crate::util::trace_init();
        let lock = Arc::new(SLock::new());
        let in_critical = Arc::new(AtomicBool::new(false));
        let count = Arc::new(AtomicUsize::new(0));

        let threads = (0..THREADS)
            .map(|i| {
                let lock = lock.clone();
                let in_critical = in_critical.clone();
                let count = count.clone();
                crate::loom::thread::spawn(move || {
                    let config = Config::DEFAULT.with_max_delay_ms(2);
                    let sleep = |ms: u32| std::thread::sleep(Duration::from_millis(ms.into()));
                    let mut ctx = SpinContext::with_sleep(config, sleep, i as u64)
                        .unwrap()
                        .with_stuck_handler(unwind_stuck);
                    for _ in 0..ITERS {
                        ctx.acquire(&*lock);
                        assert!(
                            !in_critical.swap(true, Ordering::Relaxed),
                            "two threads in the critical section"
                        );
                        count.store(count.load(Ordering::Relaxed) + 1, Ordering::Relaxed);
                        in_critical.store(false, Ordering::Relaxed);
                        unsafe { lock.release() };
                    }
                    *ctx.estimate()
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            let estimate = thread.join().unwrap();
            assert!((10..=1000).contains(&estimate.get()));
        }

        assert_eq!(count.load(Ordering::Relaxed), THREADS * ITERS);
        assert!(lock.is_free());
    }

    #[test]
    fn seed_and_fold() {
        let mut ctx = recording_ctx(Config::DEFAULT);
        ctx.set_estimate(10);
        assert_eq!(ctx.estimate().get(), 10);
        assert_eq!(ctx.fold_estimate(1000), 938);
        assert_eq!(ctx.fold_estimate(100), 94);
    }

    #[test]
    fn inverted_spin_bounds_are_rejected() {
        let config = Config::DEFAULT.with_min_spins(500).with_max_spins(20);
        let err = SpinContext::with_sleep(config, |_: u32| {}, 0).err();
        assert_eq!(err, Some(ConfigError::SpinBounds { min: 500, max: 20 }));
    }

    #[test]
    fn initial_spins_out_of_bounds_are_rejected() {
        let config = Config::DEFAULT.with_initial_spins(5000);
        let err = SpinContext::with_sleep(config, |_: u32| {}, 0).err();
        assert_eq!(
            err,
            Some(ConfigError::InitialSpins {
                initial: 5000,
                min: 10,
                max: 1000
            })
        );
    }

    #[test]
    fn seeding_stays_within_custom_bounds() {
        let config = Config::DEFAULT
            .with_min_spins(20)
            .with_initial_spins(50)
            .with_max_spins(100);
        let mut ctx = recording_ctx(config);
        ctx.set_estimate(1000);
        assert_eq!(ctx.estimate().get(), 100);
        ctx.set_estimate(1);
        assert_eq!(ctx.estimate().get(), 20);
    }

    #[cfg(feature = "std")]
    #[test]
    fn new_validates() {
        assert!(SpinContext::new(Config::DEFAULT).is_ok());
        assert_eq!(
            SpinContext::new(Config::DEFAULT.with_min_delay_ms(0)).err(),
            Some(ConfigError::ZeroMinDelay)
        );
        assert_eq!(SpinContext::default().estimate().get(), 100);
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use crate::loom::{
        self,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    #[test]
    fn two_waiters() {
        loom::model(|| {
            let lock = Arc::new(SLock::new());
            let count = Arc::new(AtomicUsize::new(0));
            let config = Config::DEFAULT
                .with_min_spins(1)
                .with_initial_spins(1)
                .with_max_spins(1)
                .with_num_delays(u32::MAX);

            let threads = (0..2)
                .map(|i| {
                    let lock = lock.clone();
                    let count = count.clone();
                    thread::spawn(move || {
                        let mut ctx = SpinContext::with_sleep(config, ThreadSleep, i).unwrap();
                        ctx.acquire(&*lock);
                        let n = count.load(Ordering::Relaxed);
                        count.store(n + 1, Ordering::Relaxed);
                        unsafe { lock.release() };
                    })
                })
                .collect::<Vec<_>>();

            for thread in threads {
                thread.join().unwrap();
            }

            assert_eq!(count.load(Ordering::Relaxed), 2);
        });
    }
}
