use crate::Result;
use color_eyre::eyre::{ensure, format_err, WrapErr};
use hyphae::{config::DEFAULT_SPINS_PER_DELAY, Config, Mutex, SpinContext};
use std::{hint, sync::Arc, thread, time::Instant};

#[derive(Debug, clap::Args)]
pub struct Cmd {
    /// Number of threads contending for the lock.
    #[clap(long, short, default_value_t = 8)]
    threads: usize,

    /// Number of times each thread acquires the lock.
    #[clap(long, short, default_value_t = 10_000)]
    iterations: u64,

    /// Number of spin loop iterations to run while holding the lock.
    #[clap(long, default_value_t = 0)]
    hold_spins: u32,
}

/// State shared by all contending threads.
#[derive(Debug)]
struct Shared {
    /// Spins per delay, folded in from every thread that has finished.
    estimate: Mutex<u32>,
    counter: Mutex<u64>,
}

// === impl Cmd ===

impl Cmd {
    pub fn run(&self, config: Config) -> Result<()> {
        ensure!(self.threads > 0, "at least one thread is required");

        let shared = Arc::new(Shared {
            estimate: Mutex::new(DEFAULT_SPINS_PER_DELAY.clamp(config.min_spins, config.max_spins)),
            counter: Mutex::new(0),
        });

        tracing::info!(
            threads = self.threads,
            iterations = self.iterations,
            hold_spins = self.hold_spins,
            "starting contention"
        );
        let started = Instant::now();

        let threads = (0..self.threads)
            .map(|i| {
                let shared = shared.clone();
                let iterations = self.iterations;
                let hold_spins = self.hold_spins;
                thread::Builder::new()
                    .name(format!("contend-{i}"))
                    .spawn(move || contend(&shared, config, iterations, hold_spins))
                    .with_context(|| format!("failed to spawn thread {i}"))
            })
            .collect::<Result<Vec<_>>>()?;

        for thread in threads {
            let name = thread.thread().name().unwrap_or("<unnamed>").to_owned();
            let local = thread
                .join()
                .map_err(|_| format_err!("thread {name} panicked"))??;
            tracing::debug!(thread = %name, spins_per_delay = local, "thread finished");
        }

        let elapsed = started.elapsed();
        let mut ctx = SpinContext::new(config).wrap_err("invalid lock tuning")?;
        let total = *shared.counter.lock(&mut ctx);
        let estimate = *shared.estimate.lock(&mut ctx);
        let expected = self.threads as u64 * self.iterations;

        ensure!(
            total == expected,
            "lost updates: counted {total}, expected {expected}"
        );
        ensure!(
            (config.min_spins..=config.max_spins).contains(&estimate),
            "shared spin estimate {estimate} is out of bounds"
        );

        tracing::info!(?elapsed, total, spins_per_delay = estimate, "contention ok");
        println!(
            "{total} acquisitions across {} threads in {elapsed:?}; shared spins per delay: {estimate}",
            self.threads
        );
        Ok(())
    }
}

/// Runs one contending thread, returning its final spin estimate.
fn contend(shared: &Shared, config: Config, iterations: u64, hold_spins: u32) -> Result<u32> {
    let mut ctx = SpinContext::new(config).wrap_err("invalid lock tuning")?;
    let seed = *shared.estimate.lock(&mut ctx);
    ctx.set_estimate(seed);

    for _ in 0..iterations {
        let mut counter = shared.counter.lock(&mut ctx);
        *counter += 1;
        for _ in 0..hold_spins {
            hint::spin_loop();
        }
    }

    let mut estimate = shared.estimate.lock(&mut ctx);
    *estimate = ctx.fold_estimate(*estimate);
    Ok(ctx.estimate().get())
}
