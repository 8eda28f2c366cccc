use crate::Result;
use color_eyre::{
    eyre::{Report, WrapErr},
    Help,
};
use hyphae::{Config, Sleep, SpinContext, ThreadSleep};
use std::io::{self, Write};

/// Sleeps like [`ThreadSleep`], printing a star to stdout first.
#[derive(Debug, Default)]
struct Stars {
    sleep: ThreadSleep,
}

impl Sleep for Stars {
    fn sleep_ms(&mut self, ms: u32) {
        let mut stdout = io::stdout().lock();
        // progress output only, so a closed stdout is not worth failing over.
        let _ = stdout.write_all(b"*").and_then(|_| stdout.flush());
        self.sleep.sleep_ms(ms);
    }
}

/// Runs the lock self-test.
///
/// On success this never returns: the process exits with status 1 from the
/// stuck lock handler.
pub fn run(config: Config) -> Result<()> {
    let mut ctx = SpinContext::with_sleep(config, Stars::default(), 0x44)
        .wrap_err("invalid lock tuning")?;

    println!(
        "hyphae selftest: this will print {} stars and then\n                 exit with a 'stuck spinlock' message\n                 if the lock and its waiters are working.",
        config.num_delays
    );
    // progress output only, as with the stars.
    let _ = io::stdout().flush();

    let error = hyphae::selftest::run(&mut ctx);
    println!();
    Err::<(), _>(Report::new(error))
        .wrap_err("hyphae selftest failed")
        .note("the self-test must end by detecting a stuck spinlock")
}
