use clap::Parser;
use color_eyre::eyre::WrapErr;
use hyphae::Config;

pub use color_eyre::eyre::Result;

pub mod contend;
pub mod selftest;
pub mod term;

#[derive(Debug, Parser)]
#[command(
    name = "hyphae-check",
    about = "checks that `hyphae` spinlocks work on this machine",
    version
)]
pub struct Options {
    /// Which check to run.
    #[command(subcommand)]
    pub cmd: Subcommand,

    #[command(flatten)]
    pub tuning: TuningOptions,

    #[command(flatten)]
    pub output: term::OutputOptions,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Verify the lock word and the acquisition path.
    ///
    /// This prints one star per sleep while waiting for a lock that is never
    /// released, and then exits with status 1 and a "stuck spinlock" message.
    /// Any other outcome is a failure.
    Selftest,
    /// Run many threads contending for one lock, and check that none of
    /// their updates were lost.
    Contend(contend::Cmd),
}

/// Overrides for the lock tuning. Anything not set uses the library's
/// defaults.
#[derive(Debug, clap::Args)]
#[command(
    next_help_heading = "Tuning Options",
    group = clap::ArgGroup::new("tuning-opts").multiple(true)
)]
pub struct TuningOptions {
    /// Smallest number of spins per delay.
    #[clap(long, env = "HYPHAE_MIN_SPINS", global = true)]
    pub min_spins: Option<u32>,

    /// Largest number of spins per delay.
    #[clap(long, env = "HYPHAE_MAX_SPINS", global = true)]
    pub max_spins: Option<u32>,

    /// Spins per delay for a thread that has not been seeded.
    #[clap(long, env = "HYPHAE_INITIAL_SPINS", global = true)]
    pub initial_spins: Option<u32>,

    /// Sleeps taken before a lock is declared stuck.
    #[clap(long, env = "HYPHAE_NUM_DELAYS", global = true)]
    pub num_delays: Option<u32>,

    /// Shortest sleep, in milliseconds.
    #[clap(long, env = "HYPHAE_MIN_DELAY_MS", global = true)]
    pub min_delay_ms: Option<u32>,

    /// Longest sleep, in milliseconds.
    #[clap(long, env = "HYPHAE_MAX_DELAY_MS", global = true)]
    pub max_delay_ms: Option<u32>,
}

// === impl Options ===

impl Options {
    pub fn run(&self) -> Result<()> {
        let config = self.tuning.config()?;
        tracing::debug!(?config, "lock tuning");

        match self.cmd {
            Subcommand::Selftest => selftest::run(config),
            Subcommand::Contend(ref cmd) => cmd.run(config),
        }
    }
}

// === impl TuningOptions ===

impl TuningOptions {
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::DEFAULT;
        if let Some(min_spins) = self.min_spins {
            config = config.with_min_spins(min_spins);
        }
        if let Some(max_spins) = self.max_spins {
            config = config.with_max_spins(max_spins);
        }
        if let Some(initial_spins) = self.initial_spins {
            config = config.with_initial_spins(initial_spins);
        }
        if let Some(num_delays) = self.num_delays {
            config = config.with_num_delays(num_delays);
        }
        if let Some(min_delay_ms) = self.min_delay_ms {
            config = config.with_min_delay_ms(min_delay_ms);
        }
        if let Some(max_delay_ms) = self.max_delay_ms {
            config = config.with_max_delay_ms(max_delay_ms);
        }

        config
            .validate()
            .with_context(|| format!("invalid lock tuning: {config:?}"))
    }
}
