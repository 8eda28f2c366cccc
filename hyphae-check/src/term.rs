use crate::Result;
use color_eyre::eyre::WrapErr;

/// Options that configure `hyphae-check`'s output.
#[derive(Debug, clap::Args)]
#[command(
    next_help_heading = "Output Options",
    group = clap::ArgGroup::new("output-opts").multiple(true)
)]
pub struct OutputOptions {
    /// Configures logging.
    ///
    /// Set this to `hyphae=trace` to log every sleep taken by a waiter.
    #[clap(
        short,
        long,
        env = "RUST_LOG",
        default_value = "hyphae_check=info,warn",
        global = true
    )]
    pub log: String,
}

// === impl OutputOptions ===

impl OutputOptions {
    pub fn trace_init(&self) -> Result<()> {
        use tracing_subscriber::prelude::*;

        let filter = self
            .log
            .parse::<tracing_subscriber::EnvFilter>()
            .with_context(|| format!("invalid log filter {:?}", self.log))?;
        let fmt = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(fmt)
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()?;
        Ok(())
    }
}
