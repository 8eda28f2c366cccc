use clap::Parser;
use hyphae_check::{Options, Result};

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Options::parse();
    opts.output.trace_init()?;

    tracing::debug!(?opts.cmd, ?opts.tuning, "hyphae-check configuration");

    opts.run()
}
