mod cli;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            if args.quiet {
                EnvFilter::new("warn")
            } else {
                EnvFilter::new("info")
            }
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let stats = pipeline::run(&args)?;
    tracing::info!(
        windows = stats.windows,
        records = stats.source.records,
        usable = stats.source.usable,
        malformed = stats.source.malformed,
        incompatible = stats.build.incompatible,
        mate_pairs = stats.build.mate_pairs,
        constraints = stats.build.constraints,
        "subexon-constraints: processing complete"
    );
    Ok(())
}
