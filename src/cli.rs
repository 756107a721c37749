use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "subexon-constraints",
    about = "Build subexon compatibility constraints from aligned reads",
    version
)]
pub struct Args {
    /// Coordinate-sorted input BAM
    pub in_bam: PathBuf,

    /// Subexon table: chrom, start, end, strand (0-based inclusive, tab-separated)
    #[arg(short = 's', long = "subexons", value_name = "TSV")]
    pub subexons: PathBuf,

    /// Output constraint table (stdout when omitted)
    #[arg(short = 'o', long = "out", value_name = "TSV")]
    pub out: Option<PathBuf>,

    /// Start a new window when consecutive subexons are further apart than this
    #[arg(long, default_value_t = 100_000)]
    pub window_gap: u64,

    /// Keep supplementary alignments
    #[arg(long)]
    pub allow_supplementary: bool,

    /// Drop alignments with soft/hard clips
    #[arg(long)]
    pub no_clip: bool,

    /// Abundance normalization applied after coalescing
    #[arg(long, value_enum, default_value_t = Normalization::None)]
    pub normalize: Normalization,

    /// Records sampled for read/fragment length statistics (0 disables)
    #[arg(long, default_value_t = 1_000_000)]
    pub sample_reads: u64,

    /// Set logging level to WARN
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Normalization {
    None,
    TotalSupport,
}
