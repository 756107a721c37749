use crate::cli::{Args, Normalization};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use subexon_constraints::abundance::{AbundanceNormalizer, TotalSupport, Unnormalized};
use subexon_constraints::alignment::{SourceConfig, SourceStats, open_bam};
use subexon_constraints::constraints::{BuildStats, WindowConstraints, build_window};
use subexon_constraints::library::LibraryStats;
use subexon_constraints::subexon::{SubexonWindow, load_windows};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct Stats {
    pub windows: u64,
    pub source: SourceStats,
    pub build: BuildStats,
}

pub fn run(args: &Args) -> Result<Stats> {
    let config = SourceConfig {
        allow_clip: !args.no_clip,
        allow_supplementary: args.allow_supplementary,
        ..SourceConfig::default()
    };
    let mut source = open_bam(&args.in_bam, config)?;

    if args.sample_reads > 0 {
        let library = LibraryStats::sample(&args.in_bam, Some(args.sample_reads))?;
        info!(
            reads = library.reads,
            read_len = library.read_len,
            paired = library.paired,
            fragment_len = library.fragment_len,
            fragment_stdev = library.fragment_stdev,
            "library statistics"
        );
    }

    let windows = load_windows(&args.subexons, source.refname_to_id(), args.window_gap)
        .with_context(|| format!("failed to load subexons from {}", args.subexons.display()))?;
    info!(windows = windows.len(), "subexon windows loaded");

    let mut ref_names = vec![String::new(); source.refname_to_id().len()];
    for (name, &id) in source.refname_to_id() {
        ref_names[id] = name.clone();
    }

    let normalizer: Box<dyn AbundanceNormalizer> = match args.normalize {
        Normalization::None => Box::new(Unnormalized),
        Normalization::TotalSupport => Box::new(TotalSupport),
    };

    let mut out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut stats = Stats::default();
    for (idx, window) in windows.iter().enumerate() {
        let result = build_window(&mut source, window, normalizer.as_ref())?;
        stats.windows += 1;
        stats.build += result.stats;
        write_window(&mut out, idx, &ref_names[window.ref_id], window, &result)?;
    }
    out.flush()?;

    stats.source = source.stats();
    if stats.source.malformed > 0 {
        warn!(malformed = stats.source.malformed, "skipped malformed alignment records");
    }
    Ok(stats)
}

fn write_window(
    out: &mut dyn Write,
    idx: usize,
    chrom: &str,
    window: &SubexonWindow,
    result: &WindowConstraints,
) -> io::Result<()> {
    writeln!(
        out,
        "#window\t{}\t{}\t{}\t{}\t{}",
        idx,
        chrom,
        window.start().unwrap_or(0),
        window.end().unwrap_or(0),
        window.len()
    )?;
    for (i, ct) in result.constraints.iter().enumerate() {
        let vector: Vec<String> = ct.vector.iter().map(|s| s.to_string()).collect();
        writeln!(
            out,
            "C\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}",
            i,
            vector.join(","),
            ct.support,
            ct.unique_support,
            ct.weight,
            ct.abundance,
            ct.normalized_abundance
        )?;
    }
    for mate in &result.mates {
        writeln!(
            out,
            "M\t{}\t{}\t{}\t{:.6}\t{:.6}",
            mate.i, mate.j, mate.support, mate.abundance, mate.normalized_abundance
        )?;
    }
    Ok(())
}
