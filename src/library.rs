use crate::error::{Error, Result};
use noodles::bam;
use std::path::Path;

/// Share of the shortest mate distances used for the fragment length estimate.
const FRAGMENT_QUANTILE: f64 = 0.7;

/// Read and fragment length summary of a sequencing library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LibraryStats {
    pub reads: u64,
    pub read_len: u64,
    pub paired: bool,
    pub fragment_len: u64,
    pub fragment_stdev: u64,
}

impl LibraryStats {
    /// Scan up to `limit` primary mapped records of a BAM file (all of them
    /// when `limit` is `None`).
    pub fn sample(path: &Path, limit: Option<u64>) -> Result<Self> {
        let mut reader = bam::io::reader::Builder
            .build_from_path(path)
            .map_err(|source| Error::SourceOpen { path: path.to_path_buf(), source })?;
        reader
            .read_header()
            .map_err(|source| Error::SourceOpen { path: path.to_path_buf(), source })?;

        let mut read_lens: Vec<u64> = Vec::new();
        let mut mate_diffs: Vec<u64> = Vec::new();
        let mut reads = 0u64;
        let mut record = bam::Record::default();

        while reader.read_record(&mut record)? != 0 {
            let flags = record.flags();
            if flags.is_unmapped()
                || flags.is_mate_unmapped()
                || flags.is_secondary()
                || flags.is_supplementary()
            {
                continue;
            }
            read_lens.push(record.sequence().len() as u64);

            let same_ref = match (record.reference_sequence_id(), record.mate_reference_sequence_id()) {
                (Some(Ok(a)), Some(Ok(b))) => a == b,
                _ => false,
            };
            if same_ref
                && let (Some(Ok(pos)), Some(Ok(mate_pos))) =
                    (record.alignment_start(), record.mate_alignment_start())
                && pos < mate_pos
            {
                mate_diffs.push((mate_pos.get() - pos.get()) as u64);
            }

            reads += 1;
            if limit.is_some_and(|l| reads >= l) {
                break;
            }
        }

        let mut stats = Self::from_observations(&read_lens, &mut mate_diffs);
        stats.reads = reads;
        Ok(stats)
    }

    /// Estimate from observed read lengths and forward mate distances.
    ///
    /// The read length is the longest observed read. The fragment length is
    /// the mean of `distance + read_len` over the shortest 70% of distances,
    /// which keeps chimeric and intron-spanning pairs out of the estimate.
    pub fn from_observations(read_lens: &[u64], mate_diffs: &mut [u64]) -> Self {
        let read_len = read_lens.iter().copied().max().unwrap_or(0);
        if mate_diffs.is_empty() {
            return Self {
                reads: read_lens.len() as u64,
                read_len,
                paired: false,
                fragment_len: read_len,
                fragment_stdev: 0,
            };
        }

        mate_diffs.sort_unstable();
        let k = ((mate_diffs.len() as f64 * FRAGMENT_QUANTILE).ceil() as usize).max(1);
        let (sum, sumsq) = mate_diffs[..k].iter().fold((0u64, 0u64), |(s, sq), &d| {
            let frag = d + read_len;
            (s + frag, sq + frag * frag)
        });
        let fragment_len = sum / k as u64;
        let variance = (sumsq / k as u64).saturating_sub(fragment_len * fragment_len);

        Self {
            reads: read_lens.len() as u64,
            read_len,
            paired: true,
            fragment_len,
            fragment_stdev: (variance as f64).sqrt() as u64,
        }
    }
}
