use crate::error::{Error, Result};
use crate::types::{HashMap, Pos, RefId, Strand};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One atomic interval of the subexon partition, 0-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subexon {
    pub start: Pos,
    pub end: Pos,
    pub strand: Strand,
}

impl Subexon {
    pub fn new(start: Pos, end: Pos, strand: Strand) -> Self {
        Self { start, end, strand }
    }

    /// True when `next` starts right after this subexon ends.
    pub fn adjoins(&self, next: &Subexon) -> bool {
        next.start == self.end + 1
    }
}

/// Disjoint, start-sorted subexons of one reference span, indexed `0..N`.
#[derive(Debug, Clone)]
pub struct SubexonWindow {
    pub ref_id: RefId,
    subexons: Vec<Subexon>,
}

impl SubexonWindow {
    /// Callers guarantee the intervals are sorted by start and do not overlap.
    pub fn new(ref_id: RefId, subexons: Vec<Subexon>) -> Self {
        debug_assert!(subexons.windows(2).all(|w| w[0].end < w[1].start));
        Self { ref_id, subexons }
    }

    pub fn subexons(&self) -> &[Subexon] {
        &self.subexons
    }

    pub fn len(&self) -> usize {
        self.subexons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subexons.is_empty()
    }

    pub fn start(&self) -> Option<Pos> {
        self.subexons.first().map(|s| s.start)
    }

    pub fn end(&self) -> Option<Pos> {
        self.subexons.last().map(|s| s.end)
    }
}

/// Load a tab-separated subexon table (`chrom start end strand`) and split it
/// into windows.
///
/// A new window starts when the reference changes or when the gap to the
/// previous subexon is wider than `max_gap`. Windows come back in BAM header
/// order so they can be consumed alongside a coordinate-sorted BAM.
pub fn load_windows(
    path: &Path,
    refname_to_id: &HashMap<String, RefId>,
    max_gap: Pos,
) -> Result<Vec<SubexonWindow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows: Vec<(RefId, Subexon, usize)> = Vec::new();

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = line_idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (ref_id, subexon) = parse_row(trimmed, line_no, refname_to_id)?;
        rows.push((ref_id, subexon, line_no));
    }

    rows.sort_by_key(|(ref_id, s, _)| (*ref_id, s.start));
    split_windows(rows, max_gap)
}

fn parse_row(
    line: &str,
    line_no: usize,
    refname_to_id: &HashMap<String, RefId>,
) -> Result<(RefId, Subexon)> {
    let parse_err = |msg: String| Error::SubexonParse { line: line_no, msg };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 4 {
        return Err(parse_err(format!("expected 4 columns, found {}", fields.len())));
    }
    let ref_id = *refname_to_id
        .get(fields[0])
        .ok_or_else(|| Error::UnknownReference(fields[0].to_string()))?;
    let start: Pos = fields[1]
        .parse()
        .map_err(|_| parse_err(format!("bad start '{}'", fields[1])))?;
    let end: Pos = fields[2]
        .parse()
        .map_err(|_| parse_err(format!("bad end '{}'", fields[2])))?;
    if end < start {
        return Err(parse_err(format!("end {end} is before start {start}")));
    }
    let strand = fields[3]
        .chars()
        .next()
        .and_then(Strand::from_char)
        .ok_or_else(|| parse_err(format!("bad strand '{}'", fields[3])))?;

    Ok((ref_id, Subexon::new(start, end, strand)))
}

fn split_windows(rows: Vec<(RefId, Subexon, usize)>, max_gap: Pos) -> Result<Vec<SubexonWindow>> {
    let mut windows: Vec<SubexonWindow> = Vec::new();
    let mut current: Option<(RefId, Vec<Subexon>)> = None;

    for (ref_id, subexon, line_no) in rows {
        match &mut current {
            Some((cur_ref, subexons)) if *cur_ref == ref_id => {
                // Sorted by start, so only the previous subexon can overlap.
                let prev = subexons[subexons.len() - 1];
                if subexon.start <= prev.end {
                    return Err(Error::SubexonParse {
                        line: line_no,
                        msg: format!(
                            "subexons [{}, {}] and [{}, {}] overlap",
                            prev.start, prev.end, subexon.start, subexon.end
                        ),
                    });
                }
                if subexon.start - prev.end - 1 > max_gap {
                    let done = std::mem::take(subexons);
                    windows.push(SubexonWindow::new(ref_id, done));
                }
                subexons.push(subexon);
            }
            _ => {
                if let Some((done_ref, done)) = current.take() {
                    windows.push(SubexonWindow::new(done_ref, done));
                }
                current = Some((ref_id, vec![subexon]));
            }
        }
    }
    if let Some((ref_id, subexons)) = current {
        windows.push(SubexonWindow::new(ref_id, subexons));
    }

    Ok(windows)
}
