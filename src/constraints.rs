//! Compatibility constraints for one window of subexons.
//!
//! Every usable alignment becomes a [`SubexonSet`] naming the subexons it
//! touches. Mates of one fragment are tied together with a [`MateLink`].
//! Once the window's alignments are consumed the sets are sorted and runs of
//! identical sets are merged, summing their evidence.

use crate::abundance::AbundanceNormalizer;
use crate::alignment::{AlignmentSource, ReadAlignment, Segment};
use crate::error::Result;
use crate::mate_index::MateReadIndex;
use crate::subexon::{Subexon, SubexonWindow};
use crate::subexon_set::SubexonSet;
use std::cmp::Ordering;
use std::ops::AddAssign;
use tracing::{debug, trace};

/// A group of fragments compatible with exactly the subexons in `vector`.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub vector: SubexonSet,
    pub weight: f64,
    pub abundance: f64,
    pub normalized_abundance: f64,
    pub support: u32,
    pub unique_support: u32,
}

impl Constraint {
    fn from_alignment(vector: SubexonSet, aln: &ReadAlignment) -> Self {
        let weight = aln.weight();
        Self {
            vector,
            weight,
            abundance: weight,
            normalized_abundance: 0.0,
            support: 1,
            unique_support: u32::from(aln.unique),
        }
    }

    fn absorb(&mut self, other: &Constraint) {
        self.weight += other.weight;
        self.abundance += other.abundance;
        self.support += other.support;
        self.unique_support += other.unique_support;
    }
}

/// Constraints `i` and `j` (`i <= j`) hold the two mates of the same fragments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MateLink {
    pub i: usize,
    pub j: usize,
    /// Reads behind the link; each fragment contributes both of its mates.
    pub support: u32,
    pub abundance: f64,
    pub normalized_abundance: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub alignments: u64,
    pub incompatible: u64,
    pub mate_pairs: u64,
    pub unresolved_mates: u64,
    pub constraints: u64,
    pub mate_links: u64,
}

impl AddAssign for BuildStats {
    fn add_assign(&mut self, other: Self) {
        self.alignments += other.alignments;
        self.incompatible += other.incompatible;
        self.mate_pairs += other.mate_pairs;
        self.unresolved_mates += other.unresolved_mates;
        self.constraints += other.constraints;
        self.mate_links += other.mate_links;
    }
}

/// Map an alignment's segments onto the subexons, starting the scan at
/// subexon `first`.
///
/// Each segment must be covered by a run of adjoining subexons. Segment ends
/// that are splice sites (every end except the alignment's outer two) must
/// coincide with subexon boundaries. Returns `None` when the alignment cannot
/// be expressed against the partition.
pub fn convert_alignment(
    segments: &[Segment],
    subexons: &[Subexon],
    first: usize,
) -> Option<SubexonSet> {
    let n = subexons.len();
    if segments.is_empty() || n == 0 {
        return None;
    }
    let last_seg = segments.len() - 1;
    let mut set = SubexonSet::new(n);
    let mut k = first;

    for (i, seg) in segments.iter().enumerate() {
        while k < n && subexons[k].end < seg.start {
            k += 1;
        }
        if k >= n || subexons[k].start > seg.start {
            return None;
        }
        if i > 0 && subexons[k].start != seg.start {
            return None;
        }

        let left = k;
        let mut right = k;
        while subexons[right].end < seg.end {
            if right + 1 >= n || !subexons[right].adjoins(&subexons[right + 1]) {
                return None;
            }
            right += 1;
        }
        if i < last_seg && subexons[right].end != seg.end {
            return None;
        }

        for idx in left..=right {
            set.set(idx);
        }
        k = right;
    }

    Some(set)
}

/// Window-scoped constraint state: the constraint list, the mate links and
/// the mate index. Nothing here outlives a call to [`ConstraintBuilder::build`].
#[derive(Debug, Default)]
pub struct ConstraintBuilder {
    constraints: Vec<Constraint>,
    mates: Vec<MateLink>,
    mate_index: MateReadIndex,
    stats: BuildStats,
}

impl ConstraintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
        self.mates.clear();
        self.mate_index.clear();
        self.stats = BuildStats::default();
    }

    /// Consume the alignments of `window` from `source` and leave the sorted,
    /// coalesced constraints in the builder.
    ///
    /// Alignments on earlier references or ending before the window are
    /// skipped; the first alignment that starts past the window is left in
    /// the source for the next window.
    pub fn build<S>(&mut self, source: &mut S, window: &SubexonWindow) -> Result<()>
    where
        S: AlignmentSource + ?Sized,
    {
        self.clear();
        let subexons = window.subexons();
        if subexons.is_empty() {
            return Ok(());
        }

        if source.is_at_begin() {
            source.advance()?;
        }

        let mut tag = 0;
        while let Some(aln) = source.current() {
            match aln.ref_id.cmp(&window.ref_id) {
                Ordering::Less => {
                    source.advance()?;
                    continue;
                }
                Ordering::Greater => break,
                Ordering::Equal => {}
            }

            // First subexon that can overlap this alignment.
            while tag < subexons.len() && subexons[tag].end < aln.start() {
                tag += 1;
            }
            if tag >= subexons.len() {
                break;
            }
            if aln.end() >= subexons[tag].start {
                self.add_alignment(aln, subexons, tag);
            } else {
                // Falls entirely in a gap between two subexons.
                self.stats.alignments += 1;
                self.stats.incompatible += 1;
                trace!(read = %aln.read_id, start = aln.start(), "alignment between subexons");
            }
            source.advance()?;
        }

        self.coalesce();
        debug!(
            ref_id = window.ref_id,
            start = ?window.start(),
            end = ?window.end(),
            subexons = subexons.len(),
            alignments = self.stats.alignments,
            incompatible = self.stats.incompatible,
            constraints = self.stats.constraints,
            mate_links = self.stats.mate_links,
            "window constraints built"
        );
        Ok(())
    }

    fn add_alignment(&mut self, aln: &ReadAlignment, subexons: &[Subexon], tag: usize) {
        self.stats.alignments += 1;
        let Some(vector) = convert_alignment(&aln.segments, subexons, tag) else {
            self.stats.incompatible += 1;
            trace!(read = %aln.read_id, start = aln.start(), "incompatible with subexons");
            return;
        };

        let idx = self.constraints.len();
        let ct = Constraint::from_alignment(vector, aln);

        if let Some(mate) = aln.mate
            && mate.ref_id == aln.ref_id
        {
            let pos = aln.start();
            let mate_idx = match mate.pos.cmp(&pos) {
                Ordering::Less => self.mate_index.query(&aln.read_id, pos),
                Ordering::Greater => {
                    self.mate_index.insert(&aln.read_id, pos, idx, mate.pos);
                    None
                }
                // Either mate may come first; whichever misses parks itself.
                Ordering::Equal => {
                    let found = self.mate_index.query(&aln.read_id, pos);
                    if found.is_none() {
                        self.mate_index.insert(&aln.read_id, pos, idx, mate.pos);
                    }
                    found
                }
            };

            match mate_idx {
                Some(i) => {
                    self.stats.mate_pairs += 1;
                    self.mates.push(MateLink {
                        i,
                        j: idx,
                        support: 2,
                        abundance: (self.constraints[i].weight + ct.weight) / 2.0,
                        normalized_abundance: 0.0,
                    });
                }
                None if mate.pos < pos => self.stats.unresolved_mates += 1,
                None => {}
            }
        }

        self.constraints.push(ct);
    }

    /// Sort the constraints and merge runs of identical vectors, then remap
    /// and merge the mate links onto the merged list.
    fn coalesce(&mut self) {
        let n = self.constraints.len();
        let mut tagged: Vec<(usize, Constraint)> =
            std::mem::take(&mut self.constraints).into_iter().enumerate().collect();
        tagged.sort_by(|a, b| a.1.vector.cmp(&b.1.vector));

        let mut new_idx = vec![0usize; n];
        let mut merged: Vec<Constraint> = Vec::with_capacity(n);
        for (orig, ct) in tagged {
            match merged.last_mut() {
                Some(last) if last.vector == ct.vector => last.absorb(&ct),
                _ => merged.push(ct),
            }
            new_idx[orig] = merged.len() - 1;
        }
        self.constraints = merged;

        for link in &mut self.mates {
            let (a, b) = (new_idx[link.i], new_idx[link.j]);
            link.i = a.min(b);
            link.j = a.max(b);
        }
        self.mates.sort_by_key(|m| (m.i, m.j));
        self.mates.dedup_by(|next, kept| {
            if next.i == kept.i && next.j == kept.j {
                kept.support += next.support;
                kept.abundance += next.abundance;
                true
            } else {
                false
            }
        });

        self.stats.constraints = self.constraints.len() as u64;
        self.stats.mate_links = self.mates.len() as u64;
    }

    pub fn normalize(&mut self, normalizer: &dyn AbundanceNormalizer) {
        normalizer.normalize(&mut self.constraints, &mut self.mates);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn mate_links(&self) -> &[MateLink] {
        &self.mates
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn into_parts(self) -> (Vec<Constraint>, Vec<MateLink>, BuildStats) {
        (self.constraints, self.mates, self.stats)
    }
}

/// Constraints of one window, ready for the downstream assembly stage.
#[derive(Debug, Clone, Default)]
pub struct WindowConstraints {
    pub constraints: Vec<Constraint>,
    pub mates: Vec<MateLink>,
    pub stats: BuildStats,
}

/// Build and normalize one window with freshly instantiated builder state.
pub fn build_window<S>(
    source: &mut S,
    window: &SubexonWindow,
    normalizer: &dyn AbundanceNormalizer,
) -> Result<WindowConstraints>
where
    S: AlignmentSource + ?Sized,
{
    let mut builder = ConstraintBuilder::new();
    builder.build(source, window)?;
    builder.normalize(normalizer);
    let (constraints, mates, stats) = builder.into_parts();
    Ok(WindowConstraints { constraints, mates, stats })
}
