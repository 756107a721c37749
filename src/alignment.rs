use crate::error::{Error, RecordError, Result};
use crate::types::{HashMap, HashMapExt, Pos, RefId, Strand};
use noodles::bam;
use noodles::sam::alignment::record::cigar::Op as CigarOp;
use noodles::sam::alignment::record::cigar::op::Kind as CigarKind;
use noodles::sam::alignment::record::data::field::{Tag, Value};
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, trace};

/// Longest exon chain any realistic transcript produces.
pub const DEFAULT_MAX_SEGMENTS: usize = 127;

/// Exonic block of an alignment, 0-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: Pos,
    pub end: Pos,
}

impl Segment {
    pub fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }
}

/// Mate location as declared by the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatePosition {
    pub ref_id: RefId,
    pub pos: Pos,
}

/// One usable alignment, normalized into exonic segments.
#[derive(Debug, Clone)]
pub struct ReadAlignment {
    pub read_id: String,
    pub ref_id: RefId,
    pub segments: Vec<Segment>,
    /// `None` for unpaired reads and reads whose mate is unmapped.
    pub mate: Option<MatePosition>,
    pub unique: bool,
    /// Number of reported hits for the read (`NH`), at least 1.
    pub hits: u32,
    pub strand: Strand,
    pub supplementary: bool,
}

impl ReadAlignment {
    /// Unpaired, uniquely mapped alignment with the given segments.
    pub fn new(read_id: impl Into<String>, ref_id: RefId, segments: Vec<Segment>) -> Self {
        Self {
            read_id: read_id.into(),
            ref_id,
            segments,
            mate: None,
            unique: true,
            hits: 1,
            strand: Strand::Unknown,
            supplementary: false,
        }
    }

    pub fn with_mate(mut self, ref_id: RefId, pos: Pos) -> Self {
        self.mate = Some(MatePosition { ref_id, pos });
        self
    }

    pub fn with_hits(mut self, hits: u32) -> Self {
        self.hits = hits.max(1);
        self.unique = self.hits == 1;
        self
    }

    /// Leftmost aligned base. Segments are never empty for alignments handed
    /// out by a source.
    pub fn start(&self) -> Pos {
        self.segments.first().map_or(0, |s| s.start)
    }

    pub fn end(&self) -> Pos {
        self.segments.last().map_or(0, |s| s.end)
    }

    /// Share of one read's evidence carried by this alignment.
    pub fn weight(&self) -> f64 {
        1.0 / f64::from(self.hits.max(1))
    }
}

/// Stream of alignments in genomic order.
///
/// `current()` is always the next alignment nobody has consumed yet; a
/// consumer that stops at an alignment belonging to a later window leaves it
/// in place for the next one.
pub trait AlignmentSource {
    /// Fetch the next usable alignment. Returns `false` at end of input.
    fn advance(&mut self) -> Result<bool>;

    /// Alignment fetched by the last successful `advance`.
    fn current(&self) -> Option<&ReadAlignment>;

    /// True until the first call to `advance`.
    fn is_at_begin(&self) -> bool;
}

/// In-memory source over alignments that are already in genomic order.
#[derive(Debug, Default)]
pub struct VecSource {
    alignments: Vec<ReadAlignment>,
    next: usize,
    current: Option<usize>,
    started: bool,
}

impl VecSource {
    pub fn new(alignments: Vec<ReadAlignment>) -> Self {
        Self { alignments, next: 0, current: None, started: false }
    }
}

impl AlignmentSource for VecSource {
    fn advance(&mut self) -> Result<bool> {
        self.started = true;
        if self.next < self.alignments.len() {
            self.current = Some(self.next);
            self.next += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn current(&self) -> Option<&ReadAlignment> {
        self.current.map(|i| &self.alignments[i])
    }

    fn is_at_begin(&self) -> bool {
        !self.started
    }
}

/// Record filtering policy of the BAM source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Keep alignments with soft/hard clips or padding.
    pub allow_clip: bool,
    pub allow_supplementary: bool,
    pub allow_secondary: bool,
    pub max_segments: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            allow_clip: true,
            allow_supplementary: false,
            allow_secondary: false,
            max_segments: DEFAULT_MAX_SEGMENTS,
        }
    }
}

/// Counters for records the BAM source read and rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceStats {
    pub records: u64,
    pub unmapped: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub mate_in_intron: u64,
    pub usable: u64,
}

/// Result of walking a CIGAR string.
#[derive(Debug, Clone)]
pub struct CigarSegments {
    pub segments: Vec<Segment>,
    /// Bases of the read consumed by the CIGAR (M, I, S, =, X).
    pub read_len: usize,
    pub has_clip: bool,
}

/// Extract exon segments from a spliced alignment starting at 0-based `start`.
///
/// CIGAR `N` operations split exons (splice junctions); M, D, = and X extend
/// the current exon; I, S, H and P consume no reference.
pub fn segments_from_cigar(
    start: Pos,
    ops: &[(CigarKind, usize)],
    max_segments: usize,
) -> std::result::Result<CigarSegments, RecordError> {
    let mut segments: Vec<Segment> = Vec::new();
    let push = |segments: &mut Vec<Segment>, seg: Segment| {
        if segments.len() >= max_segments {
            return Err(RecordError::TooManySegments { count: segments.len() + 1, max: max_segments });
        }
        segments.push(seg);
        Ok(())
    };

    let mut exon_start = start;
    let mut len: Pos = 0;
    let mut read_len = 0usize;
    let mut has_clip = false;

    for &(kind, n) in ops {
        match kind {
            CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch => {
                len += n as Pos;
                read_len += n;
            }
            CigarKind::Deletion => len += n as Pos,
            CigarKind::Insertion => read_len += n,
            CigarKind::SoftClip => {
                read_len += n;
                has_clip = true;
            }
            CigarKind::HardClip | CigarKind::Pad => has_clip = true,
            CigarKind::Skip => {
                if len > 0 {
                    push(&mut segments, Segment::new(exon_start, exon_start + len - 1))?;
                }
                exon_start += len + n as Pos;
                len = 0;
            }
        }
    }

    if len > 0 {
        push(&mut segments, Segment::new(exon_start, exon_start + len - 1))?;
    }
    if segments.is_empty() {
        return Err(RecordError::NoAlignedBases);
    }

    Ok(CigarSegments { segments, read_len, has_clip })
}

/// Collect decoded CIGAR operations as `(kind, len)` pairs.
pub fn cigar_ops<I>(ops: I) -> std::result::Result<Vec<(CigarKind, usize)>, RecordError>
where
    I: IntoIterator<Item = io::Result<CigarOp>>,
{
    ops.into_iter()
        .map(|op| {
            let op = op.map_err(|e| RecordError::InvalidCigar(e.to_string()))?;
            Ok((op.kind(), op.len()))
        })
        .collect()
}

/// Bases the CIGAR consumes must match the stored sequence. Records without
/// a sequence (`*`) are not checked.
pub fn check_query_length(
    cigar: &CigarSegments,
    seq_len: usize,
) -> std::result::Result<(), RecordError> {
    if seq_len > 0 && cigar.read_len != seq_len {
        return Err(RecordError::QueryLengthMismatch { cigar: cigar.read_len, sequence: seq_len });
    }
    Ok(())
}

/// Hit count from an `NH` value; missing or non-positive values count as 1.
pub fn hit_count(nh: Option<i64>) -> u32 {
    match nh {
        Some(n) if n > 1 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// Alignment source backed by a coordinate-sorted BAM file.
pub struct BamAlignments<R> {
    reader: bam::io::Reader<R>,
    record: bam::Record,
    config: SourceConfig,
    refname_to_id: HashMap<String, RefId>,
    current: Option<ReadAlignment>,
    started: bool,
    stats: SourceStats,
}

/// Open a BAM file as an alignment source. Failing to open or to read the
/// header is reported as `Error::SourceOpen`.
pub fn open_bam(path: &Path, config: SourceConfig) -> Result<BamAlignments<impl Read + use<>>> {
    let source_open = |source: io::Error| Error::SourceOpen { path: path.to_path_buf(), source };
    let reader = bam::io::reader::Builder
        .build_from_path(path)
        .map_err(source_open)?;
    BamAlignments::new(reader, config).map_err(|e| match e {
        Error::Io(source) => source_open(source),
        other => other,
    })
}

enum Decoded {
    Usable(ReadAlignment),
    Unmapped,
    Filtered,
    MateInIntron,
}

impl<R: Read> BamAlignments<R> {
    /// Wrap a BAM reader positioned at the start of the stream; reads the header.
    pub fn new(mut reader: bam::io::Reader<R>, config: SourceConfig) -> Result<Self> {
        let header = reader.read_header()?;
        let mut refname_to_id = HashMap::with_capacity(header.reference_sequences().len());
        for (i, name) in header.reference_sequences().keys().enumerate() {
            refname_to_id.insert(name.to_string(), i);
        }
        Ok(Self {
            reader,
            record: bam::Record::default(),
            config,
            refname_to_id,
            current: None,
            started: false,
            stats: SourceStats::default(),
        })
    }

    pub fn refname_to_id(&self) -> &HashMap<String, RefId> {
        &self.refname_to_id
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    fn decode(&self) -> std::result::Result<Decoded, RecordError> {
        let record = &self.record;
        let flags = record.flags();
        if flags.is_unmapped() {
            return Ok(Decoded::Unmapped);
        }
        if (flags.is_secondary() && !self.config.allow_secondary)
            || (flags.is_supplementary() && !self.config.allow_supplementary)
        {
            return Ok(Decoded::Filtered);
        }

        let ref_id = match record.reference_sequence_id() {
            Some(Ok(id)) => id,
            _ => return Err(RecordError::MissingPosition),
        };
        let start = match record.alignment_start() {
            Some(Ok(pos)) => (pos.get() - 1) as Pos,
            _ => return Err(RecordError::MissingPosition),
        };

        let ops = cigar_ops(record.cigar().iter())?;
        let cigar = segments_from_cigar(start, &ops, self.config.max_segments)?;
        check_query_length(&cigar, record.sequence().len())?;
        if cigar.has_clip && !self.config.allow_clip {
            return Ok(Decoded::Filtered);
        }

        let mate = if flags.is_segmented() && !flags.is_mate_unmapped() {
            match (record.mate_reference_sequence_id(), record.mate_alignment_start()) {
                (Some(Ok(mate_ref)), Some(Ok(mate_pos))) => Some(MatePosition {
                    ref_id: mate_ref,
                    pos: (mate_pos.get() - 1) as Pos,
                }),
                _ => None,
            }
        } else {
            None
        };

        // A mate declared inside one of our introns cannot belong to the same fragment.
        if let Some(mate) = mate
            && mate.ref_id == ref_id
            && cigar
                .segments
                .windows(2)
                .any(|w| mate.pos >= w[0].end && mate.pos <= w[1].start)
        {
            return Ok(Decoded::MateInIntron);
        }

        let data = record.data();
        let hits = match data.get(&Tag::ALIGNMENT_HIT_COUNT) {
            Some(Ok(v)) => hit_count(v.as_int()),
            _ => 1,
        };
        let supplementary = flags.is_supplementary();
        let unique = hits <= 1 && !(supplementary && data.get(&Tag::new(b'X', b'Z')).is_some());

        let strand = if cigar.segments.len() == 1 {
            Strand::Unknown
        } else {
            match data.get(&Tag::new(b'X', b'S')) {
                Some(Ok(Value::Character(b'-'))) => Strand::Minus,
                Some(Ok(_)) => Strand::Plus,
                _ => Strand::Unknown,
            }
        };

        Ok(Decoded::Usable(ReadAlignment {
            read_id: record.name().map(|n| n.to_string()).unwrap_or_default(),
            ref_id,
            segments: cigar.segments,
            mate,
            unique,
            hits,
            strand,
            supplementary,
        }))
    }
}

impl<R: Read> AlignmentSource for BamAlignments<R> {
    fn advance(&mut self) -> Result<bool> {
        self.started = true;
        loop {
            if self.reader.read_record(&mut self.record)? == 0 {
                self.current = None;
                return Ok(false);
            }
            self.stats.records += 1;

            match self.decode() {
                Ok(Decoded::Usable(aln)) => {
                    self.stats.usable += 1;
                    self.current = Some(aln);
                    return Ok(true);
                }
                Ok(Decoded::Unmapped) => self.stats.unmapped += 1,
                Ok(Decoded::Filtered) => self.stats.filtered += 1,
                Ok(Decoded::MateInIntron) => {
                    self.stats.mate_in_intron += 1;
                    trace!(read = ?self.record.name(), "mate falls inside an intron, skipping");
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    debug!(read = ?self.record.name(), error = %e, "skipping malformed record");
                }
            }
        }
    }

    fn current(&self) -> Option<&ReadAlignment> {
        self.current.as_ref()
    }

    fn is_at_begin(&self) -> bool {
        !self.started
    }
}
