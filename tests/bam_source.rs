/// Alignment source, library statistics and subexon table tests.
///
/// BAM-backed tests write a small BAM into the system temp dir with noodles
/// and read it back through `open_bam`.
use noodles::bam;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::{Op as SamCigarOp, op::Kind as CigarKind};
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{Cigar as SamCigar, Data as SamData, RecordBuf, Sequence};
use noodles::sam::header::record::value::{Map, map::ReferenceSequence};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use subexon_constraints::alignment::{
    SourceConfig, check_query_length, cigar_ops, hit_count, open_bam, segments_from_cigar,
};
use subexon_constraints::library::LibraryStats;
use subexon_constraints::subexon::load_windows;
use subexon_constraints::types::HashMap;
use subexon_constraints::{AlignmentSource, Error, RecordError, Segment, Strand};

// ── helpers ──────────────────────────────────────────────────────────────────

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("subexon_constraints_{}_{}", std::process::id(), name))
}

fn header() -> sam::Header {
    let len = NonZeroUsize::try_from(10_000).unwrap();
    sam::Header::builder()
        .add_reference_sequence("chr1", Map::<ReferenceSequence>::new(len))
        .add_reference_sequence("chr2", Map::<ReferenceSequence>::new(len))
        .build()
}

struct Rec<'a> {
    name: &'a str,
    flags: Flags,
    pos: usize,
    cigar: &'a [(CigarKind, usize)],
    seq_len: usize,
    mate_pos: Option<usize>,
    tags: Vec<(Tag, Value)>,
}

impl<'a> Rec<'a> {
    fn new(name: &'a str, pos: usize, cigar: &'a [(CigarKind, usize)], seq_len: usize) -> Self {
        Self { name, flags: Flags::empty(), pos, cigar, seq_len, mate_pos: None, tags: Vec::new() }
    }

    fn build(self) -> RecordBuf {
        let cigar: SamCigar = self.cigar.iter().map(|&(k, n)| SamCigarOp::new(k, n)).collect();
        let data: SamData = self.tags.into_iter().collect();
        let mut builder = RecordBuf::builder()
            .set_name(self.name)
            .set_flags(self.flags)
            .set_reference_sequence_id(0)
            .set_alignment_start(Position::try_from(self.pos).unwrap())
            .set_cigar(cigar)
            .set_sequence(Sequence::from(vec![b'A'; self.seq_len]))
            .set_data(data);
        if let Some(mate_pos) = self.mate_pos {
            builder = builder
                .set_mate_reference_sequence_id(0)
                .set_mate_alignment_start(Position::try_from(mate_pos).unwrap());
        }
        builder.build()
    }
}

fn write_bam(path: &Path, records: &[RecordBuf]) {
    let header = header();
    let mut writer = bam::io::Writer::new(std::fs::File::create(path).unwrap());
    writer.write_header(&header).unwrap();
    for record in records {
        writer.write_alignment_record(&header, record).unwrap();
    }
    drop(writer);
}

const SPLICED: &[(CigarKind, usize)] = &[(CigarKind::Match, 5), (CigarKind::Skip, 100), (CigarKind::Match, 5)];
const FULL: &[(CigarKind, usize)] = &[(CigarKind::Match, 10)];
const CLIPPED: &[(CigarKind, usize)] = &[(CigarKind::SoftClip, 2), (CigarKind::Match, 8)];

fn fixture_records() -> Vec<RecordBuf> {
    let unmapped = RecordBuf::builder().set_name("unmapped").set_flags(Flags::UNMAPPED).build();

    let mut spliced = Rec::new("spliced", 101, SPLICED, 10);
    spliced.tags = vec![
        (Tag::new(b'X', b'S'), Value::Character(b'-')),
        (Tag::ALIGNMENT_HIT_COUNT, Value::UInt8(1)),
    ];

    let mut multi = Rec::new("multi", 301, FULL, 10);
    multi.tags = vec![(Tag::ALIGNMENT_HIT_COUNT, Value::UInt8(3))];

    let mut intron_mate = Rec::new("intron_mate", 501, SPLICED, 10);
    intron_mate.flags = Flags::SEGMENTED | Flags::FIRST_SEGMENT;
    intron_mate.mate_pos = Some(551);

    let mut paired = Rec::new("paired", 701, FULL, 10);
    paired.flags = Flags::SEGMENTED | Flags::FIRST_SEGMENT;
    paired.mate_pos = Some(901);

    let mut secondary = Rec::new("secondary", 801, FULL, 10);
    secondary.flags = Flags::SECONDARY;

    let clipped = Rec::new("clipped", 851, CLIPPED, 10);

    vec![
        unmapped,
        spliced.build(),
        multi.build(),
        intron_mate.build(),
        paired.build(),
        secondary.build(),
        clipped.build(),
    ]
}

// ── CIGAR walking ────────────────────────────────────────────────────────────

#[test]
fn skip_splits_segments() {
    let out = segments_from_cigar(100, SPLICED, 127).unwrap();
    assert_eq!(out.segments, vec![Segment::new(100, 104), Segment::new(205, 209)]);
    assert_eq!(out.read_len, 10);
    assert!(!out.has_clip);
}

#[test]
fn deletions_extend_and_insertions_do_not() {
    let ops = [
        (CigarKind::SoftClip, 2),
        (CigarKind::Match, 3),
        (CigarKind::Deletion, 2),
        (CigarKind::Match, 3),
        (CigarKind::Insertion, 1),
        (CigarKind::Match, 2),
    ];
    let out = segments_from_cigar(0, &ops, 127).unwrap();
    assert_eq!(out.segments, vec![Segment::new(0, 9)]);
    assert_eq!(out.read_len, 11);
    assert!(out.has_clip);
}

#[test]
fn segment_limit_is_enforced() {
    let ops = [
        (CigarKind::Match, 5),
        (CigarKind::Skip, 10),
        (CigarKind::Match, 5),
        (CigarKind::Skip, 10),
        (CigarKind::Match, 5),
    ];
    assert_eq!(
        segments_from_cigar(0, &ops, 2).unwrap_err(),
        RecordError::TooManySegments { count: 3, max: 2 }
    );
    assert_eq!(segments_from_cigar(0, &ops, 3).unwrap().segments.len(), 3);
}

#[test]
fn clip_only_alignment_is_malformed() {
    let ops = [(CigarKind::SoftClip, 5)];
    assert_eq!(segments_from_cigar(0, &ops, 127).unwrap_err(), RecordError::NoAlignedBases);
}

#[test]
fn query_length_must_match_sequence() {
    let cigar = segments_from_cigar(0, FULL, 127).unwrap();
    assert_eq!(check_query_length(&cigar, 10), Ok(()));
    assert_eq!(check_query_length(&cigar, 0), Ok(()));
    assert_eq!(
        check_query_length(&cigar, 8).unwrap_err(),
        RecordError::QueryLengthMismatch { cigar: 10, sequence: 8 }
    );
}

#[test]
fn undecodable_cigar_op_is_reported_as_invalid_cigar() {
    let ops = vec![
        Ok(SamCigarOp::new(CigarKind::Match, 5)),
        Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad op")),
    ];
    assert!(matches!(cigar_ops(ops), Err(RecordError::InvalidCigar(_))));

    let ops = vec![Ok(SamCigarOp::new(CigarKind::Match, 5)), Ok(SamCigarOp::new(CigarKind::Skip, 3))];
    assert_eq!(cigar_ops(ops).unwrap(), vec![(CigarKind::Match, 5), (CigarKind::Skip, 3)]);
}

#[test]
fn hit_count_saturates_and_defaults_to_one() {
    assert_eq!(hit_count(None), 1);
    assert_eq!(hit_count(Some(0)), 1);
    assert_eq!(hit_count(Some(-3)), 1);
    assert_eq!(hit_count(Some(4)), 4);
    assert_eq!(hit_count(Some(i64::from(u32::MAX) + 10)), u32::MAX);
}

// ── BAM source ───────────────────────────────────────────────────────────────

#[test]
fn bam_source_normalizes_and_filters_records() {
    let path = temp_path("source.bam");
    write_bam(&path, &fixture_records());

    let mut source = open_bam(&path, SourceConfig::default()).unwrap();
    assert_eq!(source.refname_to_id()["chr1"], 0);
    assert_eq!(source.refname_to_id()["chr2"], 1);
    assert!(source.is_at_begin());

    let mut usable = Vec::new();
    while source.advance().unwrap() {
        usable.push(source.current().unwrap().clone());
    }
    let _ = std::fs::remove_file(&path);

    let names: Vec<&str> = usable.iter().map(|a| a.read_id.as_str()).collect();
    assert_eq!(names, vec!["spliced", "multi", "paired", "clipped"]);

    let spliced = &usable[0];
    assert_eq!(spliced.segments, vec![Segment::new(100, 104), Segment::new(205, 209)]);
    assert_eq!(spliced.strand, Strand::Minus);
    assert!(spliced.unique);
    assert!(spliced.mate.is_none());

    let multi = &usable[1];
    assert_eq!(multi.hits, 3);
    assert!(!multi.unique);
    assert_eq!(multi.strand, Strand::Unknown);

    let paired = &usable[2];
    let mate = paired.mate.unwrap();
    assert_eq!((mate.ref_id, mate.pos), (0, 900));

    assert_eq!(usable[3].segments, vec![Segment::new(850, 857)]);

    let stats = source.stats();
    assert_eq!(stats.records, 7);
    assert_eq!(stats.usable, 4);
    assert_eq!(stats.unmapped, 1);
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.malformed, 0);
    assert_eq!(stats.mate_in_intron, 1);
}

#[test]
fn bam_source_can_reject_clipped_alignments() {
    let path = temp_path("noclip.bam");
    write_bam(&path, &[Rec::new("clipped", 851, CLIPPED, 10).build(), Rec::new("full", 900, FULL, 10).build()]);

    let config = SourceConfig { allow_clip: false, ..SourceConfig::default() };
    // The source does not borrow the path it was opened from.
    let mut source = {
        let owned = path.clone();
        open_bam(&owned, config).unwrap()
    };
    assert!(source.advance().unwrap());
    assert_eq!(source.current().unwrap().read_id, "full");
    assert!(!source.advance().unwrap());
    assert!(source.current().is_none());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_bam_is_a_source_open_failure() {
    let path = temp_path("does_not_exist.bam");
    match open_bam(&path, SourceConfig::default()) {
        Err(Error::SourceOpen { path: p, .. }) => assert_eq!(p, path),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("opening a missing BAM must fail"),
    }
}

// ── library statistics ───────────────────────────────────────────────────────

#[test]
fn fragment_length_uses_shortest_distances() {
    let stats = LibraryStats::from_observations(&[100, 90, 100], &mut [300, 100, 200, 5000]);
    assert!(stats.paired);
    assert_eq!(stats.read_len, 100);
    assert_eq!(stats.fragment_len, 300);
    assert_eq!(stats.fragment_stdev, 81);
}

#[test]
fn unpaired_library_uses_read_length() {
    let stats = LibraryStats::from_observations(&[75, 80], &mut []);
    assert!(!stats.paired);
    assert_eq!(stats.fragment_len, 80);
    assert_eq!(stats.fragment_stdev, 0);
}

#[test]
fn library_sampling_reads_primary_records() {
    let path = temp_path("library.bam");
    write_bam(&path, &fixture_records());
    let stats = LibraryStats::sample(&path, None).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(stats.reads, 5);
    assert_eq!(stats.read_len, 10);
    assert!(stats.paired);
    assert_eq!(stats.fragment_len, 135);
    assert_eq!(stats.fragment_stdev, 75);
}

// ── subexon table ────────────────────────────────────────────────────────────

fn refs() -> HashMap<String, usize> {
    let mut refs = HashMap::default();
    refs.insert("chr1".to_string(), 0);
    refs.insert("chr2".to_string(), 1);
    refs
}

#[test]
fn subexon_table_splits_windows_on_reference_and_gap() {
    let path = temp_path("subexons.tsv");
    std::fs::write(
        &path,
        "# chrom\tstart\tend\tstrand\n\
         chr2\t10\t20\t.\n\
         chr1\t200\t299\t+\n\
         chr1\t100\t199\t+\n\
         \n\
         chr1\t5000\t5099\t-\n",
    )
    .unwrap();
    let windows = load_windows(&path, &refs(), 1_000).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0].ref_id, 0);
    assert_eq!((windows[0].start(), windows[0].end()), (Some(100), Some(299)));
    assert_eq!(windows[0].len(), 2);
    assert_eq!(windows[1].subexons()[0].strand, Strand::Minus);
    assert_eq!(windows[2].ref_id, 1);
    assert_eq!(windows[2].subexons()[0].strand, Strand::Unknown);
}

#[test]
fn subexon_table_rejects_unknown_reference_and_overlaps() {
    let path = temp_path("bad_ref.tsv");
    std::fs::write(&path, "chrX\t1\t10\t+\n").unwrap();
    let err = load_windows(&path, &refs(), 1_000).unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(matches!(err, Error::UnknownReference(ref name) if name == "chrX"));

    let path = temp_path("overlap.tsv");
    std::fs::write(&path, "chr1\t1\t10\t+\nchr1\t5\t20\t+\n").unwrap();
    let err = load_windows(&path, &refs(), 1_000).unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(matches!(err, Error::SubexonParse { line: 2, .. }));
}
