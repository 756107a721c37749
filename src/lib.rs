//! subexon-constraints: turn aligned reads into subexon compatibility constraints.
//!
//! A window of subexons (disjoint genomic intervals) is matched against the
//! alignments that fall inside it. Each alignment becomes a bit set of the
//! subexons it touches, mates of a fragment are linked through an online
//! mate index, and identical sets are coalesced into weighted constraints for
//! the downstream assembly stage.
//!
//! # Library usage
//!
//! ```no_run
//! use subexon_constraints::{SubexonWindow, Subexon, Strand, Unnormalized, build_window};
//! use subexon_constraints::alignment::{SourceConfig, open_bam};
//!
//! # fn main() -> subexon_constraints::Result<()> {
//! let mut source = open_bam("reads.bam".as_ref(), SourceConfig::default())?;
//! let window = SubexonWindow::new(0, vec![
//!     Subexon::new(1_000, 1_199, Strand::Plus),
//!     Subexon::new(1_200, 1_349, Strand::Plus),
//! ]);
//! let result = build_window(&mut source, &window, &Unnormalized)?;
//! for ct in &result.constraints {
//!     println!("{:?} support={}", ct.vector.iter().collect::<Vec<_>>(), ct.support);
//! }
//! # Ok(())
//! # }
//! ```

pub mod abundance;
pub mod alignment;
pub mod constraints;
pub mod error;
pub mod library;
pub mod mate_index;
pub mod subexon;
pub mod subexon_set;
pub mod types;

// Flat re-exports for the most commonly used public types.
pub use abundance::{AbundanceNormalizer, TotalSupport, Unnormalized};
pub use alignment::{AlignmentSource, ReadAlignment, Segment, VecSource};
pub use constraints::{
    Constraint, ConstraintBuilder, MateLink, WindowConstraints, build_window, convert_alignment,
};
pub use error::{Error, RecordError, Result};
pub use mate_index::MateReadIndex;
pub use subexon::{Subexon, SubexonWindow};
pub use subexon_set::SubexonSet;
pub use types::{Pos, RefId, Strand};
