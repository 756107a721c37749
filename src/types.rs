/// 0-based index of a reference sequence in the BAM header.
pub type RefId = usize;
/// 0-based genomic coordinate.
pub type Pos = u64;

// Fast hash maps / sets using AHash instead of the default SipHash.
// Import these throughout the codebase with `use crate::types::HashMap`.
// Also import `HashMapExt` when you need `::new()` or `::with_capacity()`.
pub type HashMap<K, V> = ahash::HashMap<K, V>;
pub(crate) use ahash::HashMapExt;

/// Strand hint carried by a read or a subexon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strand {
    Minus,
    #[default]
    Unknown,
    Plus,
}

impl Strand {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Plus),
            '-' => Some(Self::Minus),
            '.' | '?' => Some(Self::Unknown),
            _ => None,
        }
    }
}
