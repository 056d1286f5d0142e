use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

/// Genomic strand/orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize )]
pub enum Strand {
    Plus,
    Minus,
    Unknown,
}

impl Strand {
    /// Parse the GTF/GFF strand column.
    pub fn from_gtf(s: &str) -> Option<Strand> {
        match s {
            "+" => Some(Strand::Plus),
            "-" => Some(Strand::Minus),
            "." | "?" => Some(Strand::Unknown),
            _ => None,
        }
    }

    /// Strand filter used by overlap queries: exact equality, `Unknown` never
    /// matches a stranded query.
    #[inline]
    pub fn matches(self, query: Strand) -> bool {
        self != Strand::Unknown && self == query
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strand::Plus => "+",
            Strand::Minus => "-",
            Strand::Unknown => ".",
        };
        write!(f, "{s}")
    }
}

/// Input rows only accept a definite strand.
impl FromStr for Strand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" => Ok(Strand::Plus),
            "-" => Ok(Strand::Minus),
            other => Err(format!("invalid strand '{other}' (expected '+' or '-')")),
        }
    }
}

/// A contiguous genomic interval.
/// Coordinates are 0-based, half-open: [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize )]
pub struct RefBlock {
    pub start: u32,
    pub end: u32,
}

impl RefBlock {
    /// Create a new block. Panics if start >= end.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start < end, "RefBlock requires start < end");
        Self { start, end }
    }

    /// Block covering the closed 1-based range `[start1, end1]`.
    /// Returns `None` for position 0 or an inverted range.
    pub fn from_one_based(start1: u32, end1: u32) -> Option<Self> {
        if start1 == 0 || end1 < start1 {
            return None;
        }
        Some(Self { start: start1 - 1, end: end1 })
    }

    #[inline]
    pub fn len(self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn overlaps(self, other: RefBlock) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[inline]
    pub fn contains(self, other: RefBlock) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}
