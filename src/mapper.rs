use serde::{Serialize, Deserialize};

use crate::query::{AnnotationStore, QueryService};
use crate::types::Strand;

/// One labeled input position. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomicRecord {
    pub chrom: String,
    pub position: u32,
    pub strand: Strand,
    pub label: String,
}

impl GenomicRecord {
    pub fn new(chrom: impl Into<String>, position: u32, strand: Strand, label: impl Into<String>) -> Self {
        Self {
            chrom: chrom.into(),
            position,
            strand,
            label: label.into(),
        }
    }
}

/// A labeled position resolved onto one transcript.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappedRecord {
    pub transcript_id: String,
    pub genomic_position: u32,
    pub label: String,
}

impl MappedRecord {
    /// The (transcript_id, genomic_position) join key.
    pub fn key(&self) -> (&str, u32) {
        (&self.transcript_id, self.genomic_position)
    }
}

/// Resolve one input row to every strand-matching transcript whose exon
/// covers it. The position is carried through unchanged.
pub fn map_row<S: AnnotationStore>(service: &QueryService<S>, record: &GenomicRecord) -> Vec<MappedRecord> {
    service
        .query_overlap(&record.chrom, record.position, record.strand)
        .into_iter()
        .map(|transcript_id| MappedRecord {
            transcript_id,
            genomic_position: record.position,
            label: record.label.clone(),
        })
        .collect()
}
