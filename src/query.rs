//! Strand-aware exon overlap lookup on top of an annotation store.

use std::path::Path;

use anyhow::Result;
use log::debug;

use crate::error::QueryError;
use crate::index::{Feature, FeatureIndex};
use crate::types::Strand;

/// Feature type used for transcript overlap.
pub const EXON: &str = "exon";

/// The single primitive the mapper needs from an annotation database:
/// features of one type overlapping a closed 1-based region.
pub trait AnnotationStore {
    fn region(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        feature_type: &str,
    ) -> Result<Vec<&Feature>, QueryError>;
}

impl AnnotationStore for FeatureIndex {
    fn region(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        feature_type: &str,
    ) -> Result<Vec<&Feature>, QueryError> {
        FeatureIndex::region(self, chrom, start, end, feature_type)
    }
}

/// Owns one store handle and answers point queries with transcript ids.
///
/// Each dispatch worker holds its own `QueryService`.
#[derive(Debug)]
pub struct QueryService<S> {
    store: S,
}

impl QueryService<FeatureIndex> {
    /// Open a saved feature index read-only.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FeatureIndex::load(db_path)?))
    }
}

impl<S: AnnotationStore> QueryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Transcript ids of exons covering `position` on `strand`.
    ///
    /// Store errors are swallowed: an unknown chromosome or invalid position
    /// yields no transcripts. Exons without a transcript id are skipped.
    pub fn query_overlap(&self, chrom: &str, position: u32, strand: Strand) -> Vec<String> {
        let exons = match self.store.region(chrom, position, position, EXON) {
            Ok(exons) => exons,
            Err(e) => {
                debug!("overlap query {chrom}:{position}{strand} failed: {e}");
                return Vec::new();
            }
        };

        exons
            .into_iter()
            .filter(|exon| exon.strand.matches(strand))
            .filter_map(|exon| exon.transcript_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FeatureKeys;
    use std::io::Cursor;

    fn service(gtf: &str) -> QueryService<FeatureIndex> {
        let idx = FeatureIndex::new(100)
            .from_reader(Cursor::new(gtf.as_bytes()), FeatureKeys::default())
            .unwrap();
        QueryService::new(idx)
    }

    const GTF: &str = "\
1\tsrc\texon\t900\t1100\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
1\tsrc\texon\t950\t1200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1b\";
1\tsrc\texon\t900\t1100\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T2\";
1\tsrc\texon\t900\t1100\t.\t.\t.\tgene_id \"G3\"; transcript_id \"T3\";
1\tsrc\texon\t900\t1100\t.\t+\t.\tgene_id \"G4\";
1\tsrc\ttranscript\t900\t1100\t.\t+\t.\tgene_id \"G1\"; transcript_id \"TX\";
";

    #[test]
    fn returns_strand_matching_exon_transcripts() {
        let svc = service(GTF);
        assert_eq!(svc.query_overlap("1", 1000, Strand::Plus), vec!["T1", "T1b"]);
        assert_eq!(svc.query_overlap("1", 1000, Strand::Minus), vec!["T2"]);
        assert_eq!(svc.query_overlap("1", 1150, Strand::Plus), vec!["T1b"]);
    }

    #[test]
    fn no_overlap_gives_nothing() {
        let svc = service(GTF);
        assert!(svc.query_overlap("1", 10, Strand::Plus).is_empty());
        assert!(svc.query_overlap("1", 1150, Strand::Minus).is_empty());
    }

    #[test]
    fn store_errors_are_recovered_as_empty() {
        let svc = service(GTF);
        assert!(svc.query_overlap("chrUn", 1000, Strand::Plus).is_empty());
        assert!(svc.query_overlap("1", 0, Strand::Plus).is_empty());
    }

    #[test]
    fn gtf_note_with_equals_keeps_transcript() {
        let svc = service("1\tsrc\texon\t900\t1100\t.\t+\t.\ttranscript_id \"T1\"; note \"ratio=0.5\";\n");
        assert_eq!(svc.query_overlap("1", 1000, Strand::Plus), vec!["T1"]);
    }

    struct FailingStore;

    impl AnnotationStore for FailingStore {
        fn region(&self, chrom: &str, _: u32, _: u32, _: &str) -> Result<Vec<&Feature>, QueryError> {
            Err(QueryError::UnknownChromosome(chrom.to_string()))
        }
    }

    #[test]
    fn any_store_failure_is_swallowed() {
        let svc = QueryService::new(FailingStore);
        assert!(svc.query_overlap("1", 1000, Strand::Plus).is_empty());
    }
}
