use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::annotation::io::ParseError;
use crate::index::{FeatureIndex, FeatureKeys};

/// High-level builder for creating or opening a `FeatureIndex`.
///
/// - parses a whole GTF/GFF3 file (optionally gzipped)
/// - configurable transcript-id attribute keys and indexed feature types
/// - persists the index next to the run so later runs only open it
#[derive(Debug, Clone)]
pub struct AnnotationBuilder {
    pub bin_width: u32,
    pub keys: FeatureKeys,
}

impl AnnotationBuilder {
    /// Defaults index every feature type and read `transcript_id`.
    pub fn new(bin_width: u32) -> Self {
        Self {
            bin_width,
            keys: FeatureKeys::default(),
        }
    }

    /// Attribute key(s) holding the owning transcript id, in preference order.
    pub fn transcript_id_keys(mut self, keys: &[&str]) -> Self {
        self.keys.transcript_id_keys = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Restrict which feature types are indexed. Empty means all.
    pub fn feature_types(mut self, types: &[&str]) -> Self {
        self.keys.feature_types = types.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Build index from anything implementing `BufRead`.
    pub fn build_from_reader<R: BufRead>(&self, reader: R) -> Result<FeatureIndex, ParseError> {
        FeatureIndex::new(self.bin_width).from_reader(reader, self.keys.clone())
    }

    /// Build index from a file path; `.gz` paths are decompressed on the fly.
    pub fn build_from_path<P: AsRef<Path>>(&self, path: P) -> Result<FeatureIndex> {
        FeatureIndex::from_path(path, self.bin_width, self.keys.clone())
    }

    /// Make sure an index built with this builder's keys exists at
    /// `db_path`. The index is then opened separately by every worker.
    pub fn ensure_index<P: AsRef<Path>, Q: AsRef<Path>>(&self, db_path: P, annotation: Q) -> Result<()> {
        self.open_or_build(db_path, annotation).map(drop)
    }

    /// Open the index at `db_path`, or build it from `annotation` and save
    /// it there when the file is missing or was built with other keys.
    pub fn open_or_build<P: AsRef<Path>, Q: AsRef<Path>>(&self, db_path: P, annotation: Q) -> Result<FeatureIndex> {
        let db_path = db_path.as_ref();
        if !db_path.exists() {
            return self.build_and_save(db_path, annotation);
        }

        let idx = FeatureIndex::load(db_path)
            .with_context(|| format!("reading feature index {}", db_path.display()))?;
        if idx.keys != self.keys || idx.bin_width != self.bin_width {
            warn!(
                "Feature index {} was built with {:?} (bin width {}); rebuilding with {:?} (bin width {})",
                db_path.display(),
                idx.keys,
                idx.bin_width,
                self.keys,
                self.bin_width
            );
            return self.build_and_save(db_path, annotation);
        }

        info!("Using existing feature index {}", db_path.display());
        Ok(idx)
    }

    fn build_and_save(&self, db_path: &Path, annotation: impl AsRef<Path>) -> Result<FeatureIndex> {
        let annotation = annotation.as_ref();
        info!(
            "Building feature index {} from {}",
            db_path.display(),
            annotation.display()
        );
        let idx = self
            .build_from_path(annotation)
            .with_context(|| format!("building index from {}", annotation.display()))?;
        idx.save(db_path)
            .with_context(|| format!("writing index to {}", db_path.display()))?;
        Ok(idx)
    }
}

// -------------------- tests --------------------
