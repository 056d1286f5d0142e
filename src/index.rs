use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::BufRead;

use crate::annotation::io::{AnnotationReader, AnnotationRecord, ParseError};
use crate::error::QueryError;
use crate::types::{RefBlock, Strand};

// to serialize the data
use serde::{Serialize, Deserialize};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::fs::File;
use std::io::{Read, BufReader, BufWriter, Write};
use flate2::read::GzDecoder;


const MAGIC: &[u8; 4] = b"GTX1";
const VERSION_STR: &str = env!("CARGO_PKG_VERSION");

pub type FeatureId = usize;

/// Configure which annotation lines are indexed and where the owning
/// transcript identifier is read from.
///
/// Notes:
/// - Multiple transcript keys are allowed; first present wins.
/// - An empty `feature_types` list indexes every feature type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureKeys {
    pub transcript_id_keys: Vec<String>,
    pub feature_types: Vec<String>,
}

impl Default for FeatureKeys {
    fn default() -> Self {
        Self {
            transcript_id_keys: vec!["transcript_id".into()],
            feature_types: Vec::new(),
        }
    }
}

impl FeatureKeys {
    fn indexes(&self, feature_type: &str) -> bool {
        self.feature_types.is_empty() || self.feature_types.iter().any(|t| t == feature_type)
    }
}

/// One indexed annotation feature. Read-only once the index is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub chr_id: usize,
    pub type_id: usize,
    pub span: RefBlock,
    pub strand: Strand,
    /// `None` when the annotation line carries none of the transcript keys.
    pub transcript_id: Option<String>,
}

/// Per-chromosome bucket index: bin -> feature ids.
///
/// This is a pre-filter only: candidates still need an exact overlap check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChrBuckets {
    pub bin_width: u32,
    pub bins: Vec<Vec<FeatureId>>,
    pub max_end: u32,
}

impl ChrBuckets {
    pub fn new(bin_width: u32) -> Self {
        Self {
            bin_width,
            bins: Vec::new(),
            max_end: 0,
        }
    }

    fn ensure_len_for_end(&mut self, end0: u32) {
        self.max_end = self.max_end.max(end0);

        let need_bins =
            ((self.max_end as u64 + self.bin_width as u64 - 1) / self.bin_width as u64) as usize;
        if self.bins.len() < need_bins {
            self.bins.resize_with(need_bins, Vec::new);
        }
    }

    fn add_span(&mut self, id: FeatureId, span: RefBlock) {
        if span.is_empty() {
            return;
        }

        self.ensure_len_for_end(span.end);

        let (b0, b1) = self.bin_range(span);
        for b in b0..=b1 {
            self.bins[b].push(id);
        }
    }

    fn bin_range(&self, span: RefBlock) -> (usize, usize) {
        let b0 = (span.start / self.bin_width) as usize;
        let b1 = (span.end.saturating_sub(1) / self.bin_width) as usize;
        (b0, b1)
    }

    /// Deduped candidate ids for `span`, ascending.
    fn candidates(&self, span: RefBlock) -> Vec<FeatureId> {
        if self.bins.is_empty() || span.is_empty() {
            return Vec::new();
        }
        let (b0, b1) = self.bin_range(span);
        if b0 >= self.bins.len() {
            return Vec::new();
        }
        let b1 = b1.min(self.bins.len() - 1);

        let mut out: Vec<FeatureId> = Vec::new();
        for b in b0..=b1 {
            out.extend_from_slice(&self.bins[b]);
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    fn finalize(&mut self) {
        for bin in &mut self.bins {
            bin.sort_unstable();
            bin.dedup();
        }
    }
}

/// The annotation feature database:
/// - chromosome dictionary (chr name -> chr_id)
/// - feature type dictionary
/// - features in file order
/// - per-chromosome buckets for fast candidate lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureIndex {
    pub bin_width: u32,
    pub keys: FeatureKeys,

    pub chr_names: Vec<String>,
    chr_to_id: HashMap<String, usize>,

    pub feature_types: Vec<String>,
    type_to_id: HashMap<String, usize>,

    pub features: Vec<Feature>,
    pub chr_buckets: Vec<ChrBuckets>,
}


/// Human-readable summary of the `FeatureIndex`: global counts followed by
/// one line per chromosome (bins, features, exons, distinct transcripts and
/// mean features per bin, empty bins included).
impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n_with_tx = self.features.iter().filter(|ft| ft.transcript_id.is_some()).count();

        writeln!(
            f,
            "FeatureIndex: {} features ({} with transcript id), {} feature types, {} chromosomes, bin_width={} bp",
            self.features.len(),
            n_with_tx,
            self.feature_types.len(),
            self.chr_names.len(),
            self.bin_width
        )?;

        let exon_type = self.type_to_id.get("exon").copied();

        for (i, chr_name) in self.chr_names.iter().enumerate() {
            let Some(chr) = self.chr_buckets.get(i) else {
                writeln!(f, "  - {}: <missing ChrBuckets>", chr_name)?;
                continue;
            };

            let nbins = chr.bins.len();
            let total_hits: u64 = chr.bins.iter().map(|b| b.len() as u64).sum();
            let mean_per_bin = if nbins == 0 {
                0.0
            } else {
                total_hits as f64 / nbins as f64
            };

            let on_chr = self.features.iter().filter(|ft| ft.chr_id == i);
            let mut n_features = 0usize;
            let mut n_exons = 0usize;
            let mut uniq_txs: HashSet<&str> = HashSet::new();
            for ft in on_chr {
                n_features += 1;
                if Some(ft.type_id) == exon_type {
                    n_exons += 1;
                }
                if let Some(tx) = ft.transcript_id.as_deref() {
                    uniq_txs.insert(tx);
                }
            }

            writeln!(
                f,
                "  - {}: bins={}, features={}, exons={}, transcripts={}, mean_features/bin={:.3}",
                chr_name,
                nbins,
                n_features,
                n_exons,
                uniq_txs.len(),
                mean_per_bin
            )?;
        }

        Ok(())
    }
}



impl FeatureIndex {
    pub fn new(bin_width: u32) -> Self {
        assert!(bin_width > 0, "FeatureIndex requires bin_width > 0");
        Self {
            bin_width,
            keys: FeatureKeys::default(),
            chr_names: Vec::new(),
            chr_to_id: HashMap::new(),
            feature_types: Vec::new(),
            type_to_id: HashMap::new(),
            features: Vec::new(),
            chr_buckets: Vec::new(),
        }
    }

    /// Build a `FeatureIndex` from a GTF/GFF path (plain or `.gz`).
    ///
    /// Chromosome order is first-seen order in the file.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        bin_width: u32,
        keys: FeatureKeys,
    ) -> Result<Self> {
        let path = path.as_ref();

        let is_gz = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let f = File::open(path)
            .with_context(|| format!("open annotation file {}", path.display()))?;
        let reader: Box<dyn BufRead> = if is_gz {
            Box::new(BufReader::new(GzDecoder::new(f)))
        } else {
            Box::new(BufReader::new(f))
        };

        FeatureIndex::new(bin_width)
            .from_reader(reader, keys)
            .with_context(|| format!("build feature index from {}", path.display()))
    }

    /// Build an index directly from a GTF/GFF3 reader.
    ///
    /// # Example (minimal GTF via `BufRead`)
    /// ```
    /// use std::io::Cursor;
    /// use gtf_tx_mapper::index::{FeatureIndex, FeatureKeys};
    ///
    /// let gtf = "\
    /// chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n\
    /// chr1\tsrc\texon\t201\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n";
    ///
    /// let idx = FeatureIndex::new(100)
    ///     .from_reader(Cursor::new(gtf.as_bytes()), FeatureKeys::default())
    ///     .unwrap();
    ///
    /// assert_eq!(idx.features.len(), 2);
    /// assert_eq!(idx.chr_names, vec!["chr1".to_string()]);
    /// ```
    pub fn from_reader<R: BufRead>(
        mut self,
        reader: R,
        keys: FeatureKeys,
    ) -> Result<Self, ParseError> {
        for rec in AnnotationReader::new(reader).records() {
            let rec = rec?;
            if !keys.indexes(&rec.feature_type) {
                continue;
            }
            self.push_feature(&rec, &keys);
        }

        self.keys = keys;
        self.build_buckets();

        Ok(self)
    }

    /// Features of `feature_type` on `chrom` overlapping the closed 1-based
    /// region `[start, end]`, in index (file) order.
    ///
    /// An unknown feature type is not an error; it simply matches nothing.
    pub fn region(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        feature_type: &str,
    ) -> Result<Vec<&Feature>, QueryError> {
        let &chr_id = self
            .chr_to_id
            .get(chrom)
            .ok_or_else(|| QueryError::UnknownChromosome(chrom.to_string()))?;

        let query = RefBlock::from_one_based(start, end).ok_or_else(|| QueryError::InvalidRegion {
            chrom: chrom.to_string(),
            start,
            end,
        })?;

        let Some(&type_id) = self.type_to_id.get(feature_type) else {
            return Ok(Vec::new());
        };

        let hits = self.chr_buckets[chr_id]
            .candidates(query)
            .into_iter()
            .map(|id| &self.features[id])
            .filter(|ft| ft.type_id == type_id && ft.span.overlaps(query))
            .collect();

        Ok(hits)
    }

    pub fn chr_id(&self, chrom: &str) -> Option<usize> {
        self.chr_to_id.get(chrom).copied()
    }

    // -----------------------
    // Internal helpers
    // -----------------------

    fn push_feature(&mut self, rec: &AnnotationRecord, keys: &FeatureKeys) {
        let chr_id = self.intern_chr(&rec.seqname);
        let type_id = self.intern_type(&rec.feature_type);
        self.features.push(Feature {
            chr_id,
            type_id,
            span: rec.span,
            strand: rec.strand,
            transcript_id: rec.pick_first_attr(&keys.transcript_id_keys),
        });
    }

    fn intern_chr(&mut self, chr: &str) -> usize {
        if let Some(&id) = self.chr_to_id.get(chr) {
            return id;
        }
        let id = self.chr_names.len();
        self.chr_names.push(chr.to_string());
        self.chr_to_id.insert(chr.to_string(), id);
        self.chr_buckets.push(ChrBuckets::new(self.bin_width));
        id
    }

    fn intern_type(&mut self, feature_type: &str) -> usize {
        if let Some(&id) = self.type_to_id.get(feature_type) {
            return id;
        }
        let id = self.feature_types.len();
        self.feature_types.push(feature_type.to_string());
        self.type_to_id.insert(feature_type.to_string(), id);
        id
    }

    fn build_buckets(&mut self) {
        for (id, ft) in self.features.iter().enumerate() {
            self.chr_buckets[ft.chr_id].add_span(id, ft.span);
        }
        for cb in &mut self.chr_buckets {
            cb.finalize();
        }
    }

    /// Write the index as `GTX1`, a length-prefixed crate version and a
    /// bincode payload.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("create index file {}", path.display()))?;
        let mut w = BufWriter::new(file);

        write_header(&mut w)?;
        bincode::serialize_into(&mut w, self)
            .with_context(|| format!("encode feature index into {}", path.display()))?;
        w.flush()?;
        Ok(())
    }

    /// Read an index written by [`FeatureIndex::save`] by the same crate
    /// version.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("open index file {}", path.display()))?;
        let mut r = BufReader::new(file);

        match read_header(&mut r)? {
            Header::Foreign => bail!("{} is not a FeatureIndex file (bad magic)", path.display()),
            Header::Version(v) if v != VERSION_STR => bail!(
                "index {} was written by version {}, this is {} (delete it to rebuild)",
                path.display(),
                v,
                VERSION_STR
            ),
            Header::Version(_) => {}
        }

        bincode::deserialize_from(&mut r)
            .with_context(|| format!("decode feature index {}", path.display()))
    }
}

enum Header {
    Foreign,
    Version(String),
}

fn write_header<W: Write>(w: &mut W) -> std::io::Result<()> {
    let v = VERSION_STR.as_bytes();
    w.write_all(MAGIC)?;
    w.write_all(&(v.len() as u16).to_le_bytes())?;
    w.write_all(v)
}

fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut magic = [0u8; 4];
    if r.read_exact(&mut magic).is_err() || &magic != MAGIC {
        return Ok(Header::Foreign);
    }

    let mut len = [0u8; 2];
    r.read_exact(&mut len)?;
    let mut version = vec![0u8; u16::from_le_bytes(len) as usize];
    r.read_exact(&mut version)?;
    Ok(Header::Version(String::from_utf8(version)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GTF: &str = "\
1\tsrc\tgene\t800\t2000\t.\t+\t.\tgene_id \"G1\";
1\tsrc\ttranscript\t900\t2000\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
1\tsrc\texon\t900\t1100\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
1\tsrc\texon\t1500\t2000\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
1\tsrc\texon\t950\t1050\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T2\";
2\tsrc\texon\t10\t20\t.\t+\t.\tgene_id \"G3\";
";

    fn build(bin_width: u32) -> FeatureIndex {
        FeatureIndex::new(bin_width)
            .from_reader(Cursor::new(GTF.as_bytes()), FeatureKeys::default())
            .unwrap()
    }

    #[test]
    fn builds_index_from_minimal_gtf() {
        let idx = build(100);
        assert_eq!(idx.chr_names, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(idx.features.len(), 6);
        assert_eq!(idx.feature_types, vec!["gene", "transcript", "exon"]);
        assert_eq!(idx.chr_buckets.len(), 2);
        assert_eq!(idx.features[5].transcript_id, None);
        assert_eq!(idx.features[2].transcript_id.as_deref(), Some("T1"));
    }

    #[test]
    fn region_returns_only_overlapping_features_of_type() {
        // small bins so the exon spans several buckets
        let idx = build(64);
        let hits = idx.region("1", 1000, 1000, "exon").unwrap();
        let txs: Vec<_> = hits.iter().map(|f| f.transcript_id.as_deref()).collect();
        assert_eq!(txs, vec![Some("T1"), Some("T2")]);

        assert!(idx.region("1", 1200, 1200, "exon").unwrap().is_empty());
        assert_eq!(idx.region("1", 1200, 1200, "gene").unwrap().len(), 1);
        assert_eq!(idx.region("1", 1100, 1500, "exon").unwrap().len(), 2);
        assert!(idx.region("1", 1000, 1000, "CDS").unwrap().is_empty());
    }

    #[test]
    fn region_edges_are_closed() {
        let idx = build(100);
        assert_eq!(idx.region("1", 900, 900, "exon").unwrap().len(), 1);
        assert_eq!(idx.region("1", 1100, 1100, "exon").unwrap().len(), 1);
        assert!(idx.region("1", 899, 899, "exon").unwrap().is_empty());
        assert!(idx.region("1", 5000, 5000, "exon").unwrap().is_empty());
    }

    #[test]
    fn region_errors_on_unknown_chromosome_and_bad_region() {
        let idx = build(100);
        assert_eq!(
            idx.region("chr1", 1000, 1000, "exon").unwrap_err(),
            QueryError::UnknownChromosome("chr1".into())
        );
        assert!(matches!(
            idx.region("1", 0, 0, "exon"),
            Err(QueryError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn feature_type_filter_limits_what_is_indexed() {
        let keys = FeatureKeys {
            feature_types: vec!["exon".into()],
            ..FeatureKeys::default()
        };
        let idx = FeatureIndex::new(100)
            .from_reader(Cursor::new(GTF.as_bytes()), keys)
            .unwrap();
        assert_eq!(idx.features.len(), 4);
        assert_eq!(idx.feature_types, vec!["exon"]);
    }

    #[test]
    fn save_and_load_preserve_queries() {
        let idx = build(100);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gtf.db");
        idx.save(&path).unwrap();

        let loaded = FeatureIndex::load(&path).unwrap();
        assert_eq!(loaded.features, idx.features);
        assert_eq!(loaded.keys, idx.keys);
        assert_eq!(loaded.region("1", 1000, 1000, "exon").unwrap().len(), 2);
    }

    #[test]
    fn load_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_index");
        std::fs::write(&path, b"SQLite format 3\0").unwrap();
        let err = FeatureIndex::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn display_summarizes_chromosomes() {
        let s = build(100).to_string();
        assert!(s.starts_with("FeatureIndex: 6 features (4 with transcript id)"));
        assert!(s.contains("  - 1: bins=20, features=5, exons=3, transcripts=2"));
    }
}
