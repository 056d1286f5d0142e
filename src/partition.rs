use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::mapper::GenomicRecord;

/// A named subset of input rows processed as one independent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Sub-directory of the output folder; `None` writes directly into it.
    pub subdir: Option<&'static str>,
    pub records: Vec<GenomicRecord>,
}

impl Partition {
    pub fn name(&self) -> &'static str {
        self.subdir.unwrap_or("all")
    }

    pub fn output_dir(&self, base: &Path) -> PathBuf {
        match self.subdir {
            Some(sub) => base.join(sub),
            None => base.to_path_buf(),
        }
    }
}

/// Split rows into (train, val): rows on a chromosome listed in
/// `val_chroms` go to val, the rest to train. Input order is kept.
pub fn split_by_chromosome<S: AsRef<str>>(
    records: Vec<GenomicRecord>,
    val_chroms: &[S],
) -> (Vec<GenomicRecord>, Vec<GenomicRecord>) {
    let val: HashSet<&str> = val_chroms.iter().map(AsRef::as_ref).collect();
    records
        .into_iter()
        .partition(|r| !val.contains(r.chrom.as_str()))
}

/// With no validation chromosomes every row lands in one partition written
/// to the output folder itself; otherwise `train` then `val`.
pub fn partitions<S: AsRef<str>>(records: Vec<GenomicRecord>, val_chroms: &[S]) -> Vec<Partition> {
    if val_chroms.is_empty() {
        return vec![Partition { subdir: None, records }];
    }

    let (train, val) = split_by_chromosome(records, val_chroms);
    vec![
        Partition { subdir: Some("train"), records: train },
        Partition { subdir: Some("val"), records: val },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strand;

    fn rows() -> Vec<GenomicRecord> {
        vec![
            GenomicRecord::new("1", 10, Strand::Plus, "a"),
            GenomicRecord::new("2", 20, Strand::Minus, "b"),
            GenomicRecord::new("1", 30, Strand::Minus, "c"),
            GenomicRecord::new("X", 40, Strand::Plus, "d"),
        ]
    }

    #[test]
    fn validation_chromosomes_are_held_out() {
        let (train, val) = split_by_chromosome(rows(), &["1"]);
        assert!(val.iter().all(|r| r.chrom == "1"));
        assert!(train.iter().all(|r| r.chrom != "1"));
        assert_eq!(val.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(train.iter().map(|r| r.label.as_str()).collect::<Vec<_>>(), ["b", "d"]);
    }

    #[test]
    fn no_row_lost_or_duplicated() {
        let (train, val) = split_by_chromosome(rows(), &["1".to_string(), "X".to_string()]);
        let mut all: Vec<_> = train.into_iter().chain(val).collect();
        all.sort_by_key(|r| r.position);
        assert_eq!(all, rows());
    }

    #[test]
    fn partition_layout() {
        let none: [&str; 0] = [];
        let single = partitions(rows(), &none);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].name(), "all");
        assert_eq!(single[0].output_dir(Path::new("out")), PathBuf::from("out"));
        assert_eq!(single[0].records.len(), 4);

        let split = partitions(rows(), &["2"]);
        assert_eq!(split[0].output_dir(Path::new("out")), PathBuf::from("out/train"));
        assert_eq!(split[1].name(), "val");
        assert_eq!(split[1].records.len(), 1);
    }

    #[test]
    fn unknown_validation_chromosome_yields_empty_val() {
        let (train, val) = split_by_chromosome(rows(), &["chr1"]);
        assert_eq!(train.len(), 4);
        assert!(val.is_empty());
    }
}
