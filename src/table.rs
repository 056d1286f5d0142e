//! Input and output tables.
//!
//! The input is a CSV with a header naming at least the chromosome,
//! position, strand and a label column. Outputs are tab-separated.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::TableError;
use crate::join::FinalRecord;
use crate::mapper::GenomicRecord;

/// Header of the labeled output table.
pub const FINAL_HEADER: [&str; 5] = [
    "transcript_id",
    "genomic_position",
    "transcript_position",
    "feature_type",
    "label",
];

struct Columns {
    chrom: usize,
    pos: usize,
    strand: usize,
    label: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, TableError> {
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        };

        Ok(Self {
            chrom: find(&["chrom", "chromosome"]).ok_or(TableError::MissingColumn("chrom"))?,
            pos: find(&["pos", "position"]).ok_or(TableError::MissingColumn("pos"))?,
            strand: find(&["strand"]).ok_or(TableError::MissingColumn("strand"))?,
            // label wins over group when both exist
            label: find(&["label", "group"]).ok_or(TableError::MissingLabel)?,
        })
    }
}

/// Read labeled genomic positions from CSV. Row numbers in errors are
/// 1-based data rows (the header is row 0).
pub fn read_genomic_records<R: Read>(reader: R) -> Result<Vec<GenomicRecord>, TableError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let cols = Columns::locate(rdr.headers()?)?;

    let mut out = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        let row_no = i + 1;
        let field = |idx: usize, name: &str| {
            row.get(idx).map(str::trim).ok_or_else(|| TableError::BadRow {
                row: row_no,
                problem: format!("missing {name} field"),
            })
        };

        let pos_s = field(cols.pos, "pos")?;
        let position = pos_s.parse::<u32>().map_err(|_| TableError::BadRow {
            row: row_no,
            problem: format!("invalid position '{pos_s}'"),
        })?;
        let strand = field(cols.strand, "strand")?
            .parse()
            .map_err(|problem| TableError::BadRow { row: row_no, problem })?;

        out.push(GenomicRecord {
            chrom: field(cols.chrom, "chrom")?.to_string(),
            position,
            strand,
            label: field(cols.label, "label")?.to_string(),
        });
    }
    Ok(out)
}

pub fn read_genomic_records_path(path: &Path) -> Result<Vec<GenomicRecord>> {
    let f = File::open(path).with_context(|| format!("open input table {}", path.display()))?;
    read_genomic_records(f).with_context(|| format!("read input table {}", path.display()))
}

/// Write the labeled table with a header, even when there are no rows.
/// Absent labels become empty fields.
pub fn write_final_records(path: &Path, records: &[FinalRecord]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(BufWriter::new(f));

    wtr.write_record(FINAL_HEADER)?;
    for rec in records {
        wtr.serialize(rec)?;
    }
    wtr.flush()
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
