//! Per-partition orchestration.
//!
//! A run maps every input row onto transcripts in parallel, hands the
//! (transcript_id, genomic_position) pairs to the transform tool and joins
//! the tool's rows back onto the labels. Train and validation partitions
//! are separate runs sharing one feature index.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::annotation::AnnotationBuilder;
use crate::dispatch::{map_rows, DispatchStats, Dispatcher};
use crate::join::join;
use crate::mapper::GenomicRecord;
use crate::partition::partitions;
use crate::query::QueryService;
use crate::table::write_final_records;
use crate::transform::{write_pairs, TransformTool};

pub const TRANSFORM_INPUT: &str = "gppy_input.tsv";
pub const TRANSFORM_OUTPUT: &str = "gppy_output.tsv";
pub const LABELED_OUTPUT: &str = "gppy_output_labeled.tsv";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub annotation: PathBuf,
    pub db_path: PathBuf,
    pub workers: usize,
    pub builder: AnnotationBuilder,
    pub tool: TransformTool,
    /// Submit each distinct pair to the tool once instead of once per
    /// mapped record.
    pub dedup_pairs: bool,
    pub show_progress: bool,
}

impl PipelineConfig {
    /// Defaults: index at `gtf.db`, 4 workers, `gppy g2t` against the same
    /// annotation.
    pub fn new(annotation: impl Into<PathBuf>) -> Self {
        let annotation = annotation.into();
        Self {
            tool: TransformTool::gppy(annotation.clone()),
            annotation,
            db_path: PathBuf::from("gtf.db"),
            workers: 4,
            builder: AnnotationBuilder::new(100_000),
            dedup_pairs: false,
            show_progress: false,
        }
    }

    pub fn db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn builder(mut self, builder: AnnotationBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn tool(mut self, tool: TransformTool) -> Self {
        self.tool = tool;
        self
    }

    pub fn dedup_pairs(mut self, yes: bool) -> Self {
        self.dedup_pairs = yes;
        self
    }

    pub fn show_progress(mut self, yes: bool) -> Self {
        self.show_progress = yes;
        self
    }

    fn dispatcher(&self, rows: usize) -> Result<Dispatcher> {
        let d = Dispatcher::new(self.workers);
        if !self.show_progress {
            return Ok(d);
        }
        let pb = ProgressBar::new(rows as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("Mapping [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7}")?
                .progress_chars("##-"),
        );
        Ok(d.with_progress(pb))
    }
}

/// Files and counts produced by one partition run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutputs {
    pub transform_input: PathBuf,
    pub transform_output: PathBuf,
    pub labeled: PathBuf,
    pub stats: DispatchStats,
    pub mapped: usize,
    pub labeled_rows: usize,
}

/// Run the full mapping for `records`, writing into `out_dir`.
///
/// When no row maps to any transcript the tool is not started: both tool
/// files are left empty and the labeled table holds only its header.
pub fn map_genomic_to_transcript(
    records: Vec<GenomicRecord>,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<PartitionOutputs> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output folder {}", out_dir.display()))?;

    config.builder.ensure_index(&config.db_path, &config.annotation)?;

    let dispatcher = config.dispatcher(records.len())?;
    let db_path = config.db_path.as_path();
    let (mut mapped, stats) = map_rows(&dispatcher, records, || {
        QueryService::open(db_path).with_context(|| format!("opening feature index {}", db_path.display()))
    })?;
    dispatcher.progress().finish_and_clear();

    // stable: equal keys keep input-row order
    mapped.sort_by(|a, b| a.key().cmp(&b.key()));

    let mut pairs: Vec<(&str, u32)> = mapped.iter().map(|m| m.key()).collect();
    if config.dedup_pairs {
        pairs.dedup();
    }

    let transform_input = out_dir.join(TRANSFORM_INPUT);
    let transform_output = out_dir.join(TRANSFORM_OUTPUT);
    let labeled = out_dir.join(LABELED_OUTPUT);

    let transformed = if pairs.is_empty() {
        warn!(
            "No rows mapped onto a transcript; not running {} for {}",
            config.tool.program,
            out_dir.display()
        );
        write_pairs(&transform_input, pairs)?;
        std::fs::write(&transform_output, b"")
            .with_context(|| format!("writing {}", transform_output.display()))?;
        Vec::new()
    } else {
        config.tool.transform(pairs, &transform_input, &transform_output)?
    };

    let joined = join(&transformed, &mapped);
    write_final_records(&labeled, &joined)?;

    info!("Transform input written to {}", transform_input.display());
    info!(
        "Labeled output written to {} ({} rows)",
        labeled.display(),
        joined.len()
    );

    Ok(PartitionOutputs {
        transform_input,
        transform_output,
        labeled,
        stats,
        mapped: mapped.len(),
        labeled_rows: joined.len(),
    })
}

/// Outcome of one partition.
#[derive(Debug)]
pub struct PartitionRun {
    pub name: &'static str,
    pub out_dir: PathBuf,
    pub result: Result<PartitionOutputs>,
}

/// Split `records` by `val_chroms` and run every partition, even after an
/// earlier one failed.
pub fn run_partitions<S: AsRef<str>>(
    records: Vec<GenomicRecord>,
    val_chroms: &[S],
    config: &PipelineConfig,
    out: &Path,
) -> Vec<PartitionRun> {
    partitions(records, val_chroms)
        .into_iter()
        .map(|p| {
            let name = p.name();
            let out_dir = p.output_dir(out);
            info!("Partition {}: {} rows -> {}", name, p.records.len(), out_dir.display());
            let result = map_genomic_to_transcript(p.records, config, &out_dir);
            if let Err(e) = &result {
                error!("Partition {} failed: {:#}", name, e);
            }
            PartitionRun {
                name,
                out_dir,
                result,
            }
        })
        .collect()
}
