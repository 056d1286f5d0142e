use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use gtf_tx_mapper::table::read_genomic_records_path;
use gtf_tx_mapper::{run_partitions, AnnotationBuilder, FeatureIndex, PipelineConfig, TransformTool};

/// Map labeled genomic positions to transcript coordinates.
#[derive(Parser, Debug)]
#[command(name = "tx-mapper")]
#[command(author, version, about)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Map an input table onto transcripts and run the transform tool
    Map(MapArgs),

    /// Build a feature index from a GTF/GFF annotation and write it to disk
    Index(IndexArgs),

    /// Load a feature index from disk and print summary stats
    Stats(StatsArgs),
}

#[derive(Args, Debug)]
struct IndexOptions {
    /// Bin width in base pairs
    #[arg(long, default_value_t = 100_000, value_parser = clap::value_parser!(u32).range(1..))]
    bin_width: u32,

    /// Attribute keys holding the transcript id (repeatable, first match wins)
    #[arg(
        long = "transcript-id-key",
        value_name = "KEY",
        num_args = 1..,
        default_values_t = vec!["transcript_id".to_string()]
    )]
    transcript_id_keys: Vec<String>,

    /// Feature types to index (repeatable). Default: all
    #[arg(long = "feature-type", value_name = "TYPE", num_args = 1..)]
    feature_types: Vec<String>,
}

impl IndexOptions {
    fn builder(&self) -> AnnotationBuilder {
        let ids: Vec<&str> = self.transcript_id_keys.iter().map(String::as_str).collect();
        let types: Vec<&str> = self.feature_types.iter().map(String::as_str).collect();
        AnnotationBuilder::new(self.bin_width)
            .transcript_id_keys(&ids)
            .feature_types(&types)
    }
}

#[derive(Args, Debug)]
struct MapArgs {
    /// Input CSV with columns chrom,pos,strand,label (or group)
    #[arg(long)]
    input_csv: PathBuf,

    /// Annotation used for the index and passed to the transform tool
    #[arg(long)]
    gtf_path: PathBuf,

    /// Base output directory
    #[arg(long)]
    output_folder: PathBuf,

    /// Feature index path; built from --gtf-path when missing
    #[arg(long, default_value = "gtf.db")]
    db_path: PathBuf,

    /// Number of parallel workers
    #[arg(long, default_value_t = 4)]
    max_workers: usize,

    /// Chromosomes reserved for validation; rows are then split into
    /// <output>/train and <output>/val
    #[arg(long, value_name = "CHROM", num_args = 0..)]
    val_chroms: Vec<String>,

    /// Transform tool executable
    #[arg(long, default_value = "gppy")]
    transform_program: String,

    /// Leading transform tool arguments (repeatable)
    #[arg(
        long = "transform-arg",
        value_name = "ARG",
        default_values_t = vec!["g2t".to_string()],
        allow_hyphen_values = true
    )]
    transform_args: Vec<String>,

    /// Submit each distinct (transcript, position) pair to the tool once
    #[arg(long)]
    dedup_pairs: bool,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,

    #[command(flatten)]
    index: IndexOptions,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Input annotation file (.gtf/.gff/.gff3, optionally .gz)
    #[arg(long, short)]
    annotation: PathBuf,

    /// Output serialized index file
    #[arg(long, short)]
    index: PathBuf,

    #[command(flatten)]
    options: IndexOptions,
}

#[derive(Args, Debug)]
struct StatsArgs {
    /// Serialized index file
    #[arg(long, short)]
    index: PathBuf,
}

fn run_map(args: MapArgs) -> Result<bool> {
    let records = read_genomic_records_path(&args.input_csv)?;
    info!("Loaded {} rows from {}", records.len(), args.input_csv.display());

    let tool = TransformTool::new(args.transform_program, &args.gtf_path).with_args(args.transform_args.as_slice());
    let config = PipelineConfig::new(&args.gtf_path)
        .db_path(args.db_path)
        .workers(args.max_workers)
        .builder(args.index.builder())
        .tool(tool)
        .dedup_pairs(args.dedup_pairs)
        .show_progress(!args.no_progress);

    let runs = run_partitions(records, args.val_chroms.as_slice(), &config, &args.output_folder);

    let mut ok = true;
    for run in &runs {
        match &run.result {
            Ok(out) => eprintln!(
                "{}: {} labeled rows written to {}",
                run.name,
                out.labeled_rows,
                out.labeled.display()
            ),
            Err(e) => {
                ok = false;
                eprintln!("{}: failed: {:#}", run.name, e);
            }
        }
    }
    Ok(ok)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.cmd {
        Command::Map(args) => {
            if !run_map(args)? {
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Index(args) => {
            let idx = args
                .options
                .builder()
                .build_from_path(&args.annotation)
                .with_context(|| format!("building index from {}", args.annotation.display()))?;

            println!("{idx}");

            idx.save(&args.index)
                .with_context(|| format!("writing index to {}", args.index.display()))?;

            eprintln!("Index written to {}", args.index.display());
        }

        Command::Stats(args) => {
            let idx = FeatureIndex::load(&args.index)
                .with_context(|| format!("reading index {}", args.index.display()))?;
            println!("{idx}");
        }
    }

    Ok(ExitCode::SUCCESS)
}
