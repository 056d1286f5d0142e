//! Typed errors for the library's failure domains.
//!
//! Orchestration code wraps these in `anyhow` with context; the annotation
//! line parser has its own [`crate::annotation::ParseError`].

use std::path::PathBuf;

use thiserror::Error;

/// A single region query against the feature index failed.
///
/// The query service recovers from every variant by returning no
/// transcripts for the row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("chromosome '{0}' is not present in the annotation")]
    UnknownChromosome(String),

    #[error("invalid 1-based region {chrom}:{start}-{end}")]
    InvalidRegion { chrom: String, start: u32, end: u32 },
}

/// Failures of the external coordinate-transform step. All are fatal for
/// the partition being processed.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to write transform input {path}: {source}")]
    WriteInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch transform tool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transform tool '{program}' exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to write transform output {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed transform output at line {line_no}: {problem}: {line:?}")]
    MalformedRow {
        line_no: usize,
        problem: String,
        line: String,
    },
}

/// Problems reading the labeled input table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("input table is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("input table needs a 'label' or 'group' column")]
    MissingLabel,

    #[error("row {row}: {problem}")]
    BadRow { row: usize, problem: String },
}
