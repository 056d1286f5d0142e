//! gtf_tx_mapper
//!
//! Maps labeled genomic positions onto the transcripts whose exons cover
//! them, sends the (transcript, position) pairs through an external
//! genome-to-transcript coordinate tool and re-attaches the labels to the
//! tool's output. Annotation is read from GTF/GFF3 into a binned feature
//! index (0-based, half-open spans) that every worker opens on its own.

pub mod types;
pub mod error;
pub mod annotation;
pub mod index;
pub mod query;
pub mod mapper;
pub mod dispatch;
pub mod transform;
pub mod join;
pub mod table;
pub mod partition;
pub mod pipeline;

pub use index::{Feature, FeatureIndex, FeatureKeys};

pub use annotation::AnnotationBuilder;

pub use types::{RefBlock, Strand};

pub use error::{QueryError, TableError, TransformError};
pub use query::{AnnotationStore, QueryService};
pub use mapper::{map_row, GenomicRecord, MappedRecord};
pub use dispatch::{map_rows, DispatchStats, Dispatcher};
pub use transform::{TransformTool, TransformedRecord};
pub use join::{join, FinalRecord};
pub use partition::{partitions, split_by_chromosome, Partition};
pub use pipeline::{map_genomic_to_transcript, run_partitions, PartitionOutputs, PipelineConfig};
