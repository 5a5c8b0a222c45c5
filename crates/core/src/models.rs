use crate::error::IngestError;
use crate::ingest::FilterPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: PathBuf,
    /// 1-based page number within `source`.
    pub page: u32,
}

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<PathBuf>, page: u32) -> Self {
        Self {
            text: text.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                page,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: PathBuf,
    pub page: u32,
    /// Position of the chunk within its index.
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Submission order of the batch within a run.
    pub ordinal: usize,
    pub files: Vec<PathBuf>,
}

/// Splits `files` into consecutive batches of `batch_size`; the last batch may be shorter.
pub fn partition_batches(files: &[PathBuf], batch_size: usize) -> Result<Vec<Batch>, IngestError> {
    if batch_size == 0 {
        return Err(IngestError::InvalidArgument(
            "batch size must be greater than zero".to_string(),
        ));
    }

    Ok(files
        .chunks(batch_size)
        .enumerate()
        .map(|(ordinal, files)| Batch {
            ordinal,
            files: files.to_vec(),
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounters {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub documents_loaded: usize,
    pub batches_completed: usize,
}

impl ProgressCounters {
    pub fn new(files_found: usize) -> Self {
        Self {
            files_found,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub max_workers: usize,
    /// Applied to each file of a batch.
    pub bulk_filter: FilterPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(4),
            bulk_filter: FilterPolicy::Permissive,
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(IngestError::InvalidArgument(
                "worker count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
