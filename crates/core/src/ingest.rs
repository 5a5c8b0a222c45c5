use crate::error::IngestError;
use crate::extractor::{load_documents, PdfExtractor};
use crate::models::{Batch, Document};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub const PDF_EXTENSION: &str = "pdf";

pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PDF_EXTENSION))
}

/// Recursively lists every regular `.pdf` file under `folder`, sorted.
///
/// Traversal errors are returned, not skipped.
pub fn discover_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder) {
        let entry = entry?;
        if entry.file_type().is_file() && is_pdf_path(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort_unstable();
    Ok(files)
}

/// Lists the `.pdf` files directly inside `folder`, sorted.
pub fn discover_pdf_files_flat(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_pdf_path(&path) {
            files.push(path);
        }
    }

    files.sort_unstable();
    Ok(files)
}

/// How a pipeline treats a path without the `.pdf` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPolicy {
    /// Log and skip. Used for best-effort bulk loading.
    #[default]
    Permissive,
    /// Abort the run on the first non-PDF. Used for curated indexing.
    Strict,
}

impl FilterPolicy {
    /// `Ok(true)` when `path` should be processed, `Ok(false)` when it is skipped.
    pub fn admit(self, path: &Path) -> Result<bool, IngestError> {
        if is_pdf_path(path) {
            return Ok(true);
        }

        match self {
            FilterPolicy::Permissive => {
                warn!(path = %path.display(), "File {} is not a PDF. Skipping this file.", path.display());
                Ok(false)
            }
            FilterPolicy::Strict => Err(IngestError::NotPdf(path.display().to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchExtraction {
    pub ordinal: usize,
    pub documents: Vec<Document>,
    /// Files admitted for extraction, whether or not they yielded documents.
    pub files_loaded: usize,
    pub skipped: Vec<PathBuf>,
}

/// Extracts every file of `batch` in order into one flat document list.
///
/// Per-file failures never stop the batch. Under [`FilterPolicy::Strict`] a
/// non-PDF path fails the batch.
pub fn extract_batch(
    extractor: &dyn PdfExtractor,
    batch: &Batch,
    policy: FilterPolicy,
) -> Result<BatchExtraction, IngestError> {
    let mut outcome = BatchExtraction {
        ordinal: batch.ordinal,
        ..BatchExtraction::default()
    };

    for path in &batch.files {
        if !policy.admit(path)? {
            outcome.skipped.push(path.clone());
            continue;
        }

        outcome.documents.extend(load_documents(extractor, path));
        outcome.files_loaded += 1;
    }

    Ok(outcome)
}
