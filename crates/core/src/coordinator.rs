use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::ingest::{extract_batch, BatchExtraction};
use crate::models::{partition_batches, Batch, Document, PipelineOptions, ProgressCounters};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub counters: ProgressCounters,
    pub skipped: Vec<PathBuf>,
}

/// Runs batch extraction on a bounded worker pool and merges the results in
/// submission order.
pub struct BatchCoordinator {
    extractor: Arc<dyn PdfExtractor>,
    options: PipelineOptions,
}

impl BatchCoordinator {
    pub fn new(extractor: Arc<dyn PdfExtractor>, options: PipelineOptions) -> Self {
        Self { extractor, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Extracts every file in `files`.
    ///
    /// Every batch is submitted up front; at most `max_workers` run at once. A
    /// worker task that panics or is cancelled fails the whole run.
    pub async fn load(&self, files: &[PathBuf]) -> Result<LoadReport, IngestError> {
        self.options.validate()?;

        let total_files = files.len();
        let batches = partition_batches(files, self.options.batch_size)?;
        info!(
            total_files,
            batches = batches.len(),
            batch_size = self.options.batch_size,
            workers = self.options.max_workers,
            "dispatching extraction batches"
        );

        let pool = Arc::new(Semaphore::new(self.options.max_workers));
        let handles = batches
            .into_iter()
            .map(|batch| self.submit(batch, Arc::clone(&pool)))
            .collect::<Vec<_>>();

        let mut report = LoadReport {
            counters: ProgressCounters::new(total_files),
            ..LoadReport::default()
        };

        for handle in handles {
            let outcome = handle.await??;
            merge_batch(&mut report, outcome);
            info!(
                processed_files = report.counters.files_processed,
                total_files,
                "Processed {} / {} files",
                report.counters.files_processed,
                total_files
            );
        }

        info!(
            documents = report.counters.documents_loaded,
            "Total documents loaded: {}",
            report.counters.documents_loaded
        );
        Ok(report)
    }

    fn submit(
        &self,
        batch: Batch,
        pool: Arc<Semaphore>,
    ) -> JoinHandle<Result<BatchExtraction, IngestError>> {
        let extractor = Arc::clone(&self.extractor);
        let policy = self.options.bulk_filter;

        tokio::spawn(async move {
            let _permit = pool
                .acquire_owned()
                .await
                .map_err(|error| IngestError::Worker(format!("worker pool closed: {error}")))?;

            tokio::task::spawn_blocking(move || extract_batch(extractor.as_ref(), &batch, policy))
                .await?
        })
    }
}

fn merge_batch(report: &mut LoadReport, outcome: BatchExtraction) {
    let counters = &mut report.counters;
    counters.files_processed += outcome.files_loaded + outcome.skipped.len();
    counters.files_skipped += outcome.skipped.len();
    counters.documents_loaded += outcome.documents.len();
    counters.batches_completed += 1;

    report.documents.extend(outcome.documents);
    report.skipped.extend(outcome.skipped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::LopdfExtractor;
    use crate::ingest::discover_pdf_files;
    use crate::testing::{write_corrupt_pdf, write_pdf};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Yields `n` documents for a file named `<n>-*.pdf`, sleeping longer for earlier files.
    struct PageCountExtractor;

    impl PdfExtractor for PageCountExtractor {
        fn extract(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            let pages = name
                .split('-')
                .next()
                .and_then(|count| count.parse::<u32>().ok())
                .ok_or_else(|| IngestError::PdfParse(format!("bad fixture name {name}")))?;
            std::thread::sleep(Duration::from_millis(u64::from(10 * pages)));
            Ok((1..=pages)
                .map(|page| Document::new(format!("{name} page {page}"), path, page))
                .collect())
        }
    }

    struct PanickingExtractor;

    impl PdfExtractor for PanickingExtractor {
        fn extract(&self, _path: &Path) -> Result<Vec<Document>, IngestError> {
            panic!("extractor invariant violated");
        }
    }

    /// Records the highest number of extractions running at the same time.
    #[derive(Default)]
    struct ConcurrencyGauge {
        live: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PdfExtractor for ConcurrencyGauge {
        fn extract(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.live.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![Document::new("page", path, 1)])
        }
    }

    fn options(batch_size: usize, max_workers: usize) -> PipelineOptions {
        PipelineOptions {
            batch_size,
            max_workers,
            ..PipelineOptions::default()
        }
    }

    #[tokio::test]
    async fn three_pdfs_and_a_text_file_in_batches_of_two() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_pdf(dir.path(), "a.pdf", &["a1", "a2"]);
        write_pdf(dir.path(), "b.pdf", &["b1"]);
        write_pdf(dir.path(), "c.pdf", &["c1", "c2", "c3"]);
        std::fs::write(dir.path().join("d.txt"), "not a pdf")?;

        let files = discover_pdf_files(dir.path())?;
        assert_eq!(files.len(), 3);

        let coordinator = BatchCoordinator::new(Arc::new(LopdfExtractor::default()), options(2, 2));
        let report = coordinator.load(&files).await?;

        assert_eq!(report.counters.batches_completed, 2);
        assert_eq!(report.counters.files_found, 3);
        assert_eq!(report.counters.files_processed, 3);
        assert_eq!(report.counters.documents_loaded, 6);
        assert_eq!(report.documents.len(), 6);
        assert!(report
            .documents
            .iter()
            .all(|doc| doc.metadata.source.extension().is_some_and(|ext| ext == "pdf")));
        Ok(())
    }

    #[tokio::test]
    async fn results_follow_submission_order() -> Result<(), IngestError> {
        let files = ["3-a.pdf", "1-b.pdf", "2-c.pdf", "1-d.pdf", "2-e.pdf"]
            .iter()
            .map(|name| PathBuf::from("/fixtures").join(name))
            .collect::<Vec<_>>();

        let coordinator = BatchCoordinator::new(Arc::new(PageCountExtractor), options(1, 4));
        let report = coordinator.load(&files).await?;

        let sources = report
            .documents
            .iter()
            .map(|doc| doc.metadata.source.clone())
            .collect::<Vec<_>>();
        let mut expected = Vec::new();
        for (file, pages) in files.iter().zip([3, 1, 2, 1, 2]) {
            expected.extend(std::iter::repeat(file.clone()).take(pages));
        }
        assert_eq!(sources, expected);
        assert_eq!(report.counters.batches_completed, 5);
        Ok(())
    }

    #[tokio::test]
    async fn one_corrupt_file_leaves_the_others() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = write_pdf(dir.path(), "good.pdf", &["fine"]);
        write_corrupt_pdf(dir.path(), "bad.pdf");

        let files = discover_pdf_files(dir.path())?;
        let coordinator = BatchCoordinator::new(Arc::new(LopdfExtractor::default()), options(100, 1));
        let report = coordinator.load(&files).await?;

        assert_eq!(report.counters.files_processed, 2);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].metadata.source, good);
        Ok(())
    }

    #[tokio::test]
    async fn permissive_run_counts_skipped_files() -> Result<(), IngestError> {
        let files = vec![PathBuf::from("/fixtures/1-a.pdf"), PathBuf::from("/fixtures/notes.txt")];

        let coordinator = BatchCoordinator::new(Arc::new(PageCountExtractor), options(10, 1));
        let report = coordinator.load(&files).await?;

        assert_eq!(report.counters.files_processed, 2);
        assert_eq!(report.counters.files_skipped, 1);
        assert_eq!(report.skipped, vec![PathBuf::from("/fixtures/notes.txt")]);
        assert_eq!(report.documents.len(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn running_batches_never_exceed_max_workers() -> Result<(), IngestError> {
        let files = (0..12)
            .map(|index| PathBuf::from(format!("/fixtures/{index}.pdf")))
            .collect::<Vec<_>>();
        let gauge = Arc::new(ConcurrencyGauge::default());

        let extractor: Arc<dyn PdfExtractor> = Arc::clone(&gauge) as Arc<dyn PdfExtractor>;
        let coordinator = BatchCoordinator::new(extractor, options(1, 2));
        let report = coordinator.load(&files).await?;

        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak of {peak} concurrent extractions");
        assert_eq!(report.documents.len(), 12);
        assert_eq!(report.counters.batches_completed, 12);
        Ok(())
    }

    #[tokio::test]
    async fn panicking_worker_fails_the_run() {
        let files = vec![PathBuf::from("/fixtures/1-a.pdf")];
        let coordinator = BatchCoordinator::new(Arc::new(PanickingExtractor), options(1, 1));

        let result = coordinator.load(&files).await;
        assert!(matches!(result, Err(IngestError::Worker(_))));
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let coordinator = BatchCoordinator::new(Arc::new(PageCountExtractor), options(0, 1));
        let result = coordinator.load(&[]).await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }
}
