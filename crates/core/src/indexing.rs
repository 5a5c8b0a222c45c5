use crate::chunking::RecursiveSplitter;
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::index::{IndexCollection, VectorIndex};
use crate::ingest::FilterPolicy;
use crate::isolate::{isolate_async, Stage};
use crate::models::Document;
use crate::traits::Embedder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Builds one vector index per source file.
pub struct IndexingPipeline {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    splitter: RecursiveSplitter,
    policy: FilterPolicy,
}

impl IndexingPipeline {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        splitter: RecursiveSplitter,
    ) -> Self {
        Self {
            extractor,
            embedder,
            splitter,
            policy: FilterPolicy::Strict,
        }
    }

    pub fn with_policy(mut self, policy: FilterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Indexes `files` in order.
    ///
    /// A file that fails to extract, chunk or embed is logged and left out. Under
    /// [`FilterPolicy::Strict`] the first non-PDF aborts the run.
    pub async fn index_files(&self, files: &[PathBuf]) -> Result<IndexCollection, IngestError> {
        let mut collection = IndexCollection::new();

        for path in files {
            if !self.policy.admit(path)? {
                continue;
            }

            info!(path = %path.display(), "Processing {}...", path.display());
            let built = isolate_async(Stage::Indexing, path.display(), None, async {
                self.index_file(path).await.map(Some)
            })
            .await;

            if let Some(index) = built {
                info!(path = %path.display(), chunks = index.len(), "Processed {}", path.display());
                collection.push(index);
            }
        }

        info!(
            indexes = collection.len(),
            "Total documents indexed: {}",
            collection.len()
        );
        Ok(collection)
    }

    /// Builds one index per source file from documents already loaded in bulk.
    ///
    /// Consecutive documents sharing a source form one set.
    pub async fn index_loaded(&self, documents: &[Document]) -> IndexCollection {
        let mut collection = IndexCollection::new();

        for group in group_by_source(documents) {
            let source = group[0].metadata.source.display().to_string();
            let built = isolate_async(Stage::Indexing, &source, None, async {
                self.index_documents(&source, group).await.map(Some)
            })
            .await;

            if let Some(index) = built {
                collection.push(index);
            }
        }

        collection
    }

    /// Chunks, embeds and indexes one document set.
    pub async fn index_documents(
        &self,
        source: &str,
        documents: &[Document],
    ) -> Result<VectorIndex, IngestError> {
        let chunks = self.splitter.split_documents(documents);
        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        Ok(VectorIndex::build(
            source,
            chunks,
            embeddings,
            self.splitter.config().clone(),
        )?)
    }

    async fn index_file(&self, path: &Path) -> Result<VectorIndex, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        let documents = tokio::task::spawn_blocking(move || extractor.extract(&owned)).await??;

        self.index_documents(&path.display().to_string(), &documents)
            .await
    }
}

fn group_by_source(documents: &[Document]) -> Vec<&[Document]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for end in 1..=documents.len() {
        if end == documents.len() || documents[end].metadata.source != documents[start].metadata.source {
            groups.push(&documents[start..end]);
            start = end;
        }
    }
    groups
}
