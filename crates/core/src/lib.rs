pub mod chunking;
pub mod config;
pub mod coordinator;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod indexing;
pub mod ingest;
pub mod isolate;
pub mod llm;
pub mod models;
pub mod responder;
pub mod traits;

#[cfg(test)]
mod testing;

pub use chunking::{RecursiveSplitter, SplitterConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{
    GenerationParams, ModelEndpoint, DEFAULT_CREDENTIALS_PROFILE, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_LLM_MODEL, DEFAULT_ROOT_DIRECTORY,
};
pub use coordinator::{BatchCoordinator, LoadReport};
pub use embeddings::{CharacterNgramEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, RetrievalError};
pub use extractor::{load_documents, LopdfExtractor, OcrEndpointConfig, PdfExtractor};
pub use index::{IndexCollection, ScoredChunk, VectorIndex, DEFAULT_TOP_K};
pub use indexing::IndexingPipeline;
pub use ingest::{
    discover_pdf_files, discover_pdf_files_flat, extract_batch, is_pdf_path, BatchExtraction,
    FilterPolicy,
};
pub use isolate::{isolate, isolate_async, Stage};
pub use llm::HttpLanguageModel;
pub use models::{
    partition_batches, Batch, Chunk, Document, DocumentMetadata, PipelineOptions,
    ProgressCounters, DEFAULT_BATCH_SIZE,
};
pub use responder::QueryResponder;
pub use traits::{Embedder, LanguageModel};
