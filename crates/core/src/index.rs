use crate::chunking::SplitterConfig;
use crate::error::RetrievalError;
use crate::models::Chunk;
use crate::traits::{Embedder, LanguageModel};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub const DEFAULT_TOP_K: usize = 4;

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

/// In-memory brute-force cosine index over the chunks of one source.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    id: String,
    source: String,
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    dimensions: usize,
    splitter: SplitterConfig,
    built_at: DateTime<Utc>,
}

impl VectorIndex {
    pub fn build(
        source: impl Into<String>,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        splitter: SplitterConfig,
    ) -> Result<Self, RetrievalError> {
        if chunks.len() != embeddings.len() {
            return Err(RetrievalError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let source = source.into();
        Ok(Self {
            id: index_id(&source, &chunks),
            source,
            chunks,
            embeddings,
            dimensions,
            splitter,
            built_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn splitter(&self) -> &SplitterConfig {
        &self.splitter
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// The `top_k` chunks closest to `query_vector`, best first.
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk<'_>>, RetrievalError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut scored = self
            .chunks
            .iter()
            .zip(&self.embeddings)
            .map(|(chunk, embedding)| ScoredChunk {
                chunk,
                score: cosine_similarity(query_vector, embedding),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Retrieves context for `question` and asks `llm` to answer from it.
    pub async fn query(
        &self,
        question: &str,
        embedder: &dyn Embedder,
        llm: &dyn LanguageModel,
        top_k: usize,
    ) -> Result<String, RetrievalError> {
        let query_vector = embedder.embed_query(question).await?;
        let hits = self.search(&query_vector, top_k)?;
        let context = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        llm.generate(&build_prompt(&context, question)).await
    }
}

/// Fills the stuff-style prompt in one pass, so braces inside retrieved text
/// are passed through untouched.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("{PROMPT_PREAMBLE}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:")
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

fn index_id(source: &str, chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    for chunk in chunks {
        hasher.update(chunk.page.to_le_bytes());
        hasher.update(chunk.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Indexes in the order they were built.
#[derive(Debug, Clone, Default)]
pub struct IndexCollection {
    indexes: Vec<VectorIndex>,
}

impl IndexCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: VectorIndex) {
        self.indexes.push(index);
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VectorIndex> {
        self.indexes.iter()
    }
}

impl FromIterator<VectorIndex> for IndexCollection {
    fn from_iter<I: IntoIterator<Item = VectorIndex>>(iter: I) -> Self {
        Self {
            indexes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a IndexCollection {
    type Item = &'a VectorIndex;
    type IntoIter = std::slice::Iter<'a, VectorIndex>;

    fn into_iter(self) -> Self::IntoIter {
        self.indexes.iter()
    }
}
