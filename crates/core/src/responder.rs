use crate::index::{IndexCollection, DEFAULT_TOP_K};
use crate::isolate::{isolate_async, Stage};
use crate::traits::{Embedder, LanguageModel};
use std::sync::Arc;
use tracing::info;

/// Asks the same question of every index in a collection.
pub struct QueryResponder {
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl QueryResponder {
    pub fn new(embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            embedder,
            llm,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// One answer per index that could be queried, in collection order. Failed
    /// indexes are logged and omitted.
    pub async fn respond(&self, indexes: &IndexCollection, question: &str) -> Vec<String> {
        let mut answers = Vec::new();

        for (position, index) in indexes.iter().enumerate() {
            let label = format!("index #{} ({})", position + 1, index.source());
            let answer = isolate_async(Stage::Query, &label, None, async {
                index
                    .query(question, self.embedder.as_ref(), self.llm.as_ref(), self.top_k)
                    .await
                    .map(Some)
            })
            .await;

            if let Some(answer) = answer {
                answers.push(answer);
            }
        }

        info!(
            indexes = indexes.len(),
            answers = answers.len(),
            model = self.llm.model_id(),
            "query complete"
        );
        answers
    }
}
