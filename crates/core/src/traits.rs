use crate::error::RetrievalError;
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, RetrievalError>;
}
