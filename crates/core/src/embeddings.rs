use crate::config::ModelEndpoint;
use crate::error::RetrievalError;
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Hashes character trigrams into a fixed number of buckets. Deterministic and
/// offline; used when no embedding endpoint is configured.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        "character-trigram"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embed(text))
    }
}

/// Embedding model behind a JSON HTTP endpoint.
///
/// Sends `{"model", "input", "credentials_profile"}` and accepts either
/// `{"data": [{"embedding": [...]}]}` or `{"embeddings": [[...]]}`.
pub struct HttpEmbedder {
    endpoint: ModelEndpoint,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(endpoint: ModelEndpoint) -> Self {
        Self {
            endpoint,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.endpoint.model_id
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.endpoint.url.clone()).json(&json!({
            "model": self.endpoint.model_id,
            "input": texts,
            "credentials_profile": self.endpoint.credentials_profile,
        }));
        if let Some(api_key) = &self.endpoint.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RetrievalError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let vectors = parse_embeddings(&parsed)?;
        if vectors.len() != texts.len() {
            return Err(RetrievalError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("{} vectors for {} inputs", vectors.len(), texts.len()),
            });
        }

        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::BackendResponse {
                backend: "embeddings".to_string(),
                details: "empty embedding response".to_string(),
            })
    }
}

fn parse_embeddings(payload: &Value) -> Result<Vec<Vec<f32>>, RetrievalError> {
    let rows = if let Some(data) = payload.pointer("/data").and_then(Value::as_array) {
        data.iter()
            .map(|row| row.pointer("/embedding").cloned().unwrap_or(Value::Null))
            .collect::<Vec<_>>()
    } else if let Some(embeddings) = payload.pointer("/embeddings").and_then(Value::as_array) {
        embeddings.clone()
    } else {
        return Err(RetrievalError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "response has neither `data` nor `embeddings`".to_string(),
        });
    };

    rows.iter().map(parse_vector).collect()
}

fn parse_vector(row: &Value) -> Result<Vec<f32>, RetrievalError> {
    let malformed = |details: &str| RetrievalError::BackendResponse {
        backend: "embeddings".to_string(),
        details: details.to_string(),
    };

    row.as_array()
        .ok_or_else(|| malformed("embedding is not an array"))?
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|number| number as f32)
                .ok_or_else(|| malformed("embedding holds a non-numeric value"))
        })
        .collect()
}
