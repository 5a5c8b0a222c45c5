use crate::config::{GenerationParams, ModelEndpoint};
use crate::error::RetrievalError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    credentials_profile: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

/// Text-completion model behind a JSON HTTP endpoint.
pub struct HttpLanguageModel {
    endpoint: ModelEndpoint,
    params: GenerationParams,
    client: Client,
}

impl HttpLanguageModel {
    pub fn new(endpoint: ModelEndpoint, params: GenerationParams) -> Result<Self, RetrievalError> {
        params.validate()?;
        Ok(Self {
            endpoint,
            params,
            client: Client::new(),
        })
    }

    pub fn params(&self) -> GenerationParams {
        self.params
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    fn model_id(&self) -> &str {
        &self.endpoint.model_id
    }

    async fn generate(&self, prompt: &str) -> Result<String, RetrievalError> {
        let body = CompletionRequest {
            model: &self.endpoint.model_id,
            prompt,
            credentials_profile: &self.endpoint.credentials_profile,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };

        let mut request = self.client.post(self.endpoint.url.clone()).json(&body);
        if let Some(api_key) = &self.endpoint.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RetrievalError::BackendResponse {
                backend: "llm".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        completion_text(&parsed)
    }
}

/// Reads the generated text from `completion`, `text`, `output` or `choices[0].text`.
fn completion_text(payload: &Value) -> Result<String, RetrievalError> {
    ["/completion", "/text", "/output", "/choices/0/text"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .map(|text| text.trim().to_string())
        .ok_or_else(|| RetrievalError::BackendResponse {
            backend: "llm".to_string(),
            details: "response carries no completion text".to_string(),
        })
}
