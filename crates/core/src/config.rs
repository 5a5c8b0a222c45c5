use crate::error::RetrievalError;
use url::Url;

pub const DEFAULT_CREDENTIALS_PROFILE: &str = "default";
pub const DEFAULT_EMBEDDING_MODEL: &str = "amazon.titan-embed-text-v2:0";
pub const DEFAULT_LLM_MODEL: &str = "anthropic.claude-v2";
pub const DEFAULT_ROOT_DIRECTORY: &str = "pdf_files";

/// A hosted model reachable over HTTP.
#[derive(Debug, Clone)]
pub struct ModelEndpoint {
    pub url: Url,
    pub model_id: String,
    pub credentials_profile: String,
    pub api_key: Option<String>,
}

impl ModelEndpoint {
    pub fn parse(url: &str, model_id: impl Into<String>) -> Result<Self, RetrievalError> {
        Ok(Self {
            url: Url::parse(url)?,
            model_id: model_id.into(),
            credentials_profile: DEFAULT_CREDENTIALS_PROFILE.to_string(),
            api_key: None,
        })
    }

    pub fn with_credentials(mut self, profile: impl Into<String>, api_key: Option<String>) -> Self {
        self.credentials_profile = profile.into();
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 3000,
            temperature: 0.1,
            top_p: 0.5,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.max_tokens == 0 {
            return Err(RetrievalError::Request(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(RetrievalError::Request(format!(
                "top_p {} is outside 0..=1",
                self.top_p
            )));
        }
        if self.temperature < 0.0 {
            return Err(RetrievalError::Request(format!(
                "temperature {} is negative",
                self.temperature
            )));
        }
        Ok(())
    }
}
