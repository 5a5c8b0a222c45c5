use crate::error::IngestError;
use crate::ingest::is_pdf_path;
use crate::isolate::{isolate, Stage};
use crate::models::Document;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Produces page-level documents for one file.
///
/// Implementations block; async callers must run them on a blocking thread.
pub trait PdfExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<Document>, IngestError>;
}

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest {
    pdf_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// Reads `LLM_OCR_ENDPOINT` and `LLM_OCR_API_KEY`; `None` when no endpoint is set.
    pub fn from_env() -> Option<Self> {
        let endpoint = non_empty_env("LLM_OCR_ENDPOINT")?;
        Some(Self {
            endpoint,
            api_key: non_empty_env("LLM_OCR_API_KEY"),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Extracts one document per page with `lopdf`, falling back to a multimodal OCR
/// endpoint when the file cannot be parsed or carries no text at all.
#[derive(Debug, Clone, Default)]
pub struct LopdfExtractor {
    ocr: Option<OcrEndpointConfig>,
}

impl LopdfExtractor {
    pub fn new(ocr: Option<OcrEndpointConfig>) -> Self {
        Self { ocr }
    }

    pub fn from_env() -> Self {
        Self::new(OcrEndpointConfig::from_env())
    }

    fn extract_with_lopdf(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        let document = lopdf::Document::load(path)
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            pages.push(Document::new(text, path, page_no));
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        match self.extract_with_lopdf(path) {
            Ok(pages) if pages.iter().any(|page| !page.text.trim().is_empty()) => Ok(pages),
            Ok(blank_pages) => match &self.ocr {
                Some(cfg) => extract_with_llm_ocr(cfg, path),
                None => Ok(blank_pages),
            },
            Err(IngestError::PdfParse(parse_error)) => match &self.ocr {
                Some(cfg) => extract_with_llm_ocr(cfg, path).map_err(|ocr_error| {
                    IngestError::PdfParse(format!(
                        "{parse_error}; multimodal OCR fallback failed: {ocr_error}"
                    ))
                }),
                None => Err(IngestError::PdfParse(parse_error)),
            },
            Err(error) => Err(error),
        }
    }
}

/// Extracts `path` without failing: non-PDF paths and extraction errors are logged
/// and yield no documents.
pub fn load_documents(extractor: &dyn PdfExtractor, path: &Path) -> Vec<Document> {
    isolate(Stage::Extraction, path.display(), Vec::new(), || {
        if !is_pdf_path(path) {
            return Err(IngestError::NotPdf(path.display().to_string()));
        }
        let documents = extractor.extract(path)?;
        info!(
            path = %path.display(),
            documents = documents.len(),
            "Loaded {} documents from {}",
            documents.len(),
            path.display()
        );
        Ok::<_, IngestError>(documents)
    })
}

fn extract_with_llm_ocr(cfg: &OcrEndpointConfig, path: &Path) -> Result<Vec<Document>, IngestError> {
    let pdf = std::fs::read(path)?;
    let payload = LlmOcrRequest {
        pdf_base64: STANDARD.encode(pdf),
        source_path: path.to_string_lossy().to_string(),
    };

    let mut request = Client::new()
        .post(&cfg.endpoint)
        .header("content-type", "application/json")
        .json(&payload);

    if let Some(api_key) = &cfg.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request.send()?;

    if !response.status().is_success() {
        return Err(IngestError::OcrFailed(format!(
            "multimodal OCR request to {} returned {}",
            cfg.endpoint,
            response.status()
        )));
    }

    let payload: LlmOcrResponse = response.json()?;
    payload_to_documents(&payload, path)
}

fn payload_to_documents(payload: &LlmOcrResponse, path: &Path) -> Result<Vec<Document>, IngestError> {
    if let Some(listed) = &payload.pages {
        let listed = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_deref().map(str::trim)?;
                if text.is_empty() {
                    return None;
                }
                Some(Document::new(text, path, page.page.unwrap_or(1)))
            })
            .collect::<Vec<_>>();

        if !listed.is_empty() {
            return Ok(listed);
        }
    }

    if let Some(raw_text) = &payload.text {
        let pages = raw_text
            .split('\u{000c}')
            .enumerate()
            .filter_map(|(index, page)| {
                let text = page.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(Document::new(text, path, (index + 1) as u32))
                }
            })
            .collect::<Vec<_>>();

        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    Err(IngestError::OcrFailed(format!(
        "multimodal OCR response was empty for {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_corrupt_pdf, write_pdf};
    use tempfile::tempdir;

    #[test]
    fn ocr_payload_with_pages_converts_only_nonempty_text() {
        let response = LlmOcrResponse {
            pages: Some(vec![
                LlmOcrPage {
                    page: Some(2),
                    text: Some("  ".to_string()),
                },
                LlmOcrPage {
                    page: Some(3),
                    text: Some("Page 3".to_string()),
                },
            ]),
            text: None,
        };

        let documents = payload_to_documents(&response, Path::new("x.pdf"))
            .expect("multimodal response should be parsed");

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].metadata.page, 3);
        assert_eq!(documents[0].text, "Page 3");
    }

    #[test]
    fn ocr_payload_fallback_text_split_by_form_feed() {
        let response = LlmOcrResponse {
            pages: None,
            text: Some("First\u{000C}Second\n".to_string()),
        };

        let documents = payload_to_documents(&response, Path::new("x.pdf"))
            .expect("multimodal response should be parsed");

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1].metadata.page, 2);
        assert_eq!(documents[1].text, "Second");
    }

    #[test]
    fn lopdf_extractor_yields_one_document_per_page() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = write_pdf(dir.path(), "three.pdf", &["one", "two", "three"]);

        let documents = LopdfExtractor::default().extract(&path)?;

        assert_eq!(documents.len(), 3);
        assert_eq!(
            documents.iter().map(|doc| doc.metadata.page).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(documents.iter().all(|doc| doc.metadata.source == path));
        Ok(())
    }

    #[test]
    fn extracting_twice_gives_same_count() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = write_pdf(dir.path(), "twice.pdf", &["alpha", "beta"]);
        let extractor = LopdfExtractor::default();

        let first = load_documents(&extractor, &path);
        let second = load_documents(&extractor, &path);

        assert_eq!(first.len(), 2);
        assert_eq!(first.len(), second.len());
        Ok(())
    }

    #[test]
    fn corrupt_pdf_loads_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = write_corrupt_pdf(dir.path(), "broken.pdf");

        assert!(LopdfExtractor::default().extract(&path).is_err());
        assert!(load_documents(&LopdfExtractor::default(), &path).is_empty());
        Ok(())
    }

    #[test]
    fn non_pdf_is_never_extracted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text")?;

        assert!(load_documents(&LopdfExtractor::default(), &path).is_empty());
        Ok(())
    }
}
