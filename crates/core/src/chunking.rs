use crate::error::IngestError;
use crate::models::{Chunk, Document};
use regex::Regex;
use std::collections::VecDeque;
use tracing::warn;

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_CHUNK_OVERLAP: usize = 10;

/// Paragraph break, line break, space, then single characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|sep| sep.to_string()).collect(),
        }
    }
}

impl SplitterConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(IngestError::InvalidChunkConfig(
                "at least one separator is required".to_string(),
            ));
        }
        Ok(())
    }
}

const BLANK_LINE_RUN: &str = r"\n[ \t]*(?:\n[ \t]*)+";

/// Splits text on the first separator that occurs in it, recursing into pieces
/// that are still too long with the remaining separators, then merges the
/// pieces back into chunks of at most `chunk_size` characters that overlap by
/// at most `chunk_overlap` characters.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: SplitterConfig,
    blank_runs: Regex,
}

impl RecursiveSplitter {
    pub fn new(config: SplitterConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            config,
            blank_runs: Regex::new(BLANK_LINE_RUN)?,
        })
    }

    /// Collapses runs of blank lines to a single paragraph break and replaces
    /// non-breaking spaces, leaving single line breaks for the splitter.
    pub fn normalize(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\u{a0}', " ");
        self.blank_runs.replace_all(&text, "\n\n").trim().to_string()
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.config.separators)
    }

    /// Chunks every document, numbering chunks consecutively across the set.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            let normalized = self.normalize(&document.text);
            for text in self.split_text(&normalized) {
                chunks.push(Chunk {
                    text,
                    source: document.metadata.source.clone(),
                    page: document.metadata.page,
                    ordinal: chunks.len(),
                });
            }
        }
        chunks
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(start, ch)| &text[start..start + ch.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|piece| !piece.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in splits {
            if char_len(piece) < self.config.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }

            if separator.is_empty() {
                chunks.push(piece.to_string());
            } else {
                // An empty list falls through to single characters.
                chunks.extend(self.split_with(piece, remaining));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let separator_len = char_len(separator);

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let piece_len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { separator_len };

            if total + piece_len + joiner > chunk_size {
                if total > chunk_size {
                    warn!(
                        length = total,
                        chunk_size, "created a chunk longer than the configured chunk size"
                    );
                }

                if !window.is_empty() {
                    push_joined(&mut chunks, &window, separator);

                    while total > overlap
                        || (total > 0
                            && total
                                + piece_len
                                + if window.is_empty() { 0 } else { separator_len }
                                > chunk_size)
                    {
                        let Some(front) = window.pop_front() else {
                            break;
                        };
                        let joiner = if window.is_empty() { 0 } else { separator_len };
                        total = total.saturating_sub(char_len(front) + joiner);
                    }
                }
            }

            let joiner = if window.is_empty() { 0 } else { separator_len };
            window.push_back(piece);
            total += piece_len + joiner;
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    let exhausted: &'a [String] = &[];
    for (position, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", exhausted);
        }
        if text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[position + 1..]);
        }
    }

    match separators.last() {
        Some(last) => (last.as_str(), exhausted),
        None => ("", exhausted),
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
