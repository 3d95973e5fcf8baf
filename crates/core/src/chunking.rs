use crate::error::ChunkingError;
use crate::models::TextChunk;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SENTENCE_BOUNDARY: &str = r"[.!?]+\s+";

/// Two-character terminators a window boundary may be pulled back to.
const TERMINATORS: [[char; 2]; 4] = [['.', ' '], ['!', ' '], ['?', ' '], ['\n', '\n']];

pub type ChunkMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub sentences_per_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            sentences_per_chunk: 5,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.sentences_per_chunk == 0 {
            return Err(ChunkingError::InvalidConfig(
                "sentences_per_chunk must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits text into bounded segments. Offsets in the produced chunks are
/// character offsets into the input and always delimit the trimmed chunk text.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkingConfig,
    sentence_boundary: Regex,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        config.validate()?;
        Ok(Self {
            config,
            sentence_boundary: Regex::new(SENTENCE_BOUNDARY)?,
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Greedy windowing with overlap. Each window ends at the latest sentence
    /// terminator found in the back half of the window, or at the raw window
    /// size when there is none.
    pub fn chunk_text(&self, text: &str, metadata: &ChunkMetadata) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let naive_end = (start + size).min(chars.len());
            let end = if naive_end < chars.len() {
                find_sentence_break(&chars, start + size / 2, naive_end).unwrap_or(naive_end)
            } else {
                naive_end
            };

            push_trimmed(&mut chunks, &chars, start, end, metadata);

            if end >= chars.len() {
                break;
            }

            // A window shorter than the overlap would otherwise stall.
            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// One chunk per non-empty blank-line separated paragraph.
    pub fn chunk_by_paragraphs(&self, text: &str, metadata: &ChunkMetadata) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut cursor = 0usize;

        for paragraph in text.split("\n\n") {
            let paragraph_len = paragraph.chars().count();
            let chars: Vec<char> = paragraph.chars().collect();
            let before = chunks.len();
            push_trimmed(&mut chunks, &chars, 0, chars.len(), metadata);

            if let Some(chunk) = chunks.get_mut(before) {
                chunk.start_offset += cursor;
                chunk.end_offset += cursor;
            }

            cursor += paragraph_len + 2;
        }

        chunks
    }

    /// Groups consecutive sentences, `sentences_per_chunk` at a time. A chunk's
    /// text is the source span from its first sentence to its last, so the
    /// whitespace between sentences is kept as written.
    pub fn chunk_by_sentences(&self, text: &str, metadata: &ChunkMetadata) -> Vec<TextChunk> {
        let sentences = self.split_sentences(text);
        sentences
            .chunks(self.config.sentences_per_chunk)
            .enumerate()
            .filter_map(|(chunk_index, group)| {
                let first = group.first()?;
                let last = group.last()?;
                Some(TextChunk {
                    text: text[first.byte_start..last.byte_end].to_string(),
                    chunk_index,
                    start_offset: first.start,
                    end_offset: last.end,
                    metadata: metadata.clone(),
                })
            })
            .collect()
    }

    fn split_sentences(&self, text: &str) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        let mut byte_cursor = 0usize;
        let mut char_cursor = 0usize;

        let mut spans = self
            .sentence_boundary
            .find_iter(text)
            .map(|boundary| {
                let punctuation = boundary.as_str().trim_end().len();
                (boundary.start() + punctuation, boundary.end())
            })
            .collect::<Vec<_>>();
        spans.push((text.len(), text.len()));

        for (sentence_end, next_start) in spans {
            let raw = &text[byte_cursor..sentence_end];
            let trimmed = raw.trim_start();
            let leading_bytes = raw.len() - trimmed.len();
            let trimmed = trimmed.trim_end();

            if !trimmed.is_empty() {
                let start = char_cursor + raw[..leading_bytes].chars().count();
                let byte_start = byte_cursor + leading_bytes;
                sentences.push(Sentence {
                    start,
                    end: start + trimmed.chars().count(),
                    byte_start,
                    byte_end: byte_start + trimmed.len(),
                });
            }

            char_cursor += text[byte_cursor..next_start].chars().count();
            byte_cursor = next_start;
        }

        sentences
    }
}

/// Char offsets for chunk metadata, byte offsets for slicing.
struct Sentence {
    start: usize,
    end: usize,
    byte_start: usize,
    byte_end: usize,
}

fn find_sentence_break(chars: &[char], floor: usize, end: usize) -> Option<usize> {
    let last_candidate = end.checked_sub(2)?;
    (floor.saturating_add(1)..=last_candidate)
        .rev()
        .find(|&position| {
            TERMINATORS.iter().any(|terminator| {
                chars[position] == terminator[0] && chars[position + 1] == terminator[1]
            })
        })
        .map(|position| position + 2)
}

fn push_trimmed(
    chunks: &mut Vec<TextChunk>,
    chars: &[char],
    start: usize,
    end: usize,
    metadata: &ChunkMetadata,
) {
    let window = &chars[start..end];
    let leading = window.iter().take_while(|c| c.is_whitespace()).count();
    let trailing = window[leading..]
        .iter()
        .rev()
        .take_while(|c| c.is_whitespace())
        .count();

    if leading + trailing >= window.len() {
        return;
    }

    let text_start = start + leading;
    let text_end = end - trailing;
    chunks.push(TextChunk {
        text: chars[text_start..text_end].iter().collect(),
        chunk_index: chunks.len(),
        start_offset: text_start,
        end_offset: text_end,
        metadata: metadata.clone(),
    });
}
