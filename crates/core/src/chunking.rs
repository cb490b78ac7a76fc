use crate::error::IngestError;
use crate::patterns::TextPatterns;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SENTENCE_TERMINATORS: [char; 4] = ['。', '！', '？', '\n'];

/// Sizes are counted in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_merge_length: usize,
    pub min_chunk_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            min_merge_length: 50,
            min_chunk_length: 20,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits documents into retrieval-sized chunks along paragraph and
/// sentence boundaries.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkingConfig,
    patterns: TextPatterns,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            config,
            patterns: TextPatterns::new()?,
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let normalized = self.patterns.normalize(text);
        let paragraphs = self.patterns.paragraphs(&normalized);
        let merged = self.merge_short_paragraphs(&paragraphs);

        let mut chunks = Vec::new();
        for paragraph in merged {
            if char_len(&paragraph) <= self.config.chunk_size {
                chunks.push(paragraph.trim().to_string());
            } else {
                chunks.extend(self.split_long_paragraph(&paragraph));
            }
        }

        let min_chunk_length = self.config.min_chunk_length;
        let result: Vec<String> = chunks
            .into_iter()
            .filter(|chunk| char_len(chunk.trim()) > min_chunk_length)
            .collect();

        debug!(
            input_chars = char_len(text),
            chunk_count = result.len(),
            "document split into chunks"
        );
        result
    }

    pub fn merge_short_paragraphs(&self, paragraphs: &[&str]) -> Vec<String> {
        let mut iter = paragraphs.iter().map(|paragraph| paragraph.trim());
        let Some(first) = iter.next() else {
            return Vec::new();
        };

        let mut merged = Vec::new();
        let mut current = first.to_string();

        for next in iter {
            let absorb = char_len(current.trim()) < self.config.min_merge_length
                && !self.patterns.is_heading(next)
                && !self.patterns.is_list_item(next);

            if absorb {
                current.push(' ');
                current.push_str(next);
            } else {
                if !current.is_empty() {
                    merged.push(std::mem::take(&mut current));
                }
                current = next.to_string();
            }
        }

        if !current.is_empty() {
            merged.push(current);
        }
        merged
    }

    pub fn split_long_paragraph(&self, paragraph: &str) -> Vec<String> {
        let limit = self.config.chunk_size;
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for sentence in split_sentences(paragraph) {
            let sentence_len = char_len(&sentence);
            if current_len + sentence_len <= limit {
                current.push_str(&sentence);
                current_len += sentence_len;
                continue;
            }

            if !current.is_empty() {
                chunks.push(current.trim().to_string());
            }

            if sentence_len > limit {
                chunks.extend(force_split(&sentence, limit));
                current.clear();
                current_len = 0;
            } else {
                current = sentence;
                current_len = sentence_len;
            }
        }

        if !current.is_empty() {
            chunks.push(current.trim().to_string());
        }

        add_overlap(chunks, self.config.chunk_overlap)
    }
}

/// Sentences with their terminator re-attached, trimmed, empties removed.
/// Text after the last terminator is kept as a final sentence.
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in paragraph.chars() {
        current.push(ch);
        if SENTENCE_TERMINATORS.contains(&ch) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Fixed windows of `max_chars` characters with no regard for meaning.
pub fn force_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|window| window.iter().collect::<String>())
        .collect()
}

/// Prefixes every chunk after the first with the tail of its predecessor.
///
/// The prefix, joining space included, never exceeds `overlap` characters,
/// so an overlapped chunk stays within `chunk_size + overlap`. The tail is
/// therefore `overlap - 1` characters long, and an `overlap` of 1 adds
/// nothing.
pub fn add_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() <= 1 {
        return chunks;
    }

    let tail_len = overlap - 1;
    let mut result = Vec::with_capacity(chunks.len());
    result.push(chunks[0].clone());

    for pair in chunks.windows(2) {
        let tail = char_tail(&pair[0], tail_len);
        if tail.is_empty() {
            result.push(pair[1].clone());
        } else {
            result.push(format!("{tail} {}", pair[1]));
        }
    }
    result
}

fn char_tail(text: &str, count: usize) -> &str {
    let total = char_len(text);
    if total <= count {
        return text;
    }
    let skip = total - count;
    match text.char_indices().nth(skip) {
        Some((offset, _)) => &text[offset..],
        None => "",
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}
