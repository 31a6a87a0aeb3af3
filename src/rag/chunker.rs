//! Content chunking for RAG indexing.
//!
//! Notes are split recursively on a list of separators, from paragraph
//! breaks down to single characters, and the pieces are merged back into
//! chunks of at most `chunk_size` characters with a bounded overlap.

use std::collections::VecDeque;

use thiserror::Error;

use super::models::{Chunk, Document};

/// Maximum characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Overlap characters between chunks for context continuity.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Approximate characters per token (rough estimate for English text).
const CHARS_PER_TOKEN: usize = 4;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters.
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Error, Debug, PartialEq)]
pub enum SplitterError {
    #[error("Chunk size must be positive")]
    ZeroChunkSize,

    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Recursive character text splitter.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitterError> {
        if chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitterError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        })
    }

    /// Split every document, copying its metadata onto each chunk.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .enumerate()
                    .map(|(index, content)| Chunk {
                        chunk_index: index as u32,
                        content,
                        metadata: doc.metadata.clone(),
                    })
            })
            .collect()
    }

    /// Split raw text into string chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Use the first separator that occurs in the text
        let (separator, remaining) = match separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
        {
            Some(i) => (separators[i].as_str(), &separators[i + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut good_pieces: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                good_pieces.push(piece);
                continue;
            }

            if !good_pieces.is_empty() {
                final_chunks.extend(self.merge_pieces(&good_pieces, separator));
                good_pieces.clear();
            }

            if remaining.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    final_chunks.push(piece.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_pieces.is_empty() {
            final_chunks.extend(self.merge_pieces(&good_pieces, separator));
        }

        final_chunks
    }

    /// Join small pieces into chunks no longer than `chunk_size`, carrying
    /// at most `chunk_overlap` characters from one chunk into the next.
    fn merge_pieces(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |current: &VecDeque<&str>, total: usize| {
                total + len + if current.is_empty() { 0 } else { separator_len }
            };

            if joined_len(&current, total) > self.chunk_size && !current.is_empty() {
                if let Some(chunk) = join_pieces(&current, separator) {
                    chunks.push(chunk);
                }

                while total > self.chunk_overlap
                    || (joined_len(&current, total) > self.chunk_size && total > 0)
                {
                    let separator_share = if current.len() > 1 { separator_len } else { 0 };
                    match current.pop_front() {
                        Some(front) => {
                            total = total.saturating_sub(char_len(front) + separator_share);
                        }
                        None => {
                            total = 0;
                            break;
                        }
                    }
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        if let Some(chunk) = join_pieces(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn join_pieces(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Estimate the number of tokens in text.
pub fn estimate_tokens(text: &str) -> usize {
    char_len(text).div_ceil(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::models::{Metadata, MetadataValue};

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_small_text_is_single_chunk() {
        let splitter = TextSplitter::default();
        let chunks = splitter.split_text("Hello world");
        assert_eq!(chunks, vec!["Hello world".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let splitter = TextSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("  \n\n  ").is_empty());
    }

    #[test]
    fn test_paragraphs_are_merged_with_their_separator() {
        let splitter = TextSplitter::default();
        let chunks = splitter.split_text("First paragraph.\n\nSecond paragraph.");
        assert_eq!(chunks, vec!["First paragraph.\n\nSecond paragraph.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let splitter = TextSplitter::new(100, 20).unwrap();
        let text = numbered_words(300);
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {}", chunk.len());
        }

        // The first word of each chunk was carried over from the previous one
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].split(' ').any(|w| w == first_word),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_every_word_survives_splitting() {
        let splitter = TextSplitter::new(120, 30).unwrap();
        let text = format!(
            "{}\n\n{}\n{}",
            numbered_words(80),
            numbered_words(10),
            numbered_words(45)
        );
        let chunks = splitter.split_text(&text);

        for word in text.split_whitespace() {
            assert!(
                chunks.iter().any(|c| c.split_whitespace().any(|w| w == word)),
                "missing word {}",
                word
            );
        }
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = TextSplitter::default();
        let text = "x".repeat(1200);
        let lengths: Vec<usize> = splitter
            .split_text(&text)
            .iter()
            .map(|c| c.chars().count())
            .collect();
        assert_eq!(lengths, vec![500, 500, 300]);
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = "çok güzel bir gün ".repeat(20);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn test_split_documents_copies_metadata() {
        let splitter = TextSplitter::new(40, 5).unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), MetadataValue::from("journal/day.md"));
        let doc = Document::new(numbered_words(30), metadata);

        let chunks = splitter.split_documents(&[doc]);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.source(), "journal/day.md");
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(TextSplitter::new(0, 0).unwrap_err(), SplitterError::ZeroChunkSize);
        assert_eq!(
            TextSplitter::new(50, 50).unwrap_err(),
            SplitterError::OverlapTooLarge { size: 50, overlap: 50 }
        );
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
