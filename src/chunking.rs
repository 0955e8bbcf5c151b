//! Chunking utilities for turning extracted text into embeddable chunks.
//!
//! Two strategies exist. Paragraph packing merges consecutive paragraphs
//! until a token budget would be exceeded; it is used for page-oriented
//! documents. Word windows split free text into non-overlapping runs of a
//! fixed number of words.
//!
//! The token budget is a soft ceiling: a paragraph that is larger than the
//! budget on its own still becomes one whole chunk and is never truncated.

use serde::{Deserialize, Serialize};

use crate::tokens::TokenCounter;

/// A unit of text stored and embedded for retrieval.
///
/// The same record is what the metadata store persists, one per indexed
/// vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// File name of the document the text came from.
    pub source: String,
    /// The chunk text content.
    pub text: String,
}

impl Chunk {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Split text into paragraphs on blank-line boundaries.
///
/// Paragraphs are trimmed and empty ones dropped.
///
/// # Examples
///
/// ```
/// use docwell::chunking::split_paragraphs;
///
/// let paragraphs = split_paragraphs("First.\n\n\n\n  Second.  \n\n");
/// assert_eq!(paragraphs, vec!["First.", "Second."]);
/// ```
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pack consecutive paragraphs into chunks of roughly `target_tokens`.
///
/// A running chunk is flushed when adding the next paragraph would push
/// its token count over the target and the running chunk is non-empty.
/// Otherwise the paragraph is appended after a single space.
///
/// # Examples
///
/// ```
/// use docwell::chunking::pack_paragraphs;
/// use docwell::tokens::TokenCounter;
///
/// let paragraphs = ["aaaa", "bbbb", "cccc"].map(String::from);
/// // Each paragraph is one approximate token.
/// let chunks = pack_paragraphs(&paragraphs, 2, &TokenCounter::Approximate);
/// assert_eq!(chunks, vec!["aaaa bbbb", "cccc"]);
/// ```
pub fn pack_paragraphs(
    paragraphs: &[String],
    target_tokens: usize,
    counter: &TokenCounter,
) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0;

    for paragraph in paragraphs {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let tokens = counter.count(paragraph);
        if current_tokens + tokens > target_tokens && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(paragraph);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split text into non-overlapping windows of `words_per_chunk` words.
///
/// Words are separated by any whitespace and re-joined with single
/// spaces. Empty text produces no windows.
///
/// # Examples
///
/// ```
/// use docwell::chunking::split_words;
///
/// let windows = split_words("one two\nthree   four five", 2);
/// assert_eq!(windows, vec!["one two", "three four", "five"]);
/// assert!(split_words("   ", 2).is_empty());
/// ```
pub fn split_words(text: &str, words_per_chunk: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(words_per_chunk.max(1))
        .map(|window| window.join(" "))
        .collect()
}
