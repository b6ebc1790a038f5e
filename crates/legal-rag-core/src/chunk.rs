//! Sentence-aware, overlapping text chunker.
//!
//! Splits normalized document text into [`Chunk`]s of at most
//! `chunk_size` characters, carrying `overlap` characters from the end of
//! each chunk into the next one.
//!
//! # Algorithm
//!
//! 1. Normalize whitespace: collapse every run to a single space, trim.
//! 2. Take a window of up to `chunk_size` characters from the cursor.
//! 3. If the window does not reach the end of the text, look in its second
//!    half for the last sentence terminator (`". "`) or newline and cut
//!    right after it. Without one, keep the hard cut.
//! 4. Emit the chunk with absolute character offsets and the next index.
//! 5. Stop if the chunk reached the end of the text, otherwise advance the
//!    cursor by `chunk_len - overlap`, never by less than one character.
//!
//! Offsets are character offsets into the normalized text, and every chunk
//! satisfies `content == normalized[start_offset..end_offset]`.
//!
//! # Example
//!
//! ```rust
//! use legal_rag_core::chunk::{chunk_text, ChunkConfig};
//!
//! let config = ChunkConfig { chunk_size: 30, overlap: 0 };
//! let chunks = chunk_text("doc-1", "First sentence here.  Second   one follows it.", &config);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].content, "First sentence here. ");
//! assert_eq!(chunks[1].start_offset, 21);
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RagError;
use crate::models::Chunk;

/// Chunk window parameters, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkPreset::Default.config()
    }
}

/// Named chunk settings tuned per content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPreset {
    #[default]
    Default,
    /// Codes, statutes, regulations: long articles, generous overlap.
    Statute,
    Contract,
    /// Short question/answer pairs.
    Faq,
}

impl ChunkPreset {
    pub fn config(&self) -> ChunkConfig {
        let (chunk_size, overlap) = match self {
            ChunkPreset::Default => (1000, 200),
            ChunkPreset::Statute => (1500, 300),
            ChunkPreset::Contract => (1200, 200),
            ChunkPreset::Faq => (500, 50),
        };
        ChunkConfig {
            chunk_size,
            overlap,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkPreset::Default => "default",
            ChunkPreset::Statute => "statute",
            ChunkPreset::Contract => "contract",
            ChunkPreset::Faq => "faq",
        }
    }
}

impl fmt::Display for ChunkPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkPreset {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(ChunkPreset::Default),
            "statute" => Ok(ChunkPreset::Statute),
            "contract" => Ok(ChunkPreset::Contract),
            "faq" => Ok(ChunkPreset::Faq),
            other => Err(RagError::Configuration(format!(
                "unknown chunk preset '{}': use default, statute, contract, or faq",
                other
            ))),
        }
    }
}

/// Collapse whitespace runs to single spaces and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into overlapping, sentence-aware chunks.
///
/// Empty (or whitespace-only) input yields no chunks. Terminates for any
/// `overlap`, including `overlap >= chunk_size`. A `chunk_size` of zero is
/// treated as one.
pub fn chunk_text(document_id: &str, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let normalized = normalize_whitespace(text);
    let chars: Vec<char> = normalized.chars().collect();
    let total = chars.len();
    let chunk_size = config.chunk_size.max(1);

    let mut chunks = Vec::new();
    if total == 0 {
        return chunks;
    }

    let mut start = 0usize;
    let mut chunk_index: i64 = 0;

    loop {
        let window_end = (start + chunk_size).min(total);
        let end = if window_end < total {
            find_break(&chars[start..window_end])
                .map(|cut| start + cut)
                .unwrap_or(window_end)
        } else {
            window_end
        };

        let content: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(document_id, chunk_index, content, start, end));
        chunk_index += 1;

        if end >= total {
            break;
        }

        let len = end - start;
        start += len.saturating_sub(config.overlap).max(1);
    }

    chunks
}

/// Position right after the last `". "` or newline in the second half of
/// the window, if any.
fn find_break(window: &[char]) -> Option<usize> {
    let half = window.len() / 2;
    (half..window.len()).rev().find_map(|i| match window[i] {
        '\n' => Some(i + 1),
        '.' if window.get(i + 1) == Some(&' ') => Some(i + 2),
        _ => None,
    })
}

fn make_chunk(document_id: &str, index: i64, content: String, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        content,
        start_offset: start,
        end_offset: end,
        metadata: None,
        hash,
    }
}

/// Incremental chunker for input too large to hold in memory.
///
/// Text is pushed piece by piece; whitespace is normalized across piece
/// boundaries. Whenever the buffer reaches `chunk_size` characters a
/// fixed window is emitted and only the overlap tail is retained.
/// Streaming windows are hard cuts: there is no sentence lookback.
///
/// ```rust
/// use legal_rag_core::chunk::{ChunkConfig, StreamChunker};
///
/// let mut chunker = StreamChunker::new("doc-1", ChunkConfig { chunk_size: 4, overlap: 1 });
/// let mut chunks = chunker.push("abcdef");
/// chunks.extend(chunker.finish());
/// let texts: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
/// assert_eq!(texts, vec!["abcd", "def"]);
/// ```
pub struct StreamChunker {
    document_id: String,
    chunk_size: usize,
    retain: usize,
    buffer: Vec<char>,
    /// Absolute offset of `buffer[0]` in the normalized stream.
    buffer_start: usize,
    /// Absolute end offset of the last emitted chunk.
    emitted_until: usize,
    next_index: i64,
    pending_space: bool,
}

impl StreamChunker {
    pub fn new(document_id: &str, config: ChunkConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            document_id: document_id.to_string(),
            chunk_size,
            retain: config.overlap.min(chunk_size - 1),
            buffer: Vec::with_capacity(chunk_size),
            buffer_start: 0,
            emitted_until: 0,
            next_index: 0,
            pending_space: false,
        }
    }

    /// Feed the next piece of text, returning any windows it completed.
    pub fn push(&mut self, piece: &str) -> Vec<Chunk> {
        let mut out = Vec::new();
        for ch in piece.chars() {
            if ch.is_whitespace() {
                // Leading whitespace of the stream is dropped.
                if self.buffer_start + self.buffer.len() > 0 {
                    self.pending_space = true;
                }
                continue;
            }
            if self.pending_space {
                self.pending_space = false;
                self.push_char(' ', &mut out);
            }
            self.push_char(ch, &mut out);
        }
        out
    }

    /// Flush the remainder as a final, possibly short, chunk.
    pub fn finish(mut self) -> Option<Chunk> {
        let end = self.buffer_start + self.buffer.len();
        if end <= self.emitted_until {
            return None;
        }
        let content: String = self.buffer.drain(..).collect();
        Some(make_chunk(
            &self.document_id,
            self.next_index,
            content,
            self.buffer_start,
            end,
        ))
    }

    fn push_char(&mut self, ch: char, out: &mut Vec<Chunk>) {
        self.buffer.push(ch);
        if self.buffer.len() < self.chunk_size {
            return;
        }

        let start = self.buffer_start;
        let end = start + self.buffer.len();
        let content: String = self.buffer.iter().collect();
        out.push(make_chunk(
            &self.document_id,
            self.next_index,
            content,
            start,
            end,
        ));
        self.next_index += 1;
        self.emitted_until = end;

        let keep_from = self.buffer.len() - self.retain;
        self.buffer.drain(..keep_from);
        self.buffer_start = end - self.retain;
    }
}
