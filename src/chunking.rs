//! Chunking utilities for splitting extracted text into overlapping segments.
//!
//! Sizes are measured in characters (Unicode scalar values), so a chunk never
//! splits a multi-byte code point. Consecutive chunks share exactly `overlap`
//! characters, which means the original text can always be reassembled by
//! dropping the first `overlap` characters of every chunk after the first.

use crate::error::{Error, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// How many characters before a hard cut the boundary search may look back,
/// expressed as a fraction (1/N) of the chunk size.
const BOUNDARY_WINDOW_DIVISOR: usize = 2;

/// Chunking configuration used by the indexer.
///
/// # Examples
///
/// ```
/// use docvec::chunking::{ChunkingConfig, DEFAULT_CHUNK_SIZE};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// Break preference, strongest first.
#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

impl Boundary {
    const ORDER: [Boundary; 3] =
        [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

    /// Whether a chunk may end right before char index `pos`.
    fn matches(self, chars: &[char], pos: usize) -> bool {
        let prev = chars[pos - 1];
        match self {
            Boundary::Paragraph => {
                pos >= 2 && prev == '\n' && chars[pos - 2] == '\n'
            }
            Boundary::Sentence => {
                prev == '\n'
                    || (prev.is_whitespace()
                        && pos >= 2
                        && matches!(chars[pos - 2], '.' | '!' | '?'))
            }
            Boundary::Word => prev.is_whitespace(),
        }
    }
}

/// Split text into chunks of at most `chunk_size` characters, each starting
/// `overlap` characters before the end of the previous one.
///
/// The scan is greedy: each chunk extends as far as possible, ending on a
/// paragraph break, a sentence end or whitespace when one exists in the
/// second half of the window, and on a hard cut otherwise. The final chunk is
/// always emitted, however short.
///
/// # Examples
///
/// ```
/// use docvec::chunking::split_text;
///
/// let chunks = split_text("Hello, world!", 1000, 100).unwrap();
/// assert_eq!(chunks, vec!["Hello, world!".to_string()]);
///
/// let text = "word ".repeat(500);
/// let chunks = split_text(&text, 1000, 200).unwrap();
/// assert!(chunks.len() >= 2);
/// assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
///
/// assert!(split_text("abc", 10, 10).is_err());
/// ```
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>> {
    ChunkingConfig {
        chunk_size,
        overlap,
    }
    .validate()?;

    let chars: Vec<char> = text.chars().collect();
    let char_count = chars.len();
    if char_count == 0 {
        return Ok(Vec::new());
    }

    // char index -> byte index, with the end of the text appended
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        if char_count - start <= chunk_size {
            chunks.push(text[char_to_byte[start]..].to_string());
            break;
        }

        let hard_end = start + chunk_size;
        let end = find_break(&chars, start, hard_end, chunk_size, overlap);
        chunks.push(text[char_to_byte[start]..char_to_byte[end]].to_string());

        // `end > start + overlap`, so the scan always advances.
        start = end - overlap;
    }

    Ok(chunks)
}

/// Pick the end of the chunk starting at `start`.
///
/// Candidates lie in `(start + overlap, hard_end]`, restricted to the second
/// half of the window so natural breaks never produce tiny chunks.
fn find_break(
    chars: &[char],
    start: usize,
    hard_end: usize,
    chunk_size: usize,
    overlap: usize,
) -> usize {
    let min_end = (start + overlap + 1)
        .max(start + chunk_size / BOUNDARY_WINDOW_DIVISOR)
        .min(hard_end);

    for boundary in Boundary::ORDER {
        if let Some(pos) = (min_end..=hard_end)
            .rev()
            .find(|&pos| boundary.matches(chars, pos))
        {
            return pos;
        }
    }

    hard_end
}

/// Chunk every extracted segment independently and concatenate the results
/// in order. Whitespace-only segments produce no chunks.
pub fn chunk_segments(
    segments: &[String],
    config: &ChunkingConfig,
) -> Result<Vec<String>> {
    let mut chunks = Vec::new();
    for segment in segments {
        if segment.trim().is_empty() {
            continue;
        }
        chunks.extend(split_text(segment, config.chunk_size, config.overlap)?);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Reassemble the original text by dropping each later chunk's overlap.
    fn reassemble(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    fn head(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    fn tail(s: &str, n: usize) -> String {
        let count = s.chars().count();
        s.chars().skip(count - n).collect()
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = split_text(
            "Hello, world!",
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
        )
        .unwrap();
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_text("", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            split_text("abc", 5, 5),
            Err(Error::InvalidChunking {
                chunk_size: 5,
                overlap: 5
            })
        ));
        assert!(split_text("abc", 0, 0).is_err());
    }

    #[test]
    fn hard_cut_without_whitespace() {
        let text = "a".repeat(25);
        let chunks = split_text(&text, 10, 3).unwrap();
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 10);
        assert_eq!(reassemble(&chunks, 3), text);
    }

    #[test]
    fn prefers_paragraph_break() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b word ".repeat(20));
        let chunks = split_text(&text, 50, 0).unwrap();
        assert!(chunks[0].ends_with("\n\n"), "got {:?}", chunks[0]);
    }

    #[test]
    fn prefers_sentence_over_word() {
        let text = "This is one sentence. This is another one that runs long";
        let chunks = split_text(text, 40, 0).unwrap();
        assert_eq!(chunks[0], "This is one sentence. ");
    }

    #[test]
    fn final_chunk_emitted_even_if_short() {
        let text = "x".repeat(21);
        let chunks = split_text(&text, 10, 0).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "x");
    }

    #[test]
    fn handles_multibyte_chars() {
        let text = "café ☕ naïve 日本語 🎉 ".repeat(50);
        let chunks = split_text(&text, 100, 20).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
        assert_eq!(reassemble(&chunks, 20), text);
    }

    #[test]
    fn chunk_segments_skips_blank_segments() {
        let segments = vec![
            "first page".to_string(),
            "   \n".to_string(),
            "second page".to_string(),
        ];
        let chunks =
            chunk_segments(&segments, &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks, vec!["first page", "second page"]);
    }

    proptest! {
        #[test]
        fn chunks_reassemble_with_exact_overlap(
            text in "(\\PC|\\s){0,400}",
            size in 1usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % size;
            let chunks = split_text(&text, size, overlap).unwrap();

            prop_assert_eq!(reassemble(&chunks, overlap), text.clone());
            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.chars().count() <= size);
            }
            for pair in chunks.windows(2) {
                prop_assert_eq!(
                    tail(&pair[0], overlap),
                    head(&pair[1], overlap)
                );
            }
        }
    }
}
