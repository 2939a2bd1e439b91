//! Fixed-size character windows with overlap.
//!
//! Windows are measured in characters, never split a UTF-8 sequence, and advance by
//! `size - overlap`. The last window may be shorter. Windows holding only whitespace are dropped
//! and the remaining ones are numbered consecutively.

use super::types::ChunkingError;

/// One window of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based ordinal among the kept windows.
    pub index: u32,
    /// Window contents.
    pub text: String,
}

/// Split `text` into windows of `size` characters overlapping by `overlap` characters.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkingError> {
    if size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= size {
        return Err(ChunkingError::InvalidOverlap { size, overlap });
    }

    // Byte offset of every character, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < char_count {
        let end = (start + size).min(char_count);
        let window = &text[boundaries[start]..boundaries[end]];
        if !window.trim().is_empty() {
            chunks.push(Chunk {
                index: chunks.len() as u32,
                text: window.to_string(),
            });
        }
        if end == char_count {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
