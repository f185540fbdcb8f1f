//! Word-window chunking.
//!
//! Documents are split on whitespace and grouped into windows of `chunk_size` words. Each window
//! starts `chunk_size - overlap` words after the previous one, so neighbours share `overlap`
//! words. The final window always reaches the end of the text, and no window is emitted that is
//! wholly contained in its predecessor.

use super::types::ChunkingError;

/// Validate a chunk size / overlap pair.
pub(crate) fn validate_window(chunk_size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Split `text` into overlapping word windows.
///
/// Returns an empty vector when the input is all whitespace; any other input yields at least one
/// chunk.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    validate_window(chunk_size, overlap)?;

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(words.len().div_ceil(step));
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
