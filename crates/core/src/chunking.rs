//! Splitting identifier lists into fixed-size chunks.
//!
//! Pure functions used by the job store when a chunked job is created.

use std::collections::HashSet;

use crate::error::CoreError;

/// Chunk size used when the caller does not pick one.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Upper bound accepted for a caller-provided chunk size.
pub const MAX_CHUNK_SIZE: usize = 1_000;

/// Remove duplicate identifiers, keeping the first occurrence of each.
pub fn dedupe_preserving_order(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

/// Partition `items` into contiguous chunks of at most `chunk_size` entries.
///
/// Concatenating the chunks in order yields `items` again. An empty input
/// yields no chunks. A zero `chunk_size` is treated as 1; callers validate
/// the size with [`validate_chunk_size`] before getting here.
pub fn split_into_chunks(items: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    items
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Validate a caller-provided chunk size.
pub fn validate_chunk_size(chunk_size: usize) -> Result<(), CoreError> {
    if chunk_size == 0 {
        return Err(CoreError::Validation(
            "chunk_size must be at least 1".to_string(),
        ));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(CoreError::Validation(format!(
            "chunk_size must not exceed {MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}
