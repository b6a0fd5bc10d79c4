//! Review text preprocessing for embedding generation.
//!
//! 1. Trim whitespace
//! 2. Skip if empty
//! 3. Truncate to max length with ellipsis

use sha2::{Digest, Sha256};

/// Maximum content length for embedding input (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 2048;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Prepare review text for the encoder.
///
/// Returns `None` if the text is empty after trimming.
pub fn preprocess_review(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(truncate_content(text))
}

/// Truncate content to MAX_CONTENT_LENGTH characters, adding ellipsis if truncated.
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

/// Hash of review text, stored next to its vector for change detection.
///
/// Stable across builds and platforms since it ends up in `vectors.bin`.
pub fn content_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.trim().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
