//! Tokenizer shared by the fulltext index and the memory backend's scan
//!
//! - Lowercase
//! - Split on non-alphanumeric characters
//! - Filter tokens shorter than 2 characters
//!
//! Positions count emitted tokens, so a phrase is a run of consecutive
//! positions.

/// Tokenize text into searchable terms
///
/// # Example
///
/// ```
/// use vitrum_storage::fulltext::tokenizer::tokenize;
///
/// let tokens = tokenize("Hello, World!");
/// assert_eq!(tokens, vec!["hello", "world"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .map(String::from)
        .collect()
}
