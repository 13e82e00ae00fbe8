//! Approximate token accounting.

/// Characters per approximate token.
const CHARS_PER_TOKEN: usize = 4;

/// Estimates the token cost of `text` from its length alone.
///
/// The cost is `max(1, len / 4)` where `len` counts Unicode scalar values, so every text costs
/// at least one token and the estimate never decreases as the text grows.
///
/// ```
/// use ollama_chat::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 1);
/// assert_eq!(estimate_tokens("abcdefgh"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_TOKEN).max(1)
}
