//! Text helpers shared by the analysis and embeddings stages.

/// Longest prefix of `text` holding at most `max_chars` characters.
///
/// Always cuts on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Rough token estimate (four characters per token) for providers that
/// don't report usage.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Drop NUL and other control characters PostgreSQL text columns reject
/// or that carry no meaning to the model. Newlines, tabs, and carriage
/// returns are kept.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}
