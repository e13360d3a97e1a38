//! Response normalization
//!
//! Turns raw provider text into a complete, punctuated answer. Replies cut off
//! at the token limit are truncated back to their last finished sentence.

/// Returned when a provider produced no usable text. Also treated as a failure
/// marker by the router.
pub const DEFAULT_ERROR_MESSAGE: &str =
    "I apologize, but I couldn't generate a proper response at this time.";

/// Phrase the system prompt asks models to use when the profile has no answer.
pub const NO_KNOWLEDGE_MARKER: &str = "Sorry this is not available in our knowledge";

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Normalize a raw reply into a complete sentence.
///
/// - whitespace-only input becomes [`DEFAULT_ERROR_MESSAGE`]
/// - text after the last `.`, `!` or `?` is dropped
/// - text without any terminal punctuation gets a trailing period
pub fn ensure_complete_response(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_ERROR_MESSAGE.to_string();
    }

    match trimmed.rfind(is_terminal) {
        // Terminal marks are single-byte, so idx + 1 is a char boundary
        Some(idx) => trimmed[..=idx].to_string(),
        None => format!("{}.", trimmed),
    }
}

/// Whether the normalized content is the sentinel default-error sentence
pub fn is_default_error(content: &str) -> bool {
    content == DEFAULT_ERROR_MESSAGE
}

/// Whether the content tells the visitor to use the contact form instead
pub fn contains_redirect_marker(content: &str) -> bool {
    content.contains(NO_KNOWLEDGE_MARKER)
}
