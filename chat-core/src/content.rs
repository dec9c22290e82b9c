//! Outgoing message content preparation.

use thiserror::Error;

/// Content rejected before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// Nothing but whitespace.
    #[error("message is empty")]
    Empty,
}

/// Validate and escape user input for sending.
///
/// Whitespace-only input is rejected. `&`, `<` and `>` are escaped so the
/// stored text is safe to render as markup.
pub fn prepare(raw: &str) -> Result<String, ContentError> {
    if raw.trim().is_empty() {
        return Err(ContentError::Empty);
    }
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    Ok(out)
}
