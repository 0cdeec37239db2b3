use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0} cannot be empty or whitespace-only")]
pub struct EmptyNameError(pub &'static str);

/// Strips C0 control characters and DEL, keeping tab, newline and CR.
///
/// Names typed on the command line end up in terminal output (`users`,
/// `feeds`), so escape bytes are removed before they reach the store.
///
/// Returns `Cow::Borrowed` when nothing needed stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\x7f' || (c < '\x20' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_control(c)).collect())
}

/// SEC-014: Sanitize a user-supplied name (user or feed).
///
/// Strips control characters, trims whitespace, and rejects empty results.
/// `what` names the field in the error message.
pub fn sanitize_name(name: &str, what: &'static str) -> Result<String, EmptyNameError> {
    let stripped = strip_control_chars(name);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return Err(EmptyNameError(what));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "Hello, world!";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        let input = "line1\nline2\ttabbed\r\n";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_removes_controls_and_del() {
        let result = strip_control_chars("he\x00ll\x07o\x1b[31m w\x7fo");
        assert_eq!(result, "hello[31m wo");
    }

    #[test]
    fn test_sanitize_trims() {
        assert_eq!(sanitize_name("  lane \n", "User name").unwrap(), "lane");
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        let err = sanitize_name(" \x1b\x07 ", "Feed name").unwrap_err();
        assert_eq!(err, EmptyNameError("Feed name"));
        assert_eq!(err.to_string(), "Feed name cannot be empty or whitespace-only");
    }
}
