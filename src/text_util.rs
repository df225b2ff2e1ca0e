/// Maximum number of characters shown for a chunk in terminal output.
pub const DEFAULT_PREVIEW_MAX_CHARS: usize = 240;

/// Collapse all runs of whitespace (including newlines) into single spaces.
///
/// # Examples
///
/// ```
/// use docvec::text_util::collapse_whitespace;
///
/// assert_eq!(collapse_whitespace("a\n\n  b\tc "), "a b c");
/// ```
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Single-line preview of `text`, cut to at most `max_chars` characters
/// with a trailing `...` when truncated.
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let mut cut: String = collapsed.chars().take(max_chars).collect();
    // Prefer ending on a word boundary when one is reasonably close.
    if let Some(space) = cut.rfind(' ')
        && space >= cut.len() / 2
    {
        cut.truncate(space);
    }
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_short_text_unchanged() {
        assert_eq!(preview("hello world", 100), "hello world");
    }

    #[test]
    fn preview_flattens_lines() {
        assert_eq!(preview("line one\nline two", 100), "line one line two");
    }

    #[test]
    fn preview_truncates_on_word_boundary() {
        assert_eq!(preview("alpha beta gamma delta", 13), "alpha beta...");
    }

    #[test]
    fn preview_hard_cut_without_spaces() {
        assert_eq!(preview("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let text = "é".repeat(10);
        assert_eq!(preview(&text, 3), "ééé...");
    }

    #[test]
    fn collapse_empty() {
        assert_eq!(collapse_whitespace(" \n\t "), "");
    }
}
