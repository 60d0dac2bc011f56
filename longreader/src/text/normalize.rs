//! Plain-text normalization before sentence segmentation.
//!
//! Source documents are usually hard-wrapped at a fixed column. Line breaks
//! inside a paragraph are joined back into spaces so the segmenter and the
//! rewrite service see flowing prose; blank lines keep paragraphs apart.

/// Typographic characters folded to plain ASCII, or dropped when empty.
const FOLDED_CHARS: &[(char, &str)] = &[
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201c}', "\""),
    ('\u{201d}', "\""),
    ('\u{00ab}', "\""),
    ('\u{00bb}', "\""),
    ('\u{2013}', "-"),
    ('\u{2014}', " - "),
    ('\u{2011}', "-"),
    ('\u{2026}', "..."),
    ('\u{00a0}', " "),
    ('\u{200b}', ""),
    ('\u{200c}', ""),
    ('\u{200d}', ""),
    ('\u{feff}', ""),
    ('\u{00ad}', ""), // soft hyphen
];

/// Normalize a document for segmentation.
///
/// - folds typographic quotes and dashes, drops zero-width characters
/// - drops control characters other than newlines
/// - joins wrapped lines within a paragraph and separates paragraphs by a
///   single blank line
/// - collapses runs of spaces and trims every line
pub fn normalize_text(text: &str) -> String {
    let folded = fold_chars(text);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in folded.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
        .iter()
        .map(|p| collapse_spaces(p))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn fold_chars(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for c in text.chars() {
        match FOLDED_CHARS.iter().find(|(ch, _)| *ch == c) {
            Some((_, replacement)) => result.push_str(replacement),
            None if c == '\n' => result.push('\n'),
            None if c == '\t' => result.push(' '),
            None if c.is_control() => {}
            None => result.push(c),
        }
    }

    result
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joins_wrapped_lines() {
        let text = "It was a bright cold day in April,\nand the clocks were striking thirteen.";
        assert_eq!(
            normalize_text(text),
            "It was a bright cold day in April, and the clocks were striking thirteen."
        );
    }

    #[test]
    fn test_keeps_paragraph_breaks() {
        let text = "First paragraph.\n\n\n\nSecond\nparagraph.";
        assert_eq!(normalize_text(text), "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_windows_line_endings() {
        let text = "One line\r\nnext line.\r\n\r\nNew paragraph.";
        assert_eq!(normalize_text(text), "One line next line.\n\nNew paragraph.");
    }

    #[test]
    fn test_folds_typography() {
        let text = "\u{201c}Hello,\u{201d} she said\u{2014}twice. It\u{2019}s fine\u{2026}";
        assert_eq!(
            normalize_text(text),
            "\"Hello,\" she said - twice. It's fine..."
        );
    }

    #[test]
    fn test_drops_control_and_zero_width() {
        let text = "Hello\x00World\u{200b}\x07Test";
        assert_eq!(normalize_text(text), "HelloWorldTest");
    }

    #[test]
    fn test_collapses_spaces() {
        assert_eq!(normalize_text("  a \t  b   c  "), "a b c");
    }

    #[test]
    fn test_blank_document() {
        assert_eq!(normalize_text(" \n \n\t"), "");
    }
}
