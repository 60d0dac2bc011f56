//! Sentence segmentation.
//!
//! The default segmenter is the dialog-aware detector from the `seams`
//! library. A punctuation-based splitter is available but is only used when
//! explicitly configured; a failing `seams` detector never falls back to it.

use regex::Regex;
use seams::sentence_detector::dialog_detector::SentenceDetectorDialog;

use super::Sentence;
use crate::config::SegmenterKind;
use crate::error::SegmentationError;

/// Splits text into ordered, trimmed, non-empty sentences.
pub trait SentenceSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Result<Vec<Sentence>, SegmentationError>;

    fn name(&self) -> &'static str;
}

/// Create the configured segmenter.
pub fn create_segmenter(
    kind: SegmenterKind,
) -> Result<Box<dyn SentenceSegmenter>, SegmentationError> {
    match kind {
        SegmenterKind::Seams => Ok(Box::new(SeamsSegmenter::new()?)),
        SegmenterKind::Punctuation => Ok(Box::new(PunctuationSegmenter::new())),
    }
}

/// Dialog-aware segmentation using the seams library.
pub struct SeamsSegmenter {
    detector: SentenceDetectorDialog,
}

impl SeamsSegmenter {
    pub fn new() -> Result<Self, SegmentationError> {
        let detector = SentenceDetectorDialog::new()
            .map_err(|e| SegmentationError::Init(format!("{:?}", e)))?;
        Ok(Self { detector })
    }
}

impl SentenceSegmenter for SeamsSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Sentence>, SegmentationError> {
        let sentences = self
            .detector
            .detect_sentences_borrowed(text)
            .map_err(|e| SegmentationError::Detect(format!("{:?}", e)))?;

        Ok(sentences
            .iter()
            .map(|s| s.normalize())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Sentence::new)
            .collect())
    }

    fn name(&self) -> &'static str {
        "seams"
    }
}

/// Splits after terminal punctuation followed by whitespace, and at blank lines.
pub struct PunctuationSegmenter {
    boundary: Regex,
}

impl PunctuationSegmenter {
    pub fn new() -> Self {
        // Terminal punctuation, optional closing quotes/brackets, then whitespace;
        // or a paragraph break.
        let boundary = Regex::new(r#"[.!?]+["')\]]*\s+|\n\s*\n"#)
            .expect("boundary pattern should be a valid regex");
        Self { boundary }
    }
}

impl Default for PunctuationSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter for PunctuationSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Sentence>, SegmentationError> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in self.boundary.find_iter(text) {
            let end = m.start() + m.as_str().trim_end().len();
            push_trimmed(&mut sentences, &text[start..end]);
            start = m.end();
        }
        push_trimmed(&mut sentences, &text[start..]);

        Ok(sentences)
    }

    fn name(&self) -> &'static str {
        "punctuation"
    }
}

fn push_trimmed(sentences: &mut Vec<Sentence>, span: &str) {
    let span = span.trim();
    if !span.is_empty() {
        sentences.push(Sentence::new(span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(sentences: &[Sentence]) -> Vec<&str> {
        sentences.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_seams_detector_available() {
        assert!(SeamsSegmenter::new().is_ok());
    }

    #[test]
    fn test_seams_splits_sentences() {
        let segmenter = SeamsSegmenter::new().unwrap();
        let sentences = segmenter
            .segment("First sentence. Second sentence.")
            .unwrap();
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].text.contains("First"));
        assert!(sentences[1].text.contains("Second"));
    }

    #[test]
    fn test_punctuation_basic() {
        let segmenter = PunctuationSegmenter::new();
        let sentences = segmenter.segment("A. B. C.").unwrap();
        assert_eq!(texts(&sentences), vec!["A.", "B.", "C."]);
    }

    #[test]
    fn test_punctuation_keeps_closing_quotes() {
        let segmenter = PunctuationSegmenter::new();
        let sentences = segmenter
            .segment("\"Stop!\" he cried. Why? Because (it was late.) Fine")
            .unwrap();
        assert_eq!(
            texts(&sentences),
            vec!["\"Stop!\"", "he cried.", "Why?", "Because (it was late.)", "Fine"]
        );
    }

    #[test]
    fn test_punctuation_paragraph_break() {
        let segmenter = PunctuationSegmenter::new();
        let sentences = segmenter.segment("Title\n\nBody text here.").unwrap();
        assert_eq!(texts(&sentences), vec!["Title", "Body text here."]);
    }

    #[test]
    fn test_punctuation_preserves_words() {
        let segmenter = PunctuationSegmenter::new();
        let text = "One two. Three four!  Five six?\nSeven";
        let sentences = segmenter.segment(text).unwrap();
        let rejoined: Vec<&str> = sentences
            .iter()
            .flat_map(|s| s.text.split_whitespace())
            .collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_empty_text() {
        let segmenter = PunctuationSegmenter::new();
        assert!(segmenter.segment("").unwrap().is_empty());
    }
}
