//! Text processing: normalization, sentence segmentation and chunking.

pub mod chunker;
mod normalize;
pub mod segmenter;

use std::fmt;
use std::ops::Range;

pub use chunker::chunk_sentences;
pub use normalize::normalize_text;
pub use segmenter::{SentenceSegmenter, create_segmenter};

use crate::config::PipelineConfig;
use crate::error::SegmentationError;

/// Position of a chunk in the original document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkIndex(pub usize);

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single sentence, trimmed of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub text: String,
}

impl Sentence {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Length in characters, the unit used for chunk budgets.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A group of consecutive sentences sent through the services as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: ChunkIndex,
    /// Sentences of the segmented document covered by this chunk
    pub sentences: Range<usize>,
    /// Sentence texts joined by single spaces
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Normalize, segment and chunk a document.
pub fn prepare_chunks(
    document: &str,
    config: &PipelineConfig,
    segmenter: &dyn SentenceSegmenter,
) -> Result<Vec<Chunk>, SegmentationError> {
    let normalized;
    let text = if config.normalize_text {
        normalized = normalize_text(document);
        normalized.as_str()
    } else {
        document
    };

    let sentences = segmenter.segment(text)?;
    log::debug!(
        "{} segmenter produced {} sentences",
        segmenter.name(),
        sentences.len()
    );

    let chunks = chunk_sentences(&sentences, config.max_chunk_length, config.oversize_policy);
    for chunk in &chunks {
        log::debug!(
            "Chunk {} covers sentences {:?} ({} characters)",
            chunk.index,
            chunk.sentences,
            chunk.char_len()
        );
    }
    Ok(chunks)
}
