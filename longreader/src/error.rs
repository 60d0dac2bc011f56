//! Error types for every stage of a narration run.

use std::fmt;
use std::path::PathBuf;

use llm_client::LlmError;
use thiserror::Error;

use crate::text::ChunkIndex;
use crate::tts::TtsError;

/// Invalid configuration, detected before any pipeline work starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown voice '{voice}'. Valid voices: {valid}")]
    UnknownVoice { voice: String, valid: String },

    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Unsupported output file '{0}'. Use a .m4a, .m4b, .mp4, .mp3 or .wav extension")]
    UnsupportedOutput(PathBuf),
}

/// The input text could not be split into sentences.
#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Input is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("Sentence detector failed to initialize: {0}")]
    Init(String),

    #[error("Sentence detection failed: {0}")]
    Detect(String),
}

/// Pipeline stage that talks to an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rewrite,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Rewrite => write!(f, "rewrite"),
            Stage::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// A fatal failure of the chunk pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Rewrite stage failed for chunk {index}: {source}")]
    Rewrite {
        index: ChunkIndex,
        #[source]
        source: LlmError,
    },

    #[error("Synthesis stage failed for chunk {index}: {source}")]
    Synthesis {
        index: ChunkIndex,
        #[source]
        source: TtsError,
    },

    #[error("Chunk task ended abnormally: {0}")]
    TaskFailed(String),
}

impl PipelineError {
    /// Stage that produced the error, if it came from a service call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Rewrite { .. } => Some(Stage::Rewrite),
            PipelineError::Synthesis { .. } => Some(Stage::Synthesis),
            PipelineError::TaskFailed(_) => None,
        }
    }

    /// Chunk whose processing failed, if known.
    pub fn chunk_index(&self) -> Option<ChunkIndex> {
        match self {
            PipelineError::Rewrite { index, .. } | PipelineError::Synthesis { index, .. } => {
                Some(*index)
            }
            PipelineError::TaskFailed(_) => None,
        }
    }
}

/// Concatenation, time-stretching or encoding failed.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("No audio segments to assemble (the input produced no chunks)")]
    NoAudio,

    #[error("Audio segment {index} has an invalid sample rate of {rate} Hz")]
    InvalidSampleRate { index: usize, rate: u32 },

    #[error("ffmpeg not found at '{0}'. Install ffmpeg or set `ffmpeg` in the config file")]
    FfmpegMissing(PathBuf),

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("Failed to write WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("Failed to persist output to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_reports_stage_and_chunk() {
        let err = PipelineError::Synthesis {
            index: ChunkIndex(2),
            source: TtsError::ServerError {
                status: 500,
                message: "boom".into(),
            },
        };
        assert_eq!(err.stage(), Some(Stage::Synthesis));
        assert_eq!(err.chunk_index(), Some(ChunkIndex(2)));
        let msg = err.to_string();
        assert!(msg.contains("Synthesis"), "{msg}");
        assert!(msg.contains("chunk 2"), "{msg}");
    }

    #[test]
    fn test_task_failure_has_no_stage() {
        let err = PipelineError::TaskFailed("panicked".into());
        assert_eq!(err.stage(), None);
        assert_eq!(err.chunk_index(), None);
    }
}
