//! TTS backend trait and types.

pub mod openai;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::audio::AudioSegment;
use crate::error::ConfigError;

pub use openai::OpenAiSpeech;

/// Voices offered by the speech service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Fable,
    Nova,
    Onyx,
    Sage,
    Shimmer,
    Verse,
}

impl Voice {
    pub const ALL: [Voice; 11] = [
        Voice::Alloy,
        Voice::Ash,
        Voice::Ballad,
        Voice::Coral,
        Voice::Echo,
        Voice::Fable,
        Voice::Nova,
        Voice::Onyx,
        Voice::Sage,
        Voice::Shimmer,
        Voice::Verse,
    ];

    /// Identifier sent to the speech service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Ash => "ash",
            Voice::Ballad => "ballad",
            Voice::Coral => "coral",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Nova => "nova",
            Voice::Onyx => "onyx",
            Voice::Sage => "sage",
            Voice::Shimmer => "shimmer",
            Voice::Verse => "verse",
        }
    }

    fn valid_list() -> String {
        Voice::ALL
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Voice::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownVoice {
                voice: s.to_string(),
                valid: Voice::valid_list(),
            })
    }
}

/// Speech synthesis failures.
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("Rate limit exceeded{}", .retry_after.map(|s| format!(". Retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("Speech server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Speech API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("No response within {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Input of {len} characters exceeds the {max} character limit")]
    InputTooLong { len: usize, max: usize },

    #[error("Invalid audio in response: {0}")]
    InvalidAudio(String),

    #[error("Speech service unavailable: {0}")]
    Unavailable(String),
}

impl TtsError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TtsError::RateLimited { .. }
            | TtsError::ServerError { .. }
            | TtsError::Transport(_)
            | TtsError::Timeout(_) => true,
            TtsError::Api { status, .. } => *status == 408,
            TtsError::InputTooLong { .. }
            | TtsError::InvalidAudio(_)
            | TtsError::Unavailable(_) => false,
        }
    }

    /// Delay requested by the server before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TtsError::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// TTS backend trait - all speech services implement this.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize text into a decoded audio segment.
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<AudioSegment, TtsError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_parse() {
        assert_eq!("alloy".parse::<Voice>().unwrap(), Voice::Alloy);
        assert_eq!(" Shimmer ".parse::<Voice>().unwrap(), Voice::Shimmer);
        for voice in Voice::ALL {
            assert_eq!(voice.as_str().parse::<Voice>().unwrap(), voice);
        }
    }

    #[test]
    fn test_unknown_voice_lists_valid_ones() {
        let err = "bob".parse::<Voice>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'bob'"), "{msg}");
        assert!(msg.contains("alloy, ash, ballad"), "{msg}");
    }

    #[test]
    fn test_transient_classification() {
        assert!(TtsError::RateLimited { retry_after: None }.is_transient());
        assert!(
            TtsError::ServerError {
                status: 502,
                message: String::new()
            }
            .is_transient()
        );
        assert!(TtsError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(
            !TtsError::Api {
                status: 401,
                message: "bad key".into()
            }
            .is_transient()
        );
        assert!(!TtsError::InputTooLong { len: 5000, max: 4096 }.is_transient());
    }
}
