//! longreader configuration management.
//!
//! Values come from `~/.config/cli-programs/longreader.toml` (or the
//! platform config directory), are overridden by command-line flags, and are
//! finally checked by [`LongreaderConfig::validate`] before any work starts.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::text::chunker::DEFAULT_MAX_CHUNK_LENGTH;
use crate::tts::Voice;
use crate::tts::openai::MAX_INPUT_CHARS;

const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_CONCURRENCY: usize = 3;
const DEFAULT_SPEED: f32 = 1.0;
const MIN_SPEED: f32 = 0.25;
const MAX_SPEED: f32 = 4.0;
const MAX_CONCURRENCY: usize = 64;

const DEFAULT_REWRITE_PROVIDER: &str = "anthropic";
const DEFAULT_REWRITE_MODEL: &str = "claude-3-5-sonnet-20240620";
const DEFAULT_SPEECH_MODEL: &str = "tts-1-hd";

/// Sentence segmentation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SegmenterKind {
    #[default]
    Seams,
    Punctuation,
}

/// What to do with a single sentence longer than the chunk budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OversizePolicy {
    /// Keep the sentence whole as its own oversized chunk
    #[default]
    Isolate,
    /// Break it at clause, then word boundaries
    Split,
}

/// What to do when a chunk's rewrite fails after all retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteFailurePolicy {
    /// Fail the whole run
    #[default]
    Fail,
    /// Synthesize the original chunk text instead
    PassThrough,
}

/// Text-rewriting service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteSettings {
    /// anthropic, openai or openrouter
    #[serde(default = "default_rewrite_provider")]
    pub provider: String,

    #[serde(default = "default_rewrite_model")]
    pub model: String,

    /// API key (falls back to the provider's environment variable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            provider: default_rewrite_provider(),
            model: default_rewrite_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Speech service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    #[serde(default = "default_speech_model")]
    pub model: String,

    /// API key (falls back to OPENAI_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            model: default_speech_model(),
            api_key: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongreaderConfig {
    /// Speech voice (alloy, ash, ballad, coral, echo, fable, nova, onyx,
    /// sage, shimmer, verse)
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Maximum chunk length in characters
    #[serde(default = "default_max_chunk_length")]
    pub max_chunk_length: usize,

    /// Simultaneous calls to the rewrite service
    #[serde(default = "default_concurrency")]
    pub rewrite_concurrency: usize,

    /// Simultaneous calls to the speech service
    #[serde(default = "default_concurrency")]
    pub synthesis_concurrency: usize,

    /// Playback speed multiplier (0.25-4.0)
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Retries after the first attempt of a failing call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_rewrite_timeout_secs")]
    pub rewrite_timeout_secs: u64,

    #[serde(default = "default_synthesis_timeout_secs")]
    pub synthesis_timeout_secs: u64,

    /// Delay between starting consecutive chunk tasks
    #[serde(default = "default_launch_interval_ms")]
    pub launch_interval_ms: u64,

    #[serde(default)]
    pub segmenter: SegmenterKind,

    #[serde(default)]
    pub oversize_policy: OversizePolicy,

    #[serde(default)]
    pub rewrite_failure: RewriteFailurePolicy,

    /// Unwrap hard-wrapped lines and fold typography before segmentation
    #[serde(default = "default_true")]
    pub normalize_text: bool,

    #[serde(default)]
    pub rewrite: RewriteSettings,

    #[serde(default)]
    pub speech: SpeechSettings,

    /// ffmpeg executable (default: `ffmpeg` on PATH)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<PathBuf>,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_max_chunk_length() -> usize {
    DEFAULT_MAX_CHUNK_LENGTH
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_speed() -> f32 {
    DEFAULT_SPEED
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_rewrite_timeout_secs() -> u64 {
    60
}

fn default_synthesis_timeout_secs() -> u64 {
    120
}

fn default_launch_interval_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

fn default_rewrite_provider() -> String {
    DEFAULT_REWRITE_PROVIDER.to_string()
}

fn default_rewrite_model() -> String {
    DEFAULT_REWRITE_MODEL.to_string()
}

fn default_speech_model() -> String {
    DEFAULT_SPEECH_MODEL.to_string()
}

impl Default for LongreaderConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            max_chunk_length: default_max_chunk_length(),
            rewrite_concurrency: default_concurrency(),
            synthesis_concurrency: default_concurrency(),
            speed: default_speed(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            rewrite_timeout_secs: default_rewrite_timeout_secs(),
            synthesis_timeout_secs: default_synthesis_timeout_secs(),
            launch_interval_ms: default_launch_interval_ms(),
            segmenter: SegmenterKind::default(),
            oversize_policy: OversizePolicy::default(),
            rewrite_failure: RewriteFailurePolicy::default(),
            normalize_text: true,
            rewrite: RewriteSettings::default(),
            speech: SpeechSettings::default(),
            ffmpeg: None,
        }
    }
}

/// Validated settings that drive a single run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub voice: Voice,
    pub max_chunk_length: usize,
    pub rewrite_concurrency: usize,
    pub synthesis_concurrency: usize,
    pub speed: f32,
    pub retry: RetryPolicy,
    pub rewrite_timeout: Duration,
    pub synthesis_timeout: Duration,
    pub launch_interval: Duration,
    pub segmenter: SegmenterKind,
    pub oversize_policy: OversizePolicy,
    pub rewrite_failure: RewriteFailurePolicy,
    pub normalize_text: bool,
}

impl LongreaderConfig {
    /// Get the config file path: ~/.config/cli-programs/longreader.toml
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Could not determine the config directory")?;
        Ok(dir.join("cli-programs").join("longreader.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: LongreaderConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Range-check every setting and build the run configuration.
    pub fn validate(&self) -> Result<PipelineConfig, ConfigError> {
        let voice: Voice = self.voice.parse()?;

        at_least_one("max_chunk_length", self.max_chunk_length as u64)?;
        at_least_one("rewrite_concurrency", self.rewrite_concurrency as u64)?;
        at_least_one("synthesis_concurrency", self.synthesis_concurrency as u64)?;
        at_least_one("initial_backoff_ms", self.initial_backoff_ms)?;
        at_least_one("rewrite_timeout_secs", self.rewrite_timeout_secs)?;
        at_least_one("synthesis_timeout_secs", self.synthesis_timeout_secs)?;

        // A longer chunk would fail synthesis only after its rewrite was paid for.
        at_most(
            "max_chunk_length",
            self.max_chunk_length,
            MAX_INPUT_CHARS,
            "at most 4096, the speech input limit",
        )?;
        at_most(
            "rewrite_concurrency",
            self.rewrite_concurrency,
            MAX_CONCURRENCY,
            "at most 64",
        )?;
        at_most(
            "synthesis_concurrency",
            self.synthesis_concurrency,
            MAX_CONCURRENCY,
            "at most 64",
        )?;

        if !self.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ConfigError::OutOfRange {
                field: "speed",
                expected: "between 0.25 and 4.0",
                value: self.speed.to_string(),
            });
        }

        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::OutOfRange {
                field: "max_backoff_ms",
                expected: "at least initial_backoff_ms",
                value: self.max_backoff_ms.to_string(),
            });
        }

        Ok(PipelineConfig {
            voice,
            max_chunk_length: self.max_chunk_length,
            rewrite_concurrency: self.rewrite_concurrency,
            synthesis_concurrency: self.synthesis_concurrency,
            speed: self.speed,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
            },
            rewrite_timeout: Duration::from_secs(self.rewrite_timeout_secs),
            synthesis_timeout: Duration::from_secs(self.synthesis_timeout_secs),
            launch_interval: Duration::from_millis(self.launch_interval_ms),
            segmenter: self.segmenter,
            oversize_policy: self.oversize_policy,
            rewrite_failure: self.rewrite_failure,
            normalize_text: self.normalize_text,
        })
    }
}

fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            field,
            expected: "at least 1",
            value: value.to_string(),
        });
    }
    Ok(())
}

fn at_most(
    field: &'static str,
    value: usize,
    max: usize,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::OutOfRange {
            field,
            expected,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LongreaderConfig::default();
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.max_chunk_length, 4096);
        assert_eq!(config.rewrite_concurrency, 3);
        assert_eq!(config.synthesis_concurrency, 3);
        assert_eq!(config.speed, 1.0);
        assert_eq!(config.segmenter, SegmenterKind::Seams);
        assert_eq!(config.oversize_policy, OversizePolicy::Isolate);
        assert_eq!(config.rewrite_failure, RewriteFailurePolicy::Fail);
        assert!(config.normalize_text);
        assert!(config.ffmpeg.is_none());
    }

    #[test]
    fn test_config_path() {
        let path = LongreaderConfig::config_path();
        assert!(path.is_ok());
        let path = path.unwrap();
        assert!(path.ends_with("cli-programs/longreader.toml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
voice = "nova"
max_chunk_length = 2000
synthesis_concurrency = 5
speed = 1.25
oversize_policy = "split"
rewrite_failure = "pass-through"
segmenter = "punctuation"
ffmpeg = "/opt/bin/ffmpeg"

[rewrite]
provider = "openrouter"
model = "anthropic/claude-3.5-sonnet"

[speech]
model = "tts-1"
"#;
        let config: LongreaderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.voice, "nova");
        assert_eq!(config.max_chunk_length, 2000);
        assert_eq!(config.rewrite_concurrency, 3);
        assert_eq!(config.synthesis_concurrency, 5);
        assert_eq!(config.speed, 1.25);
        assert_eq!(config.oversize_policy, OversizePolicy::Split);
        assert_eq!(config.rewrite_failure, RewriteFailurePolicy::PassThrough);
        assert_eq!(config.segmenter, SegmenterKind::Punctuation);
        assert_eq!(config.ffmpeg, Some(PathBuf::from("/opt/bin/ffmpeg")));
        assert_eq!(config.rewrite.provider, "openrouter");
        assert_eq!(config.speech.model, "tts-1");
        assert!(config.speech.api_key.is_none());
    }

    #[test]
    fn test_parse_empty_config() {
        let config: LongreaderConfig = toml::from_str("").unwrap();
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.rewrite.model, DEFAULT_REWRITE_MODEL);
        assert_eq!(config.speech.model, "tts-1-hd");
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = LongreaderConfig::default();
        config.voice = "sage".into();
        config.rewrite_failure = RewriteFailurePolicy::PassThrough;
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("rewrite_failure = \"pass-through\""), "{text}");
        let parsed: LongreaderConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.voice, "sage");
        assert_eq!(parsed.rewrite_failure, RewriteFailurePolicy::PassThrough);
    }

    #[test]
    fn test_validate_defaults() {
        let pipeline = LongreaderConfig::default().validate().unwrap();
        assert_eq!(pipeline.voice, Voice::Alloy);
        assert_eq!(pipeline.retry.max_retries, 3);
        assert_eq!(pipeline.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(pipeline.retry.max_backoff, Duration::from_secs(30));
        assert_eq!(pipeline.rewrite_timeout, Duration::from_secs(60));
        assert_eq!(pipeline.launch_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_unknown_voice() {
        let mut config = LongreaderConfig::default();
        config.voice = "robot".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVoice { .. }));
        assert!(err.to_string().contains("shimmer"));
    }

    #[test]
    fn test_validate_rejects_bad_speed() {
        for speed in [0.0, 0.1, 4.5, f32::NAN, f32::INFINITY] {
            let mut config = LongreaderConfig::default();
            config.speed = speed;
            assert!(
                matches!(config.validate(), Err(ConfigError::OutOfRange { field: "speed", .. })),
                "speed {speed} accepted"
            );
        }

        let mut config = LongreaderConfig::default();
        config.speed = 4.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = LongreaderConfig::default();
        config.synthesis_concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "synthesis_concurrency", .. })
        ));

        let mut config = LongreaderConfig::default();
        config.max_chunk_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_limits() {
        let mut config = LongreaderConfig::default();
        config.max_chunk_length = MAX_INPUT_CHARS;
        assert!(config.validate().is_ok());
        config.max_chunk_length = MAX_INPUT_CHARS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "max_chunk_length", .. })
        ));

        let mut config = LongreaderConfig::default();
        config.rewrite_concurrency = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "rewrite_concurrency", .. })
        ));

        let mut config = LongreaderConfig::default();
        config.synthesis_concurrency = MAX_CONCURRENCY + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "synthesis_concurrency", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = LongreaderConfig::default();
        config.initial_backoff_ms = 5000;
        config.max_backoff_ms = 1000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "max_backoff_ms", .. })
        ));
    }
}
