//! Encoding and time-stretching through the ffmpeg binary.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::assembler::OutputFormat;
use crate::error::AssemblyError;

/// Range of a single `atempo` filter stage.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Speeds this close to 1.0 are treated as no change.
const UNIT_SPEED_EPSILON: f32 = 1e-3;

pub fn is_unit_speed(speed: f32) -> bool {
    (speed - 1.0).abs() < UNIT_SPEED_EPSILON
}

/// Build an `atempo` filter chain for a tempo multiplier.
///
/// A single stage only accepts factors in [0.5, 2.0], so larger changes are
/// expressed as a product of stages. Returns `None` at unit speed.
pub fn tempo_filter(speed: f32) -> Option<String> {
    if is_unit_speed(speed) {
        return None;
    }

    let mut remaining = speed as f64;
    let mut stages = Vec::new();
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);

    Some(
        stages
            .iter()
            .map(|factor| format!("atempo={}", factor))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn codec_args(format: OutputFormat) -> &'static [&'static str] {
    match format {
        OutputFormat::Mp4 => &["-c:a", "aac", "-b:a", "128k", "-f", "mp4"],
        OutputFormat::Mp3 => &["-c:a", "libmp3lame", "-b:a", "128k", "-f", "mp3"],
        OutputFormat::Wav => &["-c:a", "pcm_s16le", "-f", "wav"],
    }
}

/// Handle to an ffmpeg executable.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Check if ffmpeg runs at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn ensure_available(&self) -> Result<(), AssemblyError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(AssemblyError::FfmpegMissing(self.program.clone()))
        }
    }

    /// Encode `input` into `output`, applying the tempo change if any.
    pub fn encode(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
        speed: f32,
    ) -> Result<(), AssemblyError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input);

        if let Some(filter) = tempo_filter(speed) {
            log::debug!("Applying tempo filter {}", filter);
            cmd.args(["-filter:a", &filter]);
        }

        cmd.args(codec_args(format)).arg(output);

        let result = cmd.output().map_err(|e| match e.kind() {
            ErrorKind::NotFound => AssemblyError::FfmpegMissing(self.program.clone()),
            _ => AssemblyError::Io(e),
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AssemblyError::Ffmpeg(stderr.trim().to_string()));
        }

        Ok(())
    }
}
