//! Decoded audio and final file assembly.

pub mod assembler;
pub mod ffmpeg;

use std::time::Duration;

pub use assembler::{AssemblyReport, OutputFormat, assemble};
pub use ffmpeg::Ffmpeg;

/// Mono 16-bit PCM samples at a fixed sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl AudioSegment {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let segment = AudioSegment::new(24_000, vec![0; 36_000]);
        assert_eq!(segment.duration(), Duration::from_millis(1500));
        assert_eq!(AudioSegment::new(0, vec![1]).duration(), Duration::ZERO);
    }
}
