//! Audio file assembly.
//!
//! Segments are concatenated in chunk order into one PCM stream, optionally
//! time-stretched, and encoded. The output is staged in a temporary file next
//! to the destination and renamed into place only once encoding succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info, warn};
use rubato::{FftFixedIn, Resampler};
use tempfile::{Builder, TempDir};

use super::AudioSegment;
use super::ffmpeg::{Ffmpeg, is_unit_speed};
use crate::error::{AssemblyError, ConfigError};

/// Container chosen from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// AAC in MP4 (.m4a, .m4b, .mp4)
    Mp4,
    Mp3,
    /// 16-bit PCM WAV
    Wav,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("m4a" | "m4b" | "mp4") => Ok(OutputFormat::Mp4),
            Some("mp3") => Ok(OutputFormat::Mp3),
            Some("wav") => Ok(OutputFormat::Wav),
            _ => Err(ConfigError::UnsupportedOutput(path.to_path_buf())),
        }
    }

    /// Whether producing this format at `speed` needs ffmpeg.
    pub fn needs_ffmpeg(&self, speed: f32) -> bool {
        !(*self == OutputFormat::Wav && is_unit_speed(speed))
    }
}

/// Summary of a finished assembly.
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub path: PathBuf,
    pub segments: usize,
    pub sample_rate: u32,
    /// Length of the concatenated speech before time-stretching
    pub source_duration: Duration,
    pub output_duration: Duration,
    pub bytes: u64,
}

/// Inputs shorter than this are resampled linearly.
const MIN_SINC_INPUT: usize = 64;
const RESAMPLE_CHUNK: usize = 1024;

/// Resample 16-bit samples from one rate to another.
///
/// Uses rubato's FFT resampler, whose anti-aliasing filter removes content
/// above the target Nyquist frequency. Very short inputs, or a resampler that
/// cannot be built for the rate pair, use linear interpolation instead.
pub fn resample(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    if samples.len() < MIN_SINC_INPUT {
        return resample_linear(samples, from, to);
    }

    match resample_fft(samples, from, to) {
        Ok(resampled) => resampled,
        Err(e) => {
            warn!(
                "FFT resampling {} Hz -> {} Hz failed: {}. Using linear interpolation",
                from, to, e
            );
            resample_linear(samples, from, to)
        }
    }
}

fn resampled_len(len: usize, from: u32, to: u32) -> usize {
    ((len as u64 * to as u64 + from as u64 / 2) / from as u64).max(1) as usize
}

fn resample_fft(
    samples: &[i16],
    from: u32,
    to: u32,
) -> Result<Vec<i16>, Box<dyn std::error::Error>> {
    let input: Vec<f64> = samples.iter().map(|&s| s as f64 / 32768.0).collect();
    let mut resampler = FftFixedIn::<f64>::new(
        from as usize,
        to as usize,
        input.len().min(RESAMPLE_CHUNK),
        2, // sub_chunks
        1, // channels
    )?;

    let expected = resampled_len(input.len(), from, to);
    let delay = resampler.output_delay();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay);

    let mut pos = 0;
    while input.len() - pos >= resampler.input_frames_next() {
        let next = resampler.input_frames_next();
        let block: &[&[f64]] = &[&input[pos..pos + next]];
        let frames = resampler.process(block, None)?;
        output.extend_from_slice(&frames[0]);
        pos += next;
    }
    if pos < input.len() {
        let tail: &[&[f64]] = &[&input[pos..]];
        let frames = resampler.process_partial(Some(tail), None)?;
        output.extend_from_slice(&frames[0]);
    }
    // Flush the filter tail so the delayed end of the signal comes out.
    while output.len() < expected + delay {
        let frames = resampler.process_partial(None::<&[Vec<f64>]>, None)?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| (s * 32768.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
        .collect())
}

/// Linearly resample 16-bit samples from one rate to another.
fn resample_linear(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }

    let len = samples.len();
    let out_len = resampled_len(len, from, to);
    let step = from as f64 / to as f64;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(len - 1);
            let next = (idx + 1).min(len - 1);
            let frac = pos - idx as f64;
            let a = samples[idx] as f64;
            let b = samples[next] as f64;
            (a + (b - a) * frac)
                .round()
                .clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// Concatenate segments in order at the first segment's sample rate.
pub fn concatenate(segments: &[AudioSegment]) -> Result<AudioSegment, AssemblyError> {
    let first = segments.first().ok_or(AssemblyError::NoAudio)?;

    if let Some((index, bad)) = segments
        .iter()
        .enumerate()
        .find(|(_, s)| s.sample_rate == 0)
    {
        return Err(AssemblyError::InvalidSampleRate {
            index,
            rate: bad.sample_rate,
        });
    }

    let rate = first.sample_rate;
    let mut samples = Vec::with_capacity(segments.iter().map(|s| s.samples.len()).sum());

    for (index, segment) in segments.iter().enumerate() {
        if segment.sample_rate == rate {
            samples.extend_from_slice(&segment.samples);
        } else {
            debug!(
                "Resampling segment {} from {} Hz to {} Hz",
                index, segment.sample_rate, rate
            );
            samples.extend(resample(&segment.samples, segment.sample_rate, rate));
        }
    }

    Ok(AudioSegment::new(rate, samples))
}

fn write_wav(path: &Path, audio: &AudioSegment) -> Result<(), AssemblyError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &audio.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Assemble ordered segments into the output file.
///
/// Nothing is written when `segments` is empty, and a failure at any step
/// leaves no file at `output`.
pub fn assemble(
    segments: &[AudioSegment],
    output: &Path,
    format: OutputFormat,
    speed: f32,
    ffmpeg: &Ffmpeg,
) -> Result<AssemblyReport, AssemblyError> {
    let audio = concatenate(segments)?;
    let source_duration = audio.duration();
    info!(
        "Concatenated {} segments ({:.1}s at {} Hz)",
        segments.len(),
        source_duration.as_secs_f32(),
        audio.sample_rate
    );

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let suffix = output
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    // Removed on drop unless persisted.
    let staged = Builder::new()
        .prefix(".longreader-")
        .suffix(&suffix)
        .tempfile_in(dir)?;

    if format.needs_ffmpeg(speed) {
        let work = TempDir::new()?;
        let combined = work.path().join("combined.wav");
        write_wav(&combined, &audio)?;
        ffmpeg.encode(&combined, staged.path(), format, speed)?;
    } else {
        write_wav(staged.path(), &audio)?;
    }

    staged
        .persist(output)
        .map_err(|e| AssemblyError::Persist {
            path: output.to_path_buf(),
            source: e.error,
        })?;

    let bytes = fs::metadata(output)?.len();
    let output_duration = if is_unit_speed(speed) {
        source_duration
    } else {
        source_duration.div_f32(speed)
    };

    Ok(AssemblyReport {
        path: output.to_path_buf(),
        segments: segments.len(),
        sample_rate: audio.sample_rate,
        source_duration,
        output_duration,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("a.m4a")).unwrap(), OutputFormat::Mp4);
        assert_eq!(OutputFormat::from_path(Path::new("a.M4B")).unwrap(), OutputFormat::Mp4);
        assert_eq!(OutputFormat::from_path(Path::new("a.mp3")).unwrap(), OutputFormat::Mp3);
        assert_eq!(OutputFormat::from_path(Path::new("dir/a.wav")).unwrap(), OutputFormat::Wav);
        assert!(matches!(
            OutputFormat::from_path(Path::new("a.ogg")),
            Err(ConfigError::UnsupportedOutput(_))
        ));
        assert!(OutputFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_needs_ffmpeg() {
        assert!(!OutputFormat::Wav.needs_ffmpeg(1.0));
        assert!(OutputFormat::Wav.needs_ffmpeg(1.5));
        assert!(OutputFormat::Mp4.needs_ffmpeg(1.0));
    }

    #[test]
    fn test_concatenate_in_order() {
        let segments = vec![
            AudioSegment::new(24_000, vec![1, 2]),
            AudioSegment::new(24_000, vec![3]),
            AudioSegment::new(24_000, vec![4, 5, 6]),
        ];
        let audio = concatenate(&segments).unwrap();
        assert_eq!(audio.sample_rate, 24_000);
        assert_eq!(audio.samples, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_concatenate_resamples_to_first_rate() {
        let segments = vec![
            AudioSegment::new(24_000, vec![0; 240]),
            AudioSegment::new(12_000, vec![1000; 2400]),
        ];
        let audio = concatenate(&segments).unwrap();
        assert_eq!(audio.samples.len(), 240 + 4800);
        // Away from the segment edges the level is unchanged.
        assert!(
            audio.samples[240 + 1200..240 + 3600]
                .iter()
                .all(|&s| (s - 1000).abs() <= 10)
        );
    }

    fn sine(freq: f64, rate: u32, len: usize, amplitude: f64) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / rate as f64;
                (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()).round() as i16
            })
            .collect()
    }

    fn rms(samples: &[i16]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    #[test]
    fn test_resample_removes_content_above_target_nyquist() {
        let input = sine(18_000.0, 48_000, 4800, 10_000.0);
        assert!(rms(&input) > 7000.0);

        let output = resample(&input, 48_000, 24_000);
        assert_eq!(output.len(), 2400);
        let level = rms(&output[200..2200]);
        assert!(level < 1000.0, "aliased energy survived resampling: rms {level}");
    }

    #[test]
    fn test_resample_keeps_content_below_target_nyquist() {
        let input = sine(1_000.0, 48_000, 4800, 10_000.0);
        let output = resample(&input, 48_000, 24_000);
        assert_eq!(output.len(), 2400);
        let level = rms(&output[200..2200]);
        assert!((level - 7071.0).abs() < 500.0, "tone lost in resampling: rms {level}");
    }

    #[test]
    fn test_resample_short_input_is_linear() {
        assert_eq!(resample(&[0, 100], 1, 2), vec![0, 50, 100, 100]);
        assert_eq!(resample(&[7, 8], 16_000, 16_000), vec![7, 8]);
        assert!(resample(&[], 48_000, 24_000).is_empty());
    }

    #[test]
    fn test_concatenate_rejects_zero_rate() {
        let segments = vec![
            AudioSegment::new(24_000, vec![0]),
            AudioSegment::new(0, vec![0]),
        ];
        assert!(matches!(
            concatenate(&segments),
            Err(AssemblyError::InvalidSampleRate { index: 1, rate: 0 })
        ));
    }

    #[test]
    fn test_resample_linear_interpolates() {
        assert_eq!(resample_linear(&[0, 100], 1, 2), vec![0, 50, 100, 100]);
        assert_eq!(resample_linear(&[0, 10, 20, 30], 2, 1), vec![0, 20]);
        assert_eq!(resample_linear(&[7, 8], 16_000, 16_000), vec![7, 8]);
    }

    #[test]
    fn test_empty_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.wav");
        let err = assemble(&[], &output, OutputFormat::Wav, 1.0, &Ffmpeg::default()).unwrap_err();
        assert!(matches!(err, AssemblyError::NoAudio));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_wav_written_directly() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.wav");
        let segments = vec![
            AudioSegment::new(24_000, vec![1, -1, 300]),
            AudioSegment::new(24_000, vec![i16::MAX, i16::MIN]),
        ];
        // An unusable ffmpeg proves the direct path does not need it.
        let ffmpeg = Ffmpeg::new("/nonexistent/ffmpeg-for-tests");

        let report = assemble(&segments, &output, OutputFormat::Wav, 1.0, &ffmpeg).unwrap();
        assert_eq!(report.segments, 2);
        assert_eq!(report.sample_rate, 24_000);
        assert_eq!(report.bytes, fs::metadata(&output).unwrap().len());
        assert_eq!(dir_entries(dir.path()), vec![output.clone()]);

        let mut reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 24_000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -1, 300, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_failed_encode_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.m4a");
        let segments = vec![AudioSegment::new(24_000, vec![0; 100])];
        let ffmpeg = Ffmpeg::new("/nonexistent/ffmpeg-for-tests");

        let err = assemble(&segments, &output, OutputFormat::Mp4, 1.0, &ffmpeg).unwrap_err();
        assert!(matches!(err, AssemblyError::FfmpegMissing(_)));
        assert!(!output.exists());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_wav_time_stretched_through_ffmpeg() {
        let ffmpeg = Ffmpeg::default();
        if !ffmpeg.is_available() {
            eprintln!("ffmpeg not installed, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.wav");
        let segments = vec![
            AudioSegment::new(24_000, sine(440.0, 24_000, 24_000, 8_000.0)),
            AudioSegment::new(24_000, sine(660.0, 24_000, 24_000, 8_000.0)),
        ];

        let report = assemble(&segments, &output, OutputFormat::Wav, 2.0, &ffmpeg).unwrap();
        assert_eq!(report.source_duration, Duration::from_secs(2));
        assert_eq!(report.output_duration, Duration::from_secs(1));
        assert_eq!(dir_entries(dir.path()), vec![output.clone()]);

        let reader = hound::WavReader::open(&output).unwrap();
        let spec = reader.spec();
        let seconds = reader.duration() as f64 / spec.sample_rate as f64;
        assert!((seconds - 1.0).abs() < 0.1, "stretched to {seconds}s");
    }

    #[test]
    fn test_near_unit_speed_reports_source_duration() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.wav");
        let segments = vec![AudioSegment::new(24_000, vec![0; 24_000])];
        let ffmpeg = Ffmpeg::new("/nonexistent/ffmpeg-for-tests");

        let report = assemble(&segments, &output, OutputFormat::Wav, 1.0004, &ffmpeg).unwrap();
        assert_eq!(report.output_duration, report.source_duration);
        assert_eq!(report.output_duration, Duration::from_secs(1));
    }

    #[test]
    fn test_replaces_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.wav");
        fs::write(&output, b"old").unwrap();

        let segments = vec![AudioSegment::new(8_000, vec![5; 10])];
        assemble(&segments, &output, OutputFormat::Wav, 1.0, &Ffmpeg::default()).unwrap();

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.len(), 10);
    }
}
