//! longreader - Narrate long plain-text documents as a single audio file

mod audio;
mod config;
mod error;
mod pipeline;
mod retry;
mod rewrite;
mod text;
mod tts;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use llm_client::ProviderKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use audio::{Ffmpeg, OutputFormat};
use config::{
    LongreaderConfig, OversizePolicy, RewriteFailurePolicy, RewriteSettings, SegmenterKind,
    SpeechSettings,
};
use error::SegmentationError;
use pipeline::{Orchestrator, ServiceLimits};
use rewrite::{LlmRewriter, Rewriter};
use text::{create_segmenter, prepare_chunks};
use tts::{OpenAiSpeech, TtsBackend, Voice};

#[derive(Parser, Debug)]
#[command(name = "longreader")]
#[command(about = "Narrate long plain-text documents as a single audio file", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the UTF-8 text file
    input: Option<PathBuf>,

    /// Output file: .m4a, .m4b, .mp4, .mp3 or .wav (default: <input>.m4a)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Speech voice (alloy, ash, ballad, coral, echo, fable, nova, onyx, sage, shimmer, verse)
    #[arg(long, env = "LONGREADER_VOICE")]
    voice: Option<String>,

    /// Playback speed multiplier (0.25-4.0)
    #[arg(long, env = "LONGREADER_SPEED")]
    speed: Option<f32>,

    /// Maximum chunk length in characters
    #[arg(long)]
    max_chunk_length: Option<usize>,

    /// Simultaneous rewrite calls
    #[arg(long)]
    rewrite_concurrency: Option<usize>,

    /// Simultaneous speech calls
    #[arg(long)]
    synthesis_concurrency: Option<usize>,

    /// Retries per failing call
    #[arg(long)]
    max_retries: Option<u32>,

    /// Sentence segmenter
    #[arg(long, value_enum)]
    segmenter: Option<SegmenterKind>,

    /// Handling of sentences longer than the chunk limit
    #[arg(long, value_enum)]
    oversize_policy: Option<OversizePolicy>,

    /// Handling of chunks whose rewrite keeps failing
    #[arg(long, value_enum)]
    rewrite_failure: Option<RewriteFailurePolicy>,

    /// Keep the input's line breaks and typography as is
    #[arg(long, default_value_t = false)]
    no_normalize: bool,

    /// Rewrite provider (anthropic, openai, openrouter)
    #[arg(long, env = "LONGREADER_REWRITE_PROVIDER")]
    provider: Option<String>,

    /// Rewrite model
    #[arg(long, env = "LONGREADER_REWRITE_MODEL")]
    model: Option<String>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice {
        /// Voice name
        voice: String,
    },
    /// Set default playback speed
    SetSpeed {
        /// Value (0.25-4.0)
        value: f32,
    },
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    if let Some(Commands::Config { action }) = &args.command {
        return handle_config_command(action);
    }

    let input_path = args
        .input
        .clone()
        .ok_or_else(|| {
            anyhow::anyhow!("Input file path is required. Run 'longreader --help' for usage.")
        })?;

    if !input_path.exists() {
        anyhow::bail!("Input file not found: {}", input_path.display());
    }

    let mut config = LongreaderConfig::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    let pipeline_config = config.validate().context("Invalid configuration")?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| input_path.with_extension("m4a"));
    let format = OutputFormat::from_path(&output_path)?;

    // Pre-flight checks before any paid call.
    let ffmpeg = config
        .ffmpeg
        .clone()
        .map(Ffmpeg::new)
        .unwrap_or_default();
    if format.needs_ffmpeg(pipeline_config.speed) {
        ffmpeg.ensure_available()?;
    }
    let rewriter = build_rewriter(&config.rewrite)?;
    let speech = build_speech(&config.speech)?;
    let document = read_document(&input_path)?;

    if args.debug {
        eprintln!("Input: {}", input_path.display());
        eprintln!("Output: {}", output_path.display());
        eprintln!("Rewrite: {} ({})", rewriter.name(), config.rewrite.model);
        eprintln!("Speech: {} ({})", speech.name(), config.speech.model);
        eprintln!("ffmpeg: {}", ffmpeg.program().display());
        eprintln!("{:#?}", pipeline_config);
    }

    let segmenter = create_segmenter(pipeline_config.segmenter)?;
    let chunks = prepare_chunks(&document, &pipeline_config, segmenter.as_ref())
        .context("Failed to split the input into sentences")?;
    let oversized = chunks
        .iter()
        .filter(|c| c.char_len() > pipeline_config.max_chunk_length)
        .count();
    eprintln!(
        "Chunks: {} (max {} characters), voice {}",
        chunks.len(),
        pipeline_config.max_chunk_length,
        pipeline_config.voice
    );
    if oversized > 0 {
        log::warn!(
            "{} chunk(s) hold a single sentence longer than the chunk limit",
            oversized
        );
    }

    let orchestrator = Orchestrator::new(
        rewriter,
        speech,
        ServiceLimits::from_config(&pipeline_config),
        &pipeline_config,
    );

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let result = orchestrator
        .run(chunks, |progress| {
            pb.set_position(progress.completed as u64);
            pb.set_message(format!("chunk {} of {} done", progress.index, progress.total));
        })
        .await;

    let output = match result {
        Ok(output) => {
            pb.finish_with_message("All chunks synthesized");
            output
        }
        Err(e) => {
            pb.abandon_with_message("Failed");
            if let (Some(stage), Some(index)) = (e.stage(), e.chunk_index()) {
                log::error!("The {} stage failed on chunk {}", stage, index);
            }
            return Err(e).context("Narration failed; no output was written");
        }
    };

    if !output.passed_through.is_empty() {
        let list: Vec<String> = output.passed_through.iter().map(|i| i.to_string()).collect();
        log::warn!(
            "Chunks read from their original text after rewrite failures: {}",
            list.join(", ")
        );
    }

    eprintln!("\nAssembling audio...");
    let report = audio::assemble(
        &output.segments,
        &output_path,
        format,
        pipeline_config.speed,
        &ffmpeg,
    )
    .context("Failed to assemble audio")?;

    let size_mb = report.bytes as f64 / (1024.0 * 1024.0);
    eprintln!(
        "Segments: {} at {} Hz, speech {}, output {} at {}x",
        report.segments,
        report.sample_rate,
        format_duration(report.source_duration.as_secs()),
        format_duration(report.output_duration.as_secs()),
        pipeline_config.speed
    );
    eprintln!("Output: {} ({:.1} MB)", report.path.display(), size_mb);

    Ok(())
}

fn apply_overrides(config: &mut LongreaderConfig, args: &Args) {
    if let Some(voice) = &args.voice {
        config.voice = voice.clone();
    }
    if let Some(speed) = args.speed {
        config.speed = speed;
    }
    if let Some(max) = args.max_chunk_length {
        config.max_chunk_length = max;
    }
    if let Some(n) = args.rewrite_concurrency {
        config.rewrite_concurrency = n;
    }
    if let Some(n) = args.synthesis_concurrency {
        config.synthesis_concurrency = n;
    }
    if let Some(n) = args.max_retries {
        config.max_retries = n;
    }
    if let Some(kind) = args.segmenter {
        config.segmenter = kind;
    }
    if let Some(policy) = args.oversize_policy {
        config.oversize_policy = policy;
    }
    if let Some(policy) = args.rewrite_failure {
        config.rewrite_failure = policy;
    }
    if args.no_normalize {
        config.normalize_text = false;
    }
    if let Some(provider) = &args.provider {
        config.rewrite.provider = provider.clone();
    }
    if let Some(model) = &args.model {
        config.rewrite.model = model.clone();
    }
}

fn build_rewriter(settings: &RewriteSettings) -> Result<Arc<dyn Rewriter>> {
    let kind: ProviderKind = settings.provider.parse()?;
    let api_key = llm_client::resolve_api_key(settings.api_key.as_deref(), kind)?;
    let provider = llm_client::get_provider(
        kind,
        &settings.model,
        api_key,
        settings.base_url.as_deref(),
    )?;
    Ok(Arc::new(LlmRewriter::new(provider)))
}

fn build_speech(settings: &SpeechSettings) -> Result<Arc<dyn TtsBackend>> {
    let api_key = llm_client::resolve_api_key(settings.api_key.as_deref(), ProviderKind::OpenAi)?;
    let backend = OpenAiSpeech::new(&settings.model, api_key);
    Ok(Arc::new(match &settings.base_url {
        Some(url) => backend.with_base_url(url),
        None => backend,
    }))
}

/// Read the input fully; invalid UTF-8 is rejected before any work.
fn read_document(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| SegmentationError::Encoding(e.to_string()))
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok(text)
}

/// Format seconds as H:MM:SS or M:SS.
fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = LongreaderConfig::load()?;
            println!("Configuration file: {:?}", LongreaderConfig::config_path()?);
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
            if let Err(e) = config.validate() {
                println!();
                println!("warning: {}", e);
            }
        }
        ConfigAction::SetVoice { voice } => {
            let voice: Voice = voice.parse()?;
            let mut config = LongreaderConfig::load()?;
            config.voice = voice.to_string();
            config.save()?;
            println!("Default voice set to: {}", voice);
        }
        ConfigAction::SetSpeed { value } => {
            let mut config = LongreaderConfig::load()?;
            config.speed = *value;
            config.validate()?;
            config.save()?;
            println!("Default speed set to: {}", config.speed);
        }
    }
    Ok(())
}
