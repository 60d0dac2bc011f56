//! Concurrent rewrite and synthesis of chunks.
//!
//! Every chunk runs as its own task: rewrite, then synthesize. Calls to each
//! service are bounded by a semaphore shared across all tasks, and a permit
//! is held only for one call attempt, never across a backoff sleep. Results
//! land in a slot per chunk so output order never depends on completion
//! order. The first fatal error aborts every outstanding task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use llm_client::LlmError;
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::audio::AudioSegment;
use crate::config::{PipelineConfig, RewriteFailurePolicy};
use crate::error::PipelineError;
use crate::retry::{RetryPolicy, Transient};
use crate::rewrite::Rewriter;
use crate::text::{Chunk, ChunkIndex};
use crate::tts::{TtsBackend, TtsError, Voice};

/// Concurrency budgets for the two external services.
///
/// Clones share the same budgets, so several runs driven with one
/// `ServiceLimits` never exceed them together.
#[derive(Debug, Clone)]
pub struct ServiceLimits {
    rewrite: Arc<Semaphore>,
    synthesis: Arc<Semaphore>,
}

impl ServiceLimits {
    pub fn new(rewrite: usize, synthesis: usize) -> Self {
        Self {
            rewrite: Arc::new(Semaphore::new(rewrite.min(Semaphore::MAX_PERMITS))),
            synthesis: Arc::new(Semaphore::new(synthesis.min(Semaphore::MAX_PERMITS))),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.rewrite_concurrency, config.synthesis_concurrency)
    }
}

/// Reported after each chunk finishes both stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineProgress {
    pub index: ChunkIndex,
    pub completed: usize,
    pub total: usize,
}

/// Audio for every chunk, in chunk order.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub segments: Vec<AudioSegment>,
    /// Chunks synthesized from their original text after a failed rewrite
    pub passed_through: Vec<ChunkIndex>,
}

struct ChunkOutput {
    audio: AudioSegment,
    passed_through: bool,
}

/// Everything a chunk task needs, shared by all tasks of a run.
struct Stages {
    rewriter: Arc<dyn Rewriter>,
    tts: Arc<dyn TtsBackend>,
    limits: ServiceLimits,
    voice: Voice,
    retry: RetryPolicy,
    rewrite_timeout: Duration,
    synthesis_timeout: Duration,
    rewrite_failure: RewriteFailurePolicy,
}

/// Hold one unit of `semaphore` for a single attempt of `call`.
async fn limited<T, E, Fut>(semaphore: &Semaphore, timeout: Duration, call: Fut) -> Result<T, E>
where
    E: Transient,
    Fut: Future<Output = Result<T, E>>,
{
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| E::unavailable("concurrency limit closed".to_string()))?;

    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out(timeout)),
    }
}

impl Stages {
    async fn rewrite(&self, index: ChunkIndex, text: &str) -> Result<String, LlmError> {
        let what = format!("Rewrite of chunk {}", index);
        let (limit, timeout, rewriter) =
            (&self.limits.rewrite, self.rewrite_timeout, &self.rewriter);
        self.retry
            .run(&what, move || limited(limit, timeout, rewriter.rewrite(text)))
            .await
    }

    async fn synthesize(&self, index: ChunkIndex, text: &str) -> Result<AudioSegment, TtsError> {
        let what = format!("Synthesis of chunk {}", index);
        let (limit, timeout, tts, voice) = (
            &self.limits.synthesis,
            self.synthesis_timeout,
            &self.tts,
            self.voice,
        );
        self.retry
            .run(&what, move || limited(limit, timeout, tts.synthesize(text, voice)))
            .await
    }

    async fn process(&self, chunk: Chunk) -> Result<ChunkOutput, PipelineError> {
        let index = chunk.index;

        debug!("Sending chunk {} to {}", index, self.rewriter.name());
        let (text, passed_through) = match self.rewrite(index, &chunk.text).await {
            Ok(text) => {
                info!("Rewrite returned chunk {}", index);
                (text, false)
            }
            Err(source) => match self.rewrite_failure {
                RewriteFailurePolicy::Fail => {
                    return Err(PipelineError::Rewrite { index, source });
                }
                RewriteFailurePolicy::PassThrough => {
                    warn!(
                        "Rewrite of chunk {} failed ({}); using the original text",
                        index, source
                    );
                    (chunk.text, true)
                }
            },
        };

        debug!("Sending chunk {} to {}", index, self.tts.name());
        let audio = self
            .synthesize(index, &text)
            .await
            .map_err(|source| PipelineError::Synthesis { index, source })?;
        info!(
            "Synthesis returned chunk {} ({:.1}s of audio)",
            index,
            audio.duration().as_secs_f32()
        );

        Ok(ChunkOutput {
            audio,
            passed_through,
        })
    }
}

/// Drives chunks through rewrite and synthesis.
pub struct Orchestrator {
    stages: Arc<Stages>,
    launch_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        rewriter: Arc<dyn Rewriter>,
        tts: Arc<dyn TtsBackend>,
        limits: ServiceLimits,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            stages: Arc::new(Stages {
                rewriter,
                tts,
                limits,
                voice: config.voice,
                retry: config.retry,
                rewrite_timeout: config.rewrite_timeout,
                synthesis_timeout: config.synthesis_timeout,
                rewrite_failure: config.rewrite_failure,
            }),
            launch_interval: config.launch_interval,
        }
    }

    /// Process all chunks and return their audio in chunk order.
    ///
    /// `on_progress` is called once per completed chunk. On the first fatal
    /// error every other chunk task is aborted and the error is returned.
    pub async fn run<F>(
        &self,
        chunks: Vec<Chunk>,
        mut on_progress: F,
    ) -> Result<PipelineOutput, PipelineError>
    where
        F: FnMut(PipelineProgress),
    {
        let total = chunks.len();
        if total == 0 {
            return Ok(PipelineOutput::default());
        }

        let mut tasks = JoinSet::new();
        for (slot, chunk) in chunks.into_iter().enumerate() {
            let stages = Arc::clone(&self.stages);
            let start_delay = self.launch_interval.saturating_mul(slot as u32);
            tasks.spawn(async move {
                if !start_delay.is_zero() {
                    tokio::time::sleep(start_delay).await;
                }
                let index = chunk.index;
                (slot, index, stages.process(chunk).await)
            });
        }

        let mut slots: Vec<Option<AudioSegment>> = vec![None; total];
        let mut passed_through = Vec::new();
        let mut completed = 0;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((slot, index, Ok(output))) => {
                    if slots[slot].is_some() {
                        Err(PipelineError::TaskFailed(format!(
                            "chunk {} produced two results",
                            index
                        )))
                    } else {
                        slots[slot] = Some(output.audio);
                        if output.passed_through {
                            passed_through.push(index);
                        }
                        Ok(index)
                    }
                }
                Ok((_, _, Err(e))) => Err(e),
                Err(e) => Err(PipelineError::TaskFailed(e.to_string())),
            };

            match outcome {
                Ok(index) => {
                    completed += 1;
                    on_progress(PipelineProgress {
                        index,
                        completed,
                        total,
                    });
                }
                Err(e) => {
                    let outstanding = tasks.len();
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    debug!("Cancelled {} outstanding chunk tasks", outstanding);
                    return Err(e);
                }
            }
        }

        let segments = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PipelineError::TaskFailed("a chunk finished without audio".into()))?;
        passed_through.sort();

        Ok(PipelineOutput {
            segments,
            passed_through,
        })
    }
}
