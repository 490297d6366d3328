use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::cache::AudioCache;
use crate::config::Config;
use crate::download::{Downloader, YtDlpFetcher};
use crate::error::{PipelineError, Result, TranscriptionError};
use crate::llm::{SummarizationClient, SummaryResult};
use crate::output::OutputWriter;
use crate::source::{SourceReference, UrlValidator};
use crate::tools::{ToolLocation, ToolLocator};
use crate::transcription::{
    Device, ModelTier, Segment, TranscriptResult, TranscriptionEngine, WhisperCliLoader,
};

/// One call to [`PipelineCoordinator::process`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub url: String,
    pub language: Option<String>,
    pub model_tier: Option<ModelTier>,
    pub want_summary: bool,
    /// Summary length limit; the configured default when unset
    pub max_words: Option<u32>,
}

impl ProcessRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = Some(tier);
        self
    }

    pub fn with_summary(mut self, max_words: Option<u32>) -> Self {
        self.want_summary = true;
        self.max_words = max_words;
        self
    }
}

/// Wall-clock seconds spent per stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub download_seconds: f64,
    pub transcribe_seconds: f64,
    pub summarize_seconds: f64,
    pub total_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub source: SourceReference,
    pub source_url: String,
    pub audio_path: PathBuf,
    pub audio_cache_hit: bool,
    pub transcript: TranscriptResult,
    pub summary: Option<SummaryResult>,
    pub timings: StageTimings,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    ToolMissing,
    DownloadFailed,
    ModelLoadFailed,
    TranscriptionFailed,
    EmptyTranscript,
    ExportFailed,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::ToolMissing => "tool_missing",
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::ModelLoadFailed => "model_load_failed",
            ErrorKind::TranscriptionFailed => "transcription_failed",
            ErrorKind::EmptyTranscript => "empty_transcript",
            ErrorKind::ExportFailed => "export_failed",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&PipelineError> for ErrorKind {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            PipelineError::ToolMissing { .. } => ErrorKind::ToolMissing,
            PipelineError::Download(_) => ErrorKind::DownloadFailed,
            PipelineError::Transcription(TranscriptionError::ModelLoad { .. }) => {
                ErrorKind::ModelLoadFailed
            }
            PipelineError::Transcription(_) => ErrorKind::TranscriptionFailed,
            PipelineError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Transcript data produced before a later stage failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialTranscript {
    pub text: String,
    pub segments: Vec<Segment>,
    pub partial: bool,
}

impl From<&TranscriptResult> for PartialTranscript {
    fn from(transcript: &TranscriptResult) -> Self {
        Self {
            text: transcript.text.clone(),
            segments: transcript.segments.clone(),
            partial: true,
        }
    }
}

/// What a caller sees when a pipeline call fails
#[derive(thiserror::Error, Debug, Clone, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ProcessingFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub source_reference: Option<SourceReference>,
    pub source_url: String,
    /// When the failing stage gave up
    pub timestamp: DateTime<Utc>,
    pub timings: StageTimings,
    pub partial: Option<PartialTranscript>,
    /// Summary generated before a failed export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryResult>,
}

/// Snapshot of everything the pipeline depends on
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub tools: ToolLocation,
    pub missing_executables: Vec<String>,
    pub cache_dir: PathBuf,
    pub cached_files: usize,
    pub loaded_model: Option<(ModelTier, Device)>,
    pub speech_backend: Option<SpeechBackendStatus>,
    pub inference_url: String,
    pub preferred_model: String,
    pub inference_reachable: bool,
    pub available_models: Vec<String>,
    pub inference_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeechBackendStatus {
    pub binary_available: bool,
    pub installed_tiers: Vec<ModelTier>,
}

struct Attempt<'a> {
    url: &'a str,
    started: Instant,
    timestamp: DateTime<Utc>,
    timings: StageTimings,
    source: Option<SourceReference>,
}

impl<'a> Attempt<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            started: Instant::now(),
            timestamp: Utc::now(),
            timings: StageTimings::default(),
            source: None,
        }
    }

    /// Returns the seconds since `stage_start` and refreshes the total
    fn finish_stage(&mut self, stage_start: Instant) -> f64 {
        self.timings.total_seconds = self.started.elapsed().as_secs_f64();
        stage_start.elapsed().as_secs_f64()
    }

    fn fail(&self, kind: ErrorKind, message: String, partial: Option<PartialTranscript>) -> ProcessingFailure {
        error!("❌ Processing {} failed ({}): {}", self.url, kind, message);
        ProcessingFailure {
            kind,
            message,
            source_reference: self.source.clone(),
            source_url: self.url.to_string(),
            timestamp: Utc::now(),
            timings: self.timings.clone(),
            partial,
            summary: None,
        }
    }

    fn fail_with(&self, err: &PipelineError) -> ProcessingFailure {
        self.fail(ErrorKind::from(err), err.to_string(), None)
    }
}

/// Runs download, transcription, summarization and export for one URL at a
/// time. Stages never overlap within a call.
pub struct PipelineCoordinator {
    downloader: Downloader,
    engine: TranscriptionEngine,
    summarizer: SummarizationClient,
    exporter: Option<OutputWriter>,
    default_tier: ModelTier,
    backend: Option<WhisperCliLoader>,
}

impl PipelineCoordinator {
    /// Wire the production components from configuration
    pub fn new(config: &Config) -> Result<Self> {
        info!("🔧 Initializing pipeline");
        let tools = ToolLocator::new(&config.tools).resolve();
        let cache = AudioCache::from_days(config.cache.cache_dir.clone(), config.cache.max_age_days)?;

        let downloader = Downloader::new(
            UrlValidator::new(config.download.allowed_domains.clone()),
            cache,
            tools.clone(),
            Arc::new(YtDlpFetcher::new(config.download.binary.clone())),
        );

        let loader = WhisperCliLoader::new(&config.transcription, tools);
        let engine = TranscriptionEngine::new(Arc::new(loader.clone()), config.transcription.use_gpu);

        let exporter = config
            .output
            .output_dir
            .as_ref()
            .map(|dir| OutputWriter::new(dir, config.output.write_srt, config.output.write_json));

        let mut coordinator = Self::with_components(
            downloader,
            engine,
            SummarizationClient::from_config(&config.llm),
            exporter,
            config.transcription.default_tier,
        );
        coordinator.backend = Some(loader);
        Ok(coordinator)
    }

    /// Assemble from prebuilt parts. Sweeps stale cache entries.
    pub fn with_components(
        downloader: Downloader,
        engine: TranscriptionEngine,
        summarizer: SummarizationClient,
        exporter: Option<OutputWriter>,
        default_tier: ModelTier,
    ) -> Self {
        let removed = downloader.cache().sweep();
        if removed > 0 {
            info!("🧹 Removed {} stale cached audio files", removed);
        }

        Self {
            downloader,
            engine,
            summarizer,
            exporter,
            default_tier,
            backend: None,
        }
    }

    pub fn cache(&self) -> &AudioCache {
        self.downloader.cache()
    }

    pub fn summarizer(&self) -> &SummarizationClient {
        &self.summarizer
    }

    pub async fn process(
        &self,
        request: ProcessRequest,
    ) -> std::result::Result<ProcessingResult, ProcessingFailure> {
        let mut attempt = Attempt::new(&request.url);
        let tier = request.model_tier.unwrap_or(self.default_tier);
        info!("🎬 Processing {} ({} model)", request.url, tier);

        let (url, source) = self
            .downloader
            .resolve_source(&request.url)
            .map_err(|e| attempt.fail_with(&e))?;
        attempt.source = Some(source.clone());

        let stage = Instant::now();
        let downloaded = self.downloader.download_source(&url, &source).await;
        let seconds = attempt.finish_stage(stage);
        attempt.timings.download_seconds = seconds;
        let artifact = downloaded.map_err(|e| attempt.fail_with(&e))?;

        let stage = Instant::now();
        let transcribed = self
            .engine
            .transcribe(&artifact, request.language.as_deref(), tier)
            .await;
        let seconds = attempt.finish_stage(stage);
        attempt.timings.transcribe_seconds = seconds;
        let transcript = transcribed.map_err(|e| attempt.fail_with(&PipelineError::from(e)))?;

        if transcript.is_empty() {
            return Err(attempt.fail(
                ErrorKind::EmptyTranscript,
                "Transcription produced no text".to_string(),
                Some(PartialTranscript::from(&transcript)),
            ));
        }

        let summary = if request.want_summary {
            let stage = Instant::now();
            let max_words = request
                .max_words
                .unwrap_or_else(|| self.summarizer.default_max_words());
            let summary = self.summarizer.summarize(&transcript.text, max_words).await;
            let seconds = attempt.finish_stage(stage);
            attempt.timings.summarize_seconds = seconds;
            if summary.error_flag {
                warn!("⚠️  Summary unavailable: {}", summary.summary_text);
            }
            Some(summary)
        } else {
            None
        };

        let mut result = ProcessingResult {
            source,
            source_url: url.to_string(),
            audio_path: artifact.path.clone(),
            audio_cache_hit: artifact.cache_hit,
            transcript,
            summary,
            timings: attempt.timings.clone(),
            timestamp: attempt.timestamp,
            outputs: Vec::new(),
        };

        if let Some(exporter) = &self.exporter {
            match exporter.write(&result).await {
                Ok(paths) => result.outputs = paths,
                Err(e) => {
                    attempt.finish_stage(Instant::now());
                    let mut failure = attempt.fail(
                        ErrorKind::ExportFailed,
                        format!("Failed to write outputs to {}: {}", exporter.dir().display(), e),
                        Some(PartialTranscript::from(&result.transcript)),
                    );
                    failure.summary = result.summary.take();
                    return Err(failure);
                }
            }
        }

        attempt.finish_stage(Instant::now());
        result.timings = attempt.timings;
        info!(
            "🎉 Processed {} in {:.1}s: {} characters, {} segments",
            result.source,
            result.timings.total_seconds,
            result.transcript.text.len(),
            result.transcript.segments.len()
        );
        Ok(result)
    }

    /// Collects tool, cache, model and inference server status. Never fails.
    pub async fn diagnostics(&self) -> HealthReport {
        let tools = self.downloader.tools().clone();
        let missing_executables = tools.missing_executables();
        let cache = self.downloader.cache();

        let speech_backend = match &self.backend {
            Some(loader) => Some(SpeechBackendStatus {
                binary_available: loader.backend_available().await,
                installed_tiers: loader.available_tiers(),
            }),
            None => None,
        };

        let (inference_reachable, available_models, inference_error) =
            match self.summarizer.list_models().await {
                Ok(models) => (true, models, None),
                Err(e) => (false, Vec::new(), Some(e.to_string())),
            };

        HealthReport {
            tools,
            missing_executables,
            cache_dir: cache.cache_dir().to_path_buf(),
            cached_files: cache.entries().len(),
            loaded_model: self.engine.loaded().await,
            speech_backend,
            inference_url: self.summarizer.endpoint().to_string(),
            preferred_model: self.summarizer.preferred_model().await,
            inference_reachable,
            available_models,
            inference_error,
        }
    }
}
