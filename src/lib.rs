//! tubescribe - video URL to transcript pipeline
//!
//! Downloads audio with yt-dlp, transcribes it with a whisper.cpp model and
//! optionally summarizes the transcript with a local Ollama server.

pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod llm;
pub mod output;
pub mod processing;
pub mod source;
pub mod tools;
pub mod transcription;

// Re-export main types for easy access
pub use crate::cache::{AudioArtifact, AudioCache};
pub use crate::config::Config;
pub use crate::download::{AudioFetcher, Downloader, YtDlpFetcher};
pub use crate::error::{PipelineError, Result};
pub use crate::llm::{SummarizationClient, SummaryResult};
pub use crate::processing::{
    ErrorKind, PipelineCoordinator, ProcessRequest, ProcessingFailure, ProcessingResult,
};
pub use crate::source::SourceReference;
pub use crate::tools::{ToolLocation, ToolLocator};
pub use crate::transcription::{ModelTier, TranscriptResult, TranscriptionEngine};
