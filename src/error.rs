//! Error types for the acquisition and transcription stages.
//!
//! Summarization failures are not represented here: they are carried as data
//! in [`crate::llm::SummaryResult`] and never abort a pipeline call.

use std::path::PathBuf;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline call
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Invalid video URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Missing required executables in {}: {}", dir.display(), missing.join(", "))]
    ToolMissing { dir: PathBuf, missing: Vec<String> },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The external download tool failed or produced nothing usable
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Downloaded audio file not found at: {}", path.display())]
    MissingOutput { path: PathBuf },

    #[error("Downloaded audio file is empty: {}", path.display())]
    EmptyOutput { path: PathBuf },
}

/// Model loading or inference failed
#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("Failed to load {tier} model: {reason}")]
    ModelLoad { tier: String, reason: String },

    #[error("Transcription failed: {0}")]
    Inference(String),

    #[error("Failed to parse transcription output: {0}")]
    OutputParse(String),
}

impl PipelineError {
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_missing_message_lists_executables() {
        let err = PipelineError::ToolMissing {
            dir: PathBuf::from("/opt/ffmpeg"),
            missing: vec!["ffmpeg".to_string(), "ffprobe".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required executables in /opt/ffmpeg: ffmpeg, ffprobe"
        );
    }

    #[test]
    fn test_download_error_carries_path() {
        let err: PipelineError = DownloadError::EmptyOutput {
            path: PathBuf::from("/tmp/cache/abc123.mp3"),
        }
        .into();
        assert!(err.to_string().contains("/tmp/cache/abc123.mp3"));
    }
}
