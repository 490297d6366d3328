use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info};
use url::Url;

use crate::cache::{AudioArtifact, AudioCache};
use crate::error::{DownloadError, Result};
use crate::source::{SourceReference, UrlValidator};
use crate::tools::ToolLocation;

/// Target bitrate for the extracted mp3
pub const AUDIO_QUALITY: &str = "192K";

/// Lines of tool stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// External tool that writes best-available audio for a URL to `output`
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, output: &Path, tools: &ToolLocation) -> Result<()>;
    fn name(&self) -> &str;
}

/// yt-dlp driven audio extraction
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: String,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_command(&self, url: &Url, output: &Path, tools: &ToolLocation) -> Command {
        // yt-dlp picks the extension itself; the mp3 postprocessor lands on `output`
        let template = output.with_extension("%(ext)s");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-f")
            .arg("bestaudio/best")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--audio-quality")
            .arg(AUDIO_QUALITY)
            .arg("--ffmpeg-location")
            .arg(&tools.dir)
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("-o")
            .arg(&template)
            .arg(url.as_str());
        cmd
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &Url, output: &Path, tools: &ToolLocation) -> Result<()> {
        let mut cmd = self.build_command(url, output, tools);
        debug!("Executing command: {:?}", cmd);

        let result = cmd.output().await.map_err(|source| DownloadError::Spawn {
            program: self.binary.clone(),
            source,
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail = stderr
                .lines()
                .rev()
                .take(STDERR_TAIL_LINES)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            error!("❌ {} failed for {}: {}", self.binary, url, tail);
            return Err(DownloadError::ToolFailed {
                program: self.binary.clone(),
                status: result.status.to_string(),
                stderr: tail,
            }
            .into());
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.binary
    }
}

/// Fetches and caches best-available audio for video URLs
#[derive(Clone)]
pub struct Downloader {
    validator: UrlValidator,
    cache: AudioCache,
    tools: ToolLocation,
    fetcher: Arc<dyn AudioFetcher>,
}

impl Downloader {
    pub fn new(
        validator: UrlValidator,
        cache: AudioCache,
        tools: ToolLocation,
        fetcher: Arc<dyn AudioFetcher>,
    ) -> Self {
        Self {
            validator,
            cache,
            tools,
            fetcher,
        }
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    pub fn tools(&self) -> &ToolLocation {
        &self.tools
    }

    /// Validate a URL and extract its source reference without any I/O
    pub fn resolve_source(&self, url: &str) -> Result<(Url, SourceReference)> {
        self.validator.validate(url)
    }

    /// Validate, then serve from cache or download
    pub async fn download(&self, url: &str) -> Result<AudioArtifact> {
        let (url, source) = self.resolve_source(url)?;
        self.download_source(&url, &source).await
    }

    /// Download audio for an already validated URL
    pub async fn download_source(&self, url: &Url, source: &SourceReference) -> Result<AudioArtifact> {
        info!("⬇️  Downloading audio for {} from {}", source, url);

        let fetcher = Arc::clone(&self.fetcher);
        let tools = &self.tools;
        self.cache
            .get_or_create(source, move |path| async move {
                tools.verify()?;
                info!("🎵 Running {} into {}", fetcher.name(), path.display());
                fetcher.fetch(url, &path, tools).await
            })
            .await
    }
}
