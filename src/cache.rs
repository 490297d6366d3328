//! Audio cache keyed by source reference, with age-based housekeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::FileTimes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{DownloadError, Result};
use crate::source::SourceReference;

/// The single container/codec the pipeline stores audio in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// A cached, single-file audio extraction result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub source: SourceReference,
    pub last_access: DateTime<Utc>,
    pub size_bytes: u64,
    /// True when the artifact was served without producing it
    pub cache_hit: bool,
}

/// Summary of one cached file, for listings
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    pub age_hours: u64,
}

/// Maps source references to audio files in a shared directory.
///
/// Two concurrent misses for the same reference may both produce the file;
/// the last writer wins. No lock is taken on the miss path.
#[derive(Debug, Clone)]
pub struct AudioCache {
    cache_dir: PathBuf,
    max_age: Duration,
    format: AudioFormat,
}

impl AudioCache {
    /// Create the cache, making sure its directory exists
    pub fn new(cache_dir: PathBuf, max_age: Duration) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            max_age,
            format: AudioFormat::Mp3,
        })
    }

    pub fn from_days(cache_dir: PathBuf, max_age_days: u64) -> Result<Self> {
        Self::new(cache_dir, Duration::from_secs(max_age_days.saturating_mul(24 * 3600)))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the artifact for `source` lives, whether or not it exists yet
    pub fn artifact_path(&self, source: &SourceReference) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", source, self.format.extension()))
    }

    /// Return the cached artifact if a non-empty file exists, refreshing its
    /// timestamps so the sweep does not evict recently reused audio
    pub async fn lookup(&self, source: &SourceReference) -> Option<AudioArtifact> {
        let path = self.artifact_path(source);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return None;
        }

        if let Err(e) = touch(&path) {
            warn!("Failed to refresh timestamps on {}: {}", path.display(), e);
        }

        info!("📦 Audio file already cached: {}", path.display());
        Some(AudioArtifact {
            path,
            format: self.format,
            source: source.clone(),
            last_access: Utc::now(),
            size_bytes: metadata.len(),
            cache_hit: true,
        })
    }

    /// Serve from cache, or run `produce` with the target path and register
    /// its output
    pub async fn get_or_create<F, Fut>(
        &self,
        source: &SourceReference,
        produce: F,
    ) -> Result<AudioArtifact>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if let Some(artifact) = self.lookup(source).await {
            return Ok(artifact);
        }

        let path = self.artifact_path(source);
        if path.exists() {
            debug!("Removing empty cache entry {}", path.display());
            tokio::fs::remove_file(&path).await?;
        }

        produce(path.clone()).await?;
        self.register(source, path).await
    }

    async fn register(&self, source: &SourceReference, path: PathBuf) -> Result<AudioArtifact> {
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(DownloadError::MissingOutput { path }.into()),
        };
        if metadata.len() == 0 {
            return Err(DownloadError::EmptyOutput { path }.into());
        }

        info!(
            "✅ Cached audio for {}: {} ({:.1} MB)",
            source,
            path.display(),
            metadata.len() as f64 / 1_000_000.0
        );
        Ok(AudioArtifact {
            path,
            format: self.format,
            source: source.clone(),
            last_access: Utc::now(),
            size_bytes: metadata.len(),
            cache_hit: false,
        })
    }

    /// Delete cached files older than the configured age. Best effort:
    /// individual failures are logged and skipped.
    pub fn sweep(&self) -> usize {
        info!(
            "🧹 Cleaning up cached audio older than {} days",
            self.max_age.as_secs() / 86_400
        );
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in self.files() {
            let modified = match entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|m| m.modified())
            {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Failed to stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= self.max_age {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed old file: {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            info!("🗑️ Cleaned up {} old cached files", removed);
        }
        removed
    }

    /// List cached files, newest first
    pub fn entries(&self) -> Vec<CacheEntry> {
        let now = SystemTime::now();
        let mut entries: Vec<CacheEntry> = self
            .files()
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                let modified = metadata.modified().ok()?;
                Some(CacheEntry {
                    path: entry.path().to_path_buf(),
                    size_bytes: metadata.len(),
                    modified: modified.into(),
                    age_hours: now.duration_since(modified).unwrap_or_default().as_secs() / 3600,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        entries
    }

    /// Remove every cached file
    pub fn clear(&self) -> usize {
        self.files()
            .filter(|entry| std::fs::remove_file(entry.path()).is_ok())
            .count()
    }

    fn files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.cache_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
    }
}

fn touch(path: &Path) -> std::io::Result<()> {
    let now = SystemTime::now();
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(FileTimes::new().set_accessed(now).set_modified(now))
}
