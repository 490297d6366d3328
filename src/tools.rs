//! Discovery of the ffmpeg installation used by the downloader and the
//! audio normalisation step.
//!
//! The resolved [`ToolLocation`] is handed explicitly to every component
//! that spawns ffmpeg-dependent subprocesses; nothing here touches the
//! process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ToolsConfig;
use crate::error::{PipelineError, Result};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// How a tool directory was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    Override,
    Standard,
    DefaultGuess,
}

/// A directory believed to contain both ffmpeg and ffprobe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLocation {
    pub dir: PathBuf,
    pub source: ToolSource,
}

impl ToolLocation {
    pub fn new(dir: impl Into<PathBuf>, source: ToolSource) -> Self {
        Self {
            dir: dir.into(),
            source,
        }
    }

    pub fn ffmpeg(&self) -> PathBuf {
        executable_path(&self.dir, FFMPEG)
    }

    /// Names of required executables absent from the directory
    pub fn missing_executables(&self) -> Vec<String> {
        [FFMPEG, FFPROBE]
            .iter()
            .filter(|name| !executable_path(&self.dir, name).is_file())
            .map(|name| name.to_string())
            .collect()
    }

    /// Fails with `ToolMissing` unless both executables are present
    pub fn verify(&self) -> Result<()> {
        let missing = self.missing_executables();
        if missing.is_empty() {
            debug!("Verified ffmpeg and ffprobe in {}", self.dir.display());
            Ok(())
        } else {
            Err(PipelineError::ToolMissing {
                dir: self.dir.clone(),
                missing,
            })
        }
    }
}

fn executable_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
}

fn has_ffmpeg(dir: &Path) -> bool {
    executable_path(dir, FFMPEG).is_file()
}

/// Resolves the ffmpeg directory from configuration and standard locations
#[derive(Debug, Clone)]
pub struct ToolLocator {
    override_dir: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    default_dir: PathBuf,
}

impl ToolLocator {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            override_dir: config.ffmpeg_location.clone(),
            search_dirs: config.search_dirs.clone(),
            default_dir: config.default_dir.clone(),
        }
    }

    /// Never fails: an unusable result degrades to the default guess and the
    /// first subprocess that needs ffmpeg reports the problem.
    pub fn resolve(&self) -> ToolLocation {
        if let Some(dir) = &self.override_dir {
            if has_ffmpeg(dir) {
                info!("🔧 Using ffmpeg from configured location: {}", dir.display());
                return ToolLocation::new(dir, ToolSource::Override);
            }
            warn!(
                "Configured ffmpeg location {} does not contain ffmpeg, probing standard locations",
                dir.display()
            );
        }

        for dir in &self.search_dirs {
            if has_ffmpeg(dir) {
                info!("🔧 Found ffmpeg in {}", dir.display());
                return ToolLocation::new(dir, ToolSource::Standard);
            }
        }

        warn!(
            "⚠️  ffmpeg not found in standard locations, defaulting to {}",
            self.default_dir.display()
        );
        ToolLocation::new(&self.default_dir, ToolSource::DefaultGuess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn install(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(executable_path(dir, name), b"#!/bin/sh\n").unwrap();
        }
    }

    fn locator(override_dir: Option<PathBuf>, search: Vec<PathBuf>, default: PathBuf) -> ToolLocator {
        ToolLocator::new(&ToolsConfig {
            ffmpeg_location: override_dir,
            search_dirs: search,
            default_dir: default,
        })
    }

    #[test]
    fn test_override_wins_when_valid() {
        let overridden = TempDir::new().unwrap();
        let standard = TempDir::new().unwrap();
        install(overridden.path(), &[FFMPEG, FFPROBE]);
        install(standard.path(), &[FFMPEG, FFPROBE]);

        let location = locator(
            Some(overridden.path().to_path_buf()),
            vec![standard.path().to_path_buf()],
            PathBuf::from("/nonexistent"),
        )
        .resolve();

        assert_eq!(location.dir, overridden.path());
        assert_eq!(location.source, ToolSource::Override);
    }

    #[test]
    fn test_invalid_override_falls_through_to_search() {
        let empty = TempDir::new().unwrap();
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        install(second.path(), &[FFMPEG]);

        let location = locator(
            Some(empty.path().to_path_buf()),
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            PathBuf::from("/nonexistent"),
        )
        .resolve();

        assert_eq!(location.dir, second.path());
        assert_eq!(location.source, ToolSource::Standard);
    }

    #[test]
    fn test_nothing_found_returns_default_guess() {
        let empty = TempDir::new().unwrap();
        let location = locator(
            None,
            vec![empty.path().to_path_buf()],
            PathBuf::from("/opt/guess"),
        )
        .resolve();

        assert_eq!(location.dir, PathBuf::from("/opt/guess"));
        assert_eq!(location.source, ToolSource::DefaultGuess);
        assert!(location.verify().is_err());
    }

    #[test]
    fn test_verify_reports_missing_ffprobe() {
        let dir = TempDir::new().unwrap();
        install(dir.path(), &[FFMPEG]);

        let location = ToolLocation::new(dir.path(), ToolSource::Standard);
        match location.verify() {
            Err(PipelineError::ToolMissing { missing, .. }) => {
                assert_eq!(missing, vec![FFPROBE.to_string()]);
            }
            other => panic!("expected ToolMissing, got {:?}", other),
        }

        install(dir.path(), &[FFPROBE]);
        assert!(location.verify().is_ok());
    }
}
