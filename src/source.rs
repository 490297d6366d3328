//! Video URL validation and stable identifier extraction.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use crate::error::{PipelineError, Result};

/// Stable identifier extracted from a video URL.
///
/// Used as the audio cache key and as the filename stem for exported
/// transcripts, so it only ever contains `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceReference(String);

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static regex"))
}

impl SourceReference {
    /// Wrap an already extracted identifier
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id_pattern().is_match(&id) {
            Ok(Self(id))
        } else {
            Err(PipelineError::invalid_url(
                &id,
                "video id contains unsupported characters",
            ))
        }
    }

    /// Extract the identifier from a parsed URL: the `v` query parameter if
    /// present, otherwise the last non-empty path segment.
    pub fn from_url(url: &Url) -> Result<Self> {
        if let Some((_, v)) = url.query_pairs().find(|(key, _)| key == "v") {
            if !v.is_empty() {
                return Self::new(v.into_owned());
            }
        }

        let last_segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .ok_or_else(|| PipelineError::invalid_url(url.as_str(), "no video id in URL"))?;

        Self::new(last_segment).map_err(|_| {
            PipelineError::invalid_url(url.as_str(), "video id contains unsupported characters")
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accepts only URLs on the configured video-hosting domains
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_domains: Vec<String>,
}

impl UrlValidator {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Syntactic check before any network call; returns the parsed URL and
    /// the extracted source reference
    pub fn validate(&self, raw: &str) -> Result<(Url, SourceReference)> {
        let url = Url::parse(raw.trim())
            .map_err(|e| PipelineError::invalid_url(raw, e.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PipelineError::invalid_url(
                raw,
                format!("unsupported scheme: {}", url.scheme()),
            ));
        }

        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| PipelineError::invalid_url(raw, "URL has no host"))?;

        if !self.allowed_domains.iter().any(|d| *d == host) {
            return Err(PipelineError::invalid_url(
                raw,
                format!("host '{}' is not a supported video site", host),
            ));
        }

        let source = SourceReference::from_url(&url)?;
        Ok((url, source))
    }
}
