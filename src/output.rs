use std::path::{Path, PathBuf};
use tracing::info;

use crate::processing::ProcessingResult;
use crate::transcription::SrtDocument;

/// Writes transcript files named after the source reference
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    write_srt: bool,
    write_json: bool,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, write_srt: bool, write_json: bool) -> Self {
        Self {
            dir: dir.into(),
            write_srt,
            write_json,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Always writes `<id>.txt`; `.srt` and `.json` as configured
    pub async fn write(&self, result: &ProcessingResult) -> std::io::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = result.source.as_str();
        let mut written = Vec::new();

        let text_path = self.dir.join(format!("{}.txt", stem));
        tokio::fs::write(&text_path, format!("{}\n", result.transcript.text)).await?;
        info!(
            "💾 Text file saved: {} ({} characters)",
            text_path.display(),
            result.transcript.text.len()
        );
        written.push(text_path);

        if self.write_srt {
            let srt = SrtDocument::from_segments(&result.transcript.segments);
            let srt_path = self.dir.join(format!("{}.srt", stem));
            tokio::fs::write(&srt_path, srt.render()).await?;
            info!("💾 SRT file saved: {} ({} entries)", srt_path.display(), srt.len());
            written.push(srt_path);
        }

        if self.write_json {
            let json_path = self.dir.join(format!("{}.json", stem));
            let json = serde_json::to_string_pretty(result)?;
            tokio::fs::write(&json_path, json).await?;
            info!("💾 JSON result saved: {}", json_path.display());
            written.push(json_path);
        }

        Ok(written)
    }
}
