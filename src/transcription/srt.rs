use std::fmt;
use std::time::Duration;

use super::result::Segment;

/// SRT (SubRip Subtitle) entry
#[derive(Debug, Clone, PartialEq)]
pub struct SrtEntry {
    /// Sequential number, starting at 1
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl fmt::Display for SrtEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n",
            self.index,
            format_timestamp(self.start),
            format_timestamp(self.end),
            self.text
        )
    }
}

/// Subtitle document built from ordered transcript segments
#[derive(Debug, Clone, Default)]
pub struct SrtDocument {
    entries: Vec<SrtEntry>,
}

impl SrtDocument {
    /// Segments are expected in transcript order; blank ones are skipped and
    /// numbering stays contiguous
    pub fn from_segments(segments: &[Segment]) -> Self {
        let entries = segments
            .iter()
            .map(|seg| (seg, clean_text(&seg.text)))
            .filter(|(_, text)| !text.is_empty())
            .enumerate()
            .map(|(i, (seg, text))| SrtEntry {
                index: i + 1,
                start: seconds(seg.start),
                end: seconds(seg.end.max(seg.start)),
                text,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[SrtEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generate SRT content as string
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Collapse line breaks and runs of whitespace into single spaces
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format duration as SRT timestamp (HH:MM:SS,mmm)
pub fn format_timestamp(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let milliseconds = duration.subsec_millis();

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, milliseconds)
}
