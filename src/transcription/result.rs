use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality/speed setting for the speech model, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub const ALL: [ModelTier; 5] = [
        ModelTier::Tiny,
        ModelTier::Base,
        ModelTier::Small,
        ModelTier::Medium,
        ModelTier::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Tiny => "tiny",
            ModelTier::Base => "base",
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }

    /// Name used in ggml model filenames
    pub fn model_name(&self) -> &'static str {
        match self {
            ModelTier::Large => "large-v3",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiny" => Ok(ModelTier::Tiny),
            "base" => Ok(ModelTier::Base),
            "small" => Ok(ModelTier::Small),
            "medium" => Ok(ModelTier::Medium),
            "large" | "large-v3" => Ok(ModelTier::Large),
            other => Err(format!(
                "unknown model tier '{}', expected one of tiny, base, small, medium, large",
                other
            )),
        }
    }
}

/// Compute device the model runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
    Metal,
}

impl Device {
    /// Pick accelerated hardware only when allowed and detected
    pub fn select(use_gpu: bool) -> Device {
        if !use_gpu {
            return Device::Cpu;
        }

        let cuda_visible = std::env::var("CUDA_VISIBLE_DEVICES")
            .map(|v| !v.is_empty() && v != "-1")
            .unwrap_or(false);
        if cuda_visible || std::path::Path::new("/dev/nvidia0").exists() {
            return Device::Cuda;
        }

        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            return Device::Metal;
        }

        Device::Cpu
    }

    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
            Device::Metal => f.write_str("metal"),
        }
    }
}

/// Timestamped piece of transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Backend output before normalisation
#[derive(Debug, Clone, Default)]
pub struct RawTranscript {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

/// Ordered transcript with its concatenated text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub segments: Vec<Segment>,
    pub text: String,
    pub language: Option<String>,
    pub model_tier: ModelTier,
    pub device: Device,
}

impl TranscriptResult {
    /// Segments are trimmed, empty ones dropped, then stable-sorted by start
    /// time; `text` is rebuilt as their ordered join.
    pub fn from_segments(
        segments: Vec<Segment>,
        language: Option<String>,
        model_tier: ModelTier,
        device: Device,
    ) -> Self {
        let mut segments: Vec<Segment> = segments
            .into_iter()
            .filter_map(|mut seg| {
                seg.text = seg.text.trim().to_string();
                (!seg.text.is_empty()).then_some(seg)
            })
            .collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let text = segments
            .iter()
            .map(|seg| seg.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            segments,
            text,
            language,
            model_tier,
            device,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// End of the last segment, in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.segments.iter().map(|s| s.end).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing() {
        assert_eq!("Medium".parse::<ModelTier>().unwrap(), ModelTier::Medium);
        assert_eq!("large-v3".parse::<ModelTier>().unwrap(), ModelTier::Large);
        assert!("huge".parse::<ModelTier>().is_err());
        assert_eq!(ModelTier::default(), ModelTier::Base);
        assert_eq!(ModelTier::Large.model_name(), "large-v3");
    }

    #[test]
    fn test_tiers_ordered_fastest_first() {
        let mut sorted = ModelTier::ALL;
        sorted.sort();
        assert_eq!(sorted, ModelTier::ALL);
    }

    #[test]
    fn test_cpu_when_gpu_disabled() {
        assert_eq!(Device::select(false), Device::Cpu);
    }

    #[test]
    fn test_segments_sorted_and_joined() {
        let result = TranscriptResult::from_segments(
            vec![
                Segment::new(4.0, 6.0, " third "),
                Segment::new(0.0, 2.0, "first"),
                Segment::new(2.0, 3.0, "   "),
                Segment::new(2.0, 4.0, "second"),
            ],
            Some("en".to_string()),
            ModelTier::Base,
            Device::Cpu,
        );

        let starts: Vec<f64> = result.segments.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.0]);
        assert_eq!(result.text, "first second third");
        assert_eq!(result.duration_seconds(), 6.0);
    }

    #[test]
    fn test_equal_starts_keep_backend_order() {
        let result = TranscriptResult::from_segments(
            vec![Segment::new(1.0, 1.5, "a"), Segment::new(1.0, 2.0, "b")],
            None,
            ModelTier::Tiny,
            Device::Cpu,
        );
        assert_eq!(result.text, "a b");
    }
}
