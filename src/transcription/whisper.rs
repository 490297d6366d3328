//! whisper.cpp backend driven through its `whisper-cli` binary

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::engine::{ModelLoader, SpeechModel};
use super::result::{Device, ModelTier, RawTranscript, Segment};
use crate::config::TranscriptionConfig;
use crate::error::TranscriptionError;
use crate::tools::ToolLocation;

/// Sample rate whisper.cpp expects its input at
const WHISPER_SAMPLE_RATE: &str = "16000";

/// Loads ggml model files for `whisper-cli`
#[derive(Debug, Clone)]
pub struct WhisperCliLoader {
    binary: String,
    models_dir: PathBuf,
    threads: usize,
    tools: ToolLocation,
}

impl WhisperCliLoader {
    pub fn new(config: &TranscriptionConfig, tools: ToolLocation) -> Self {
        Self {
            binary: config.binary.clone(),
            models_dir: config.models_dir.clone(),
            threads: config.threads.max(1),
            tools,
        }
    }

    pub fn model_path(&self, tier: ModelTier) -> PathBuf {
        self.models_dir
            .join(format!("ggml-{}.bin", tier.model_name()))
    }

    /// Tiers whose model file is present on disk
    pub fn available_tiers(&self) -> Vec<ModelTier> {
        ModelTier::ALL
            .into_iter()
            .filter(|tier| self.model_path(*tier).is_file())
            .collect()
    }

    /// Whether the configured binary runs at all
    pub async fn backend_available(&self) -> bool {
        check_command_available(&self.binary).await
    }
}

#[async_trait]
impl ModelLoader for WhisperCliLoader {
    async fn load(
        &self,
        tier: ModelTier,
        device: Device,
    ) -> Result<Arc<dyn SpeechModel>, TranscriptionError> {
        let model_path = self.model_path(tier);
        let metadata = tokio::fs::metadata(&model_path).await.map_err(|_| {
            TranscriptionError::ModelLoad {
                tier: tier.to_string(),
                reason: format!("model file not found: {}", model_path.display()),
            }
        })?;
        info!(
            "✅ Found model: {} ({:.1} MB)",
            model_path.display(),
            metadata.len() as f64 / 1_000_000.0
        );

        if !check_command_available(&self.binary).await {
            return Err(TranscriptionError::ModelLoad {
                tier: tier.to_string(),
                reason: format!("{} is not installed or not runnable", self.binary),
            });
        }

        Ok(Arc::new(WhisperCliModel {
            binary: self.binary.clone(),
            model_path,
            device,
            threads: self.threads,
            ffmpeg: self.tools.ffmpeg(),
        }))
    }
}

/// One ggml model file bound to a device
#[derive(Debug, Clone)]
pub struct WhisperCliModel {
    binary: String,
    model_path: PathBuf,
    device: Device,
    threads: usize,
    ffmpeg: PathBuf,
}

impl WhisperCliModel {
    fn normalise_command(&self, audio: &Path, wav: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-nostdin")
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(audio)
            .arg("-ar")
            .arg(WHISPER_SAMPLE_RATE)
            .arg("-ac")
            .arg("1")
            .arg("-c:a")
            .arg("pcm_s16le")
            .arg(wav);
        cmd
    }

    fn whisper_command(&self, wav: &Path, output_base: &Path, language: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(wav)
            .arg("-oj")
            .arg("-of")
            .arg(output_base)
            .arg("-t")
            .arg(self.threads.to_string())
            .arg("-l")
            .arg(language.unwrap_or("auto"));
        if self.device == Device::Cpu {
            cmd.arg("-ng");
        }
        cmd
    }
}

#[async_trait]
impl SpeechModel for WhisperCliModel {
    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
    ) -> Result<RawTranscript, TranscriptionError> {
        let scratch = tempfile::Builder::new()
            .prefix("tubescribe-whisper-")
            .tempdir()
            .map_err(|e| TranscriptionError::Inference(format!("failed to create scratch dir: {}", e)))?;
        let wav = scratch.path().join("input.wav");
        let output_base = scratch.path().join("transcript");

        run_step("ffmpeg", self.normalise_command(audio, &wav)).await?;

        info!(
            "🚀 Running {} with {} on {}",
            self.binary,
            self.model_path.display(),
            self.device
        );
        run_step(&self.binary, self.whisper_command(&wav, &output_base, language)).await?;

        let json_path = output_base.with_extension("json");
        let content = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            TranscriptionError::OutputParse(format!(
                "no JSON output at {}: {}",
                json_path.display(),
                e
            ))
        })?;
        debug!("📊 JSON content size: {} bytes", content.len());

        parse_whisper_json(&content)
    }
}

async fn run_step(name: &str, mut cmd: Command) -> Result<(), TranscriptionError> {
    debug!("Executing command: {:?}", cmd);
    let output = cmd
        .output()
        .await
        .map_err(|e| TranscriptionError::Inference(format!("failed to spawn {}: {}", name, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(10).collect();
        let tail = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
        error!("❌ {} failed with {}: {}", name, output.status, tail);
        return Err(TranscriptionError::Inference(format!(
            "{} failed with {}: {}",
            name, output.status, tail
        )));
    }
    Ok(())
}

/// Check if a command is available
async fn check_command_available(cmd_name: &str) -> bool {
    Command::new(cmd_name)
        .arg("--help")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Parse whisper JSON in either the `transcription[]` layout written by
/// whisper.cpp or the `segments[]` layout with float seconds
pub fn parse_whisper_json(content: &str) -> Result<RawTranscript, TranscriptionError> {
    let output: WhisperOutput = serde_json::from_str(content).map_err(|e| {
        let preview: String = content.chars().take(200).collect();
        TranscriptionError::OutputParse(format!("{} (content starts with: {})", e, preview))
    })?;

    let language = output
        .result
        .as_ref()
        .and_then(|r| r.language.clone())
        .or(output.language);

    let segments = if !output.transcription.is_empty() {
        output
            .transcription
            .into_iter()
            .map(|seg| {
                let (start, end) = match seg.offsets {
                    Some(offsets) => (offsets.from as f64 / 1000.0, offsets.to as f64 / 1000.0),
                    None => (
                        parse_timestamp(&seg.timestamps.from)?,
                        parse_timestamp(&seg.timestamps.to)?,
                    ),
                };
                Ok(Segment::new(start, end, seg.text))
            })
            .collect::<Result<Vec<_>, TranscriptionError>>()?
    } else {
        output
            .segments
            .into_iter()
            .map(|seg| Segment::new(seg.start, seg.end, seg.text))
            .collect()
    };

    Ok(RawTranscript { segments, language })
}

/// Parse timestamp in "HH:MM:SS,mmm" format to seconds
pub fn parse_timestamp(timestamp: &str) -> Result<f64, TranscriptionError> {
    let invalid = || TranscriptionError::OutputParse(format!("Invalid timestamp format: {}", timestamp));

    let (time_part, millis) = timestamp.split_once([',', '.']).ok_or_else(invalid)?;
    let millis: f64 = millis.parse().map_err(|_| invalid())?;

    let components: Vec<f64> = time_part
        .split(':')
        .map(|c| c.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    let &[hours, minutes, seconds] = components.as_slice() else {
        return Err(invalid());
    };

    Ok(hours * 3600.0 + minutes * 60.0 + seconds + millis / 1000.0)
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
    #[serde(default)]
    transcription: Vec<WhisperTranscriptionSegment>,
    #[serde(default)]
    result: Option<WhisperResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperResult {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperTranscriptionSegment {
    timestamps: WhisperTimestamps,
    #[serde(default)]
    offsets: Option<WhisperOffsets>,
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperTimestamps {
    from: String,
    to: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}
