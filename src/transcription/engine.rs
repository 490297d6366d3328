use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::result::{Device, ModelTier, RawTranscript, TranscriptResult};
use crate::cache::AudioArtifact;
use crate::error::TranscriptionError;

/// A loaded speech-to-text model
#[async_trait]
pub trait SpeechModel: Send + Sync {
    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
    ) -> Result<RawTranscript, TranscriptionError>;
}

/// Produces loaded models; the first load of a tier pays the latency
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(
        &self,
        tier: ModelTier,
        device: Device,
    ) -> Result<Arc<dyn SpeechModel>, TranscriptionError>;
}

struct LoadedModel {
    tier: ModelTier,
    device: Device,
    model: Arc<dyn SpeechModel>,
}

enum ModelState {
    Unloaded,
    Loaded(LoadedModel),
}

/// Owns at most one loaded model and reuses it across calls.
///
/// Not meant for concurrent use from several requests; calls serialize on
/// the model state lock.
pub struct TranscriptionEngine {
    loader: Arc<dyn ModelLoader>,
    use_gpu: bool,
    state: Mutex<ModelState>,
}

impl TranscriptionEngine {
    pub fn new(loader: Arc<dyn ModelLoader>, use_gpu: bool) -> Self {
        Self {
            loader,
            use_gpu,
            state: Mutex::new(ModelState::Unloaded),
        }
    }

    /// Return the model for `tier`, loading it if needed. A failed load
    /// leaves the previous state untouched.
    pub async fn load(&self, tier: ModelTier) -> Result<Arc<dyn SpeechModel>, TranscriptionError> {
        let mut state = self.state.lock().await;
        if let ModelState::Loaded(loaded) = &*state {
            if loaded.tier == tier {
                return Ok(Arc::clone(&loaded.model));
            }
            info!("🔄 Switching speech model from {} to {}", loaded.tier, tier);
        }

        let device = Device::select(self.use_gpu);
        if self.use_gpu && !device.is_accelerated() {
            warn!("GPU requested but no accelerator detected, running on cpu");
        }

        info!("📥 Loading {} speech model on {}", tier, device);
        let start = Instant::now();
        let model = self.loader.load(tier, device).await?;
        info!(
            "✅ {} model loaded on {} in {:.1}s",
            tier,
            device,
            start.elapsed().as_secs_f64()
        );

        *state = ModelState::Loaded(LoadedModel {
            tier,
            device,
            model: Arc::clone(&model),
        });
        Ok(model)
    }

    /// Tier and device of the currently loaded model
    pub async fn loaded(&self) -> Option<(ModelTier, Device)> {
        match &*self.state.lock().await {
            ModelState::Loaded(loaded) => Some((loaded.tier, loaded.device)),
            ModelState::Unloaded => None,
        }
    }

    /// Transcribe a cached artifact. Errors propagate without retry.
    pub async fn transcribe(
        &self,
        artifact: &AudioArtifact,
        language: Option<&str>,
        tier: ModelTier,
    ) -> Result<TranscriptResult, TranscriptionError> {
        if !artifact.path.is_file() {
            return Err(TranscriptionError::Inference(format!(
                "Audio file not found: {}",
                artifact.path.display()
            )));
        }

        let model = self.load(tier).await?;
        let device = self
            .loaded()
            .await
            .map(|(_, device)| device)
            .unwrap_or(Device::Cpu);

        info!(
            "🎤 Transcribing {} with {} model (language: {})",
            artifact.path.display(),
            tier,
            language.unwrap_or("auto")
        );
        let raw = model.transcribe(&artifact.path, language).await?;

        let detected = raw.language.or_else(|| language.map(str::to_string));
        let result = TranscriptResult::from_segments(raw.segments, detected, tier, device);
        info!(
            "📊 Transcription statistics: {} characters, {} segments",
            result.text.len(),
            result.segments.len()
        );
        Ok(result)
    }
}
