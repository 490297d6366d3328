use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::transcription::ModelTier;

/// Configuration for the transcription pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool discovery
    pub tools: ToolsConfig,

    /// Source download settings
    pub download: DownloadConfig,

    /// Audio cache settings
    pub cache: CacheConfig,

    /// Speech-to-text settings
    pub transcription: TranscriptionConfig,

    /// Local inference server settings
    pub llm: LLMConfig,

    /// Output and logging settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory holding ffmpeg and ffprobe, checked before the standard locations
    pub ffmpeg_location: Option<PathBuf>,

    /// Standard installation directories, probed in order
    pub search_dirs: Vec<PathBuf>,

    /// Directory assumed when nothing else matches
    pub default_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Download tool binary (name on PATH or absolute path)
    pub binary: String,

    /// Hosts accepted by URL validation
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for downloaded audio
    pub cache_dir: PathBuf,

    /// Files older than this are removed by the startup sweep
    pub max_age_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Whisper CLI binary (whisper.cpp `whisper-cli`)
    pub binary: String,

    /// Directory containing ggml-<tier>.bin model files
    pub models_dir: PathBuf,

    /// Tier used when a request does not name one
    pub default_tier: ModelTier,

    /// Allow accelerated hardware when it is detected
    pub use_gpu: bool,

    /// Worker threads handed to the whisper CLI
    pub threads: usize,
}

/// Inference server configuration for summarization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Base URL of the Ollama-compatible server
    pub endpoint: String,

    /// Preferred model name
    pub model: String,

    /// Models tried in order when the preferred one is not installed
    pub fallback_models: Vec<String>,

    /// KEY=VALUE file remembering the last resolved model
    pub preference_file: Option<PathBuf>,

    /// Default summary length bound in words
    pub max_words: u32,

    /// Sampling temperature (low for determinism)
    pub temperature: f32,

    /// Nucleus sampling bound
    pub top_p: f32,

    /// Generation request timeout in seconds
    pub timeout_seconds: u64,

    /// Model listing timeout in seconds
    pub listing_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Export directory for transcript files (None = no export)
    pub output_dir: Option<PathBuf>,

    /// Write a SubRip file next to the text transcript
    pub write_srt: bool,

    /// Write the full processing result as JSON
    pub write_json: bool,

    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".tubescribe")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            download: DownloadConfig::default(),
            cache: CacheConfig::default(),
            transcription: TranscriptionConfig::default(),
            llm: LLMConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_location: None,
            search_dirs: ["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin", "/bin"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            default_dir: PathBuf::from("/usr/bin"),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            allowed_domains: vec![
                "youtube.com".to_string(),
                "www.youtube.com".to_string(),
                "m.youtube.com".to_string(),
                "music.youtube.com".to_string(),
                "youtu.be".to_string(),
            ],
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: app_dir().join("temp").join("youtube"),
            max_age_days: 7,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            binary: "whisper-cli".to_string(),
            models_dir: PathBuf::from("models"),
            default_tier: ModelTier::default(),
            use_gpu: false,
            threads: num_cpus::get().min(8),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            fallback_models: vec![
                "llama3".to_string(),
                "llama2".to_string(),
                "mistral".to_string(),
                "codellama".to_string(),
            ],
            preference_file: Some(app_dir().join("config").join("transcription.env")),
            max_words: 500,
            temperature: 0.3,
            top_p: 0.9,
            timeout_seconds: 120, // generation on CPU can take a while
            listing_timeout_seconds: 5,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            write_srt: true,
            write_json: true,
            log_level: "tubescribe=info,warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file or the standard locations,
    /// then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::discover().unwrap_or_default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    fn discover() -> Option<Self> {
        let mut config_paths = vec![
            PathBuf::from("tubescribe.toml"),
            PathBuf::from("config/tubescribe.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            config_paths.push(dir.join("tubescribe").join("config.toml"));
        }

        for path in &config_paths {
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => return Some(config),
                Err(e) => tracing::warn!("{:#}", e),
            }
        }
        None
    }

    fn apply_env(&mut self) {
        if let Ok(location) = std::env::var("FFMPEG_LOCATION") {
            if !location.is_empty() {
                self.tools.ffmpeg_location = Some(PathBuf::from(location));
            }
        }

        if let Ok(dir) = std::env::var("TUBESCRIBE_CACHE_DIR") {
            self.cache.cache_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("TUBESCRIBE_MODELS_DIR") {
            self.transcription.models_dir = PathBuf::from(dir);
        }

        if let Ok(tier) = std::env::var("TUBESCRIBE_MODEL_TIER") {
            match tier.parse() {
                Ok(tier) => self.transcription.default_tier = tier,
                Err(e) => tracing::warn!("Ignoring TUBESCRIBE_MODEL_TIER: {}", e),
            }
        }

        if let Ok(use_gpu) = std::env::var("TUBESCRIBE_USE_GPU") {
            self.transcription.use_gpu = use_gpu == "1" || use_gpu.eq_ignore_ascii_case("true");
        }

        if let Ok(dir) = std::env::var("TUBESCRIBE_OUTPUT_DIR") {
            self.output.output_dir = Some(PathBuf::from(dir));
        }

        if let Ok(log_level) = std::env::var("TUBESCRIBE_LOG_LEVEL") {
            self.output.log_level = log_level;
        }

        if let Ok(url) = std::env::var("OLLAMA_API_URL") {
            self.llm.endpoint = url;
        }

        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.llm.model = model;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_age_days == 0 {
            return Err(anyhow!("cache.max_age_days must be greater than 0"));
        }

        if self.download.allowed_domains.is_empty() {
            return Err(anyhow!("download.allowed_domains must not be empty"));
        }

        if self.transcription.threads == 0 {
            return Err(anyhow!("transcription.threads must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!("llm.temperature must be between 0.0 and 2.0"));
        }

        if self.llm.timeout_seconds == 0 || self.llm.listing_timeout_seconds == 0 {
            return Err(anyhow!("llm timeouts must be greater than 0"));
        }

        url::Url::parse(&self.llm.endpoint)
            .map_err(|e| anyhow!("llm.endpoint is not a valid URL: {}", e))?;

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "tubescribe configuration:\n\
            - Cache Directory: {} (max age {} days)\n\
            - Whisper: {} ({} tier, models in {})\n\
            - GPU Allowed: {}\n\
            - Inference Server: {} (model {})\n\
            - Output Directory: {}",
            self.cache.cache_dir.display(),
            self.cache.max_age_days,
            self.transcription.binary,
            self.transcription.default_tier,
            self.transcription.models_dir.display(),
            self.transcription.use_gpu,
            self.llm.endpoint,
            self.llm.model,
            self.output
                .output_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string()),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.config.cache.cache_dir = dir;
        self
    }

    pub fn with_ffmpeg_location(mut self, dir: PathBuf) -> Self {
        self.config.tools.ffmpeg_location = Some(dir);
        self
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.config.tools.search_dirs = dirs;
        self
    }

    pub fn with_models_dir(mut self, dir: PathBuf) -> Self {
        self.config.transcription.models_dir = dir;
        self
    }

    pub fn with_default_tier(mut self, tier: ModelTier) -> Self {
        self.config.transcription.default_tier = tier;
        self
    }

    pub fn with_llm_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.llm.endpoint = endpoint.into();
        self
    }

    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = model.into();
        self
    }

    pub fn with_preference_file(mut self, path: Option<PathBuf>) -> Self {
        self.config.llm.preference_file = path;
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.output.output_dir = dir;
        self
    }

    pub fn enable_gpu(mut self, enable: bool) -> Self {
        self.config.transcription.use_gpu = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
