//! Transcript summarization against an Ollama-compatible server.
//!
//! [`SummarizationClient::summarize`] never returns an error: every failure
//! becomes a [`SummaryResult`] with `error_flag` set and a readable message
//! in `summary_text`.

pub mod ollama;
pub mod preferences;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::LLMConfig;
pub use ollama::{GenerateOptions, InferenceError, OllamaApi};
pub use preferences::{EnvFileStore, MemoryStore, PreferenceStore, API_URL_KEY, MODEL_KEY};

pub const NO_MODELS_MESSAGE: &str = "No language models available on the inference server";

/// Outcome of one summarization call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary_text: String,
    pub selected_model_name: Option<String>,
    pub generated_token_count: u64,
    pub error_flag: bool,
}

impl SummaryResult {
    pub fn success(summary: impl Into<String>, model: impl Into<String>, tokens: u64) -> Self {
        Self {
            summary_text: summary.into(),
            selected_model_name: Some(model.into()),
            generated_token_count: tokens,
            error_flag: false,
        }
    }

    pub fn failure(message: impl Into<String>, model: Option<String>) -> Self {
        Self {
            summary_text: message.into(),
            selected_model_name: model,
            generated_token_count: 0,
            error_flag: true,
        }
    }
}

/// Why a model was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Configured,
    Fallback,
    FirstAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub name: String,
    pub reason: SelectionReason,
}

fn is_listed(available: &[String], name: &str) -> Option<String> {
    let tagged = format!("{}:latest", name);
    available
        .iter()
        .find(|m| *m == name || **m == tagged)
        .cloned()
}

/// Pick a model: the preferred one if installed, then the first installed
/// fallback in list order, then whatever the server lists first.
pub fn select_model(available: &[String], preferred: &str, fallbacks: &[String]) -> Option<ModelChoice> {
    if available.is_empty() {
        return None;
    }

    if is_listed(available, preferred).is_some() {
        return Some(ModelChoice {
            name: preferred.to_string(),
            reason: SelectionReason::Configured,
        });
    }

    if let Some(name) = fallbacks.iter().find_map(|fb| is_listed(available, fb)) {
        return Some(ModelChoice {
            name,
            reason: SelectionReason::Fallback,
        });
    }

    available.first().map(|name| ModelChoice {
        name: name.clone(),
        reason: SelectionReason::FirstAvailable,
    })
}

pub fn build_prompt(transcript: &str, max_words: u32) -> String {
    format!(
        "Please provide a concise summary of the following transcript.\n\
         Keep the summary under {} words and focus on the key points.\n\n\
         TRANSCRIPT:\n{}\n\nSUMMARY:",
        max_words, transcript
    )
}

pub struct SummarizationClient {
    api: OllamaApi,
    preferred: RwLock<String>,
    fallback_models: Vec<String>,
    options: GenerateOptions,
    default_max_words: u32,
    store: Arc<dyn PreferenceStore>,
}

impl SummarizationClient {
    /// Persisted preferences override the configured model and server url
    pub fn new(config: &LLMConfig, store: Arc<dyn PreferenceStore>) -> Self {
        let stored = |key: &str| store.get(key).filter(|v| !v.trim().is_empty());
        let model = stored(MODEL_KEY).unwrap_or_else(|| config.model.clone());
        let endpoint = stored(API_URL_KEY).unwrap_or_else(|| config.endpoint.clone());

        Self {
            api: OllamaApi::new(
                &endpoint,
                Duration::from_secs(config.listing_timeout_seconds),
                Duration::from_secs(config.timeout_seconds),
            ),
            preferred: RwLock::new(model),
            fallback_models: config.fallback_models.clone(),
            options: GenerateOptions {
                temperature: config.temperature,
                top_p: config.top_p,
            },
            default_max_words: config.max_words,
            store,
        }
    }

    /// Uses the configured preference file, or keeps choices in memory
    pub fn from_config(config: &LLMConfig) -> Self {
        let store: Arc<dyn PreferenceStore> = match &config.preference_file {
            Some(path) => Arc::new(EnvFileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Self::new(config, store)
    }

    pub fn with_timeouts(mut self, listing: Duration, generate: Duration) -> Self {
        let base = self.api.base_url().to_string();
        self.api = OllamaApi::new(&base, listing, generate);
        self
    }

    pub fn endpoint(&self) -> &str {
        self.api.base_url()
    }

    pub fn default_max_words(&self) -> u32 {
        self.default_max_words
    }

    pub async fn preferred_model(&self) -> String {
        self.preferred.read().await.clone()
    }

    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        self.api.list_models().await
    }

    pub async fn summarize(&self, transcript: &str, max_words: u32) -> SummaryResult {
        if transcript.trim().is_empty() {
            warn!("Refusing to summarize an empty transcript");
            return SummaryResult::failure("Cannot summarize an empty transcript", None);
        }

        let preferred = self.preferred_model().await;
        info!(
            "📝 Summarizing {} characters with {} (preferred model: {})",
            transcript.len(),
            self.api.base_url(),
            preferred
        );

        let available = match self.api.list_models().await {
            Ok(models) => models,
            Err(e) => {
                error!("❌ Model listing failed: {}", e);
                return SummaryResult::failure(e.to_string(), None);
            }
        };
        info!("Available models: {:?}", available);

        let Some(choice) = select_model(&available, &preferred, &self.fallback_models) else {
            error!("❌ {}", NO_MODELS_MESSAGE);
            return SummaryResult::failure(NO_MODELS_MESSAGE, None);
        };

        if choice.reason != SelectionReason::Configured {
            warn!(
                "⚠️  Model {} not installed, using {} ({:?})",
                preferred, choice.name, choice.reason
            );
            self.remember(&choice.name).await;
        }

        let prompt = build_prompt(transcript, max_words);
        match self.api.generate(&choice.name, &prompt, self.options).await {
            Ok(response) => {
                info!(
                    "✅ Summary generated by {}: {} tokens",
                    choice.name, response.eval_count
                );
                SummaryResult::success(response.response.trim(), choice.name, response.eval_count)
            }
            Err(e) => {
                error!("❌ Summary generation with {} failed: {}", choice.name, e);
                SummaryResult::failure(e.to_string(), Some(choice.name))
            }
        }
    }

    async fn remember(&self, model: &str) {
        *self.preferred.write().await = model.to_string();

        let persisted = self
            .store
            .set(MODEL_KEY, model)
            .and_then(|_| self.store.set(API_URL_KEY, self.api.base_url()));
        match persisted {
            Ok(()) => info!("💾 Saved model preference {}", model),
            Err(e) => warn!("Failed to save model preference: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn config(endpoint: &str) -> LLMConfig {
        LLMConfig {
            endpoint: endpoint.to_string(),
            model: "preferred-model".to_string(),
            preference_file: None,
            ..LLMConfig::default()
        }
    }

    fn client(endpoint: &str) -> (SummarizationClient, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SummarizationClient::new(&config(endpoint), store.clone()), store)
    }

    #[test]
    fn test_select_prefers_configured_model() {
        let available = names(&["mistral", "preferred-model:latest"]);
        let fallbacks = LLMConfig::default().fallback_models;
        let choice = select_model(&available, "preferred-model", &fallbacks).unwrap();
        assert_eq!(choice.name, "preferred-model");
        assert_eq!(choice.reason, SelectionReason::Configured);
    }

    #[test]
    fn test_select_fallback_beats_first_listed() {
        let available = names(&["phi3", "mistral", "llama3:latest"]);
        let fallbacks = LLMConfig::default().fallback_models;
        let choice = select_model(&available, "gpt-oss", &fallbacks).unwrap();
        assert_eq!(choice.name, "llama3:latest");
        assert_eq!(choice.reason, SelectionReason::Fallback);
    }

    #[test]
    fn test_select_first_available_and_empty() {
        let fallbacks = LLMConfig::default().fallback_models;
        let choice = select_model(&names(&["phi3", "qwen2"]), "gpt-oss", &fallbacks).unwrap();
        assert_eq!(choice.name, "phi3");
        assert_eq!(choice.reason, SelectionReason::FirstAvailable);
        assert!(select_model(&[], "gpt-oss", &fallbacks).is_none());
    }

    #[test]
    fn test_stored_preferences_override_config() {
        let store = Arc::new(MemoryStore::new());
        store.set(MODEL_KEY, "mistral").unwrap();
        store.set(API_URL_KEY, "http://gpu-box:11434").unwrap();

        let client = SummarizationClient::new(&config("http://localhost:11434"), store);
        assert_eq!(client.endpoint(), "http://gpu-box:11434");
        assert_eq!(tokio_test::block_on(client.preferred_model()), "mistral");
    }

    #[tokio::test]
    async fn test_empty_listing_skips_generation() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": []}"#)
            .create_async()
            .await;
        let generate = server
            .mock("POST", "/api/generate")
            .expect(0)
            .create_async()
            .await;

        let (client, _) = client(&server.url());
        let result = client.summarize("some transcript text", 100).await;

        assert!(result.error_flag);
        assert_eq!(result.summary_text, NO_MODELS_MESSAGE);
        generate.assert_async().await;
    }

    #[tokio::test]
    async fn test_long_transcript_sent_in_one_request() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_body(r#"{"models": [{"name": "preferred-model"}]}"#)
            .create_async()
            .await;
        let generate = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::Regex("tail-marker".to_string()))
            .with_body(r#"{"response": "Long talk.", "eval_count": 2}"#)
            .expect(1)
            .create_async()
            .await;

        let transcript = format!("{} tail-marker", "word ".repeat(100_000));
        let (client, _) = client(&server.url());
        let result = client.summarize(&transcript, 50).await;

        assert!(!result.error_flag);
        assert_eq!(result.summary_text, "Long talk.");
        generate.assert_async().await;
    }

    #[tokio::test]
    async fn test_fallback_model_used_and_persisted() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": [{"name": "phi3"}, {"name": "llama3:latest"}]}"#)
            .create_async()
            .await;
        let generate = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3:latest",
                "stream": false,
                "options": {"temperature": 0.3, "top_p": 0.9}
            })))
            .with_status(200)
            .with_body(r#"{"response": "  A short summary. ", "eval_count": 42}"#)
            .create_async()
            .await;

        let (client, store) = client(&server.url());
        let result = client.summarize("the full transcript", 50).await;

        generate.assert_async().await;
        assert!(!result.error_flag);
        assert_eq!(result.summary_text, "A short summary.");
        assert_eq!(result.selected_model_name.as_deref(), Some("llama3:latest"));
        assert_eq!(result.generated_token_count, 42);
        assert_eq!(store.get(MODEL_KEY).as_deref(), Some("llama3:latest"));
        assert_eq!(store.get(API_URL_KEY).as_deref(), Some(client.endpoint()));
        assert_eq!(client.preferred_model().await, "llama3:latest");
    }

    struct ReadOnlyStore;

    impl PreferenceStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn set(&self, _key: &str, _value: &str) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only preference file",
            ))
        }
    }

    #[tokio::test]
    async fn test_unsaved_preference_does_not_fail_summary() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_body(r#"{"models": [{"name": "mistral"}]}"#)
            .create_async()
            .await;
        let _generate = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"model": "mistral"})))
            .with_body(r#"{"response": "Saved nothing.", "eval_count": 4}"#)
            .create_async()
            .await;

        let client = SummarizationClient::new(&config(&server.url()), Arc::new(ReadOnlyStore));
        let result = client.summarize("the full transcript", 50).await;

        assert!(!result.error_flag);
        assert_eq!(result.summary_text, "Saved nothing.");
        assert_eq!(result.selected_model_name.as_deref(), Some("mistral"));
        assert_eq!(client.preferred_model().await, "mistral");
    }

    #[tokio::test]
    async fn test_configured_model_is_not_persisted() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_body(r#"{"models": [{"name": "preferred-model"}]}"#)
            .create_async()
            .await;
        let _generate = server
            .mock("POST", "/api/generate")
            .with_body(r#"{"response": "ok"}"#)
            .create_async()
            .await;

        let (client, store) = client(&server.url());
        let result = client.summarize("text", 50).await;
        assert!(!result.error_flag);
        assert_eq!(result.generated_token_count, 0);
        assert_eq!(store.get(MODEL_KEY), None);
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let (client, _) = client("http://127.0.0.1:1");
        let result = client.summarize("text", 50).await;
        assert!(result.error_flag);
        assert!(result
            .summary_text
            .starts_with("Error connecting to inference server"));
    }

    #[tokio::test]
    async fn test_listing_status_error() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_status(503)
            .create_async()
            .await;

        let (client, _) = client(&server.url());
        let result = client.summarize("text", 50).await;
        assert!(result.error_flag);
        assert!(result.summary_text.contains("returned status 503"));
    }

    #[tokio::test]
    async fn test_generation_errors_become_results() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_body(r#"{"models": [{"name": "preferred-model"}]}"#)
            .create_async()
            .await;
        let failing = server
            .mock("POST", "/api/generate")
            .with_status(500)
            .with_body("model crashed")
            .create_async()
            .await;

        let (client, _) = client(&server.url());
        let result = client.summarize("text", 50).await;
        assert!(result.error_flag);
        assert!(result.summary_text.contains("500"));
        assert!(result.summary_text.contains("model crashed"));
        failing.remove_async().await;

        let _garbled = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;
        let result = client.summarize("text", 50).await;
        assert!(result.error_flag);
        assert!(result.summary_text.starts_with("Failed to parse inference server response"));
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let mut server = Server::new_async().await;
        let _tags = server
            .mock("GET", "/api/tags")
            .with_body(r#"{"models": [{"name": "preferred-model"}]}"#)
            .create_async()
            .await;
        let _slow = server
            .mock("POST", "/api/generate")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(2));
                w.write_all(br#"{"response": "late"}"#)
            })
            .create_async()
            .await;

        let (client, _) = client(&server.url());
        let client = client.with_timeouts(Duration::from_secs(5), Duration::from_millis(200));
        let result = client.summarize("a very long transcript", 50).await;
        assert!(result.error_flag);
        assert_eq!(
            result.summary_text,
            "Timeout while generating summary. The transcript may be too long."
        );
    }

    #[tokio::test]
    async fn test_blank_transcript_never_contacts_server() {
        let mut server = Server::new_async().await;
        let tags = server
            .mock("GET", "/api/tags")
            .expect(0)
            .create_async()
            .await;

        let (client, _) = client(&server.url());
        let result = client.summarize("   \n\t", 50).await;
        assert!(result.error_flag);
        tags.assert_async().await;
    }

    #[test]
    fn test_prompt_mentions_word_limit() {
        let prompt = build_prompt("hello", 123);
        assert!(prompt.contains("under 123 words"));
        assert!(prompt.ends_with("TRANSCRIPT:\nhello\n\nSUMMARY:"));
    }
}
