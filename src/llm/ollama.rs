//! Minimal client for an Ollama-compatible inference server

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Failures talking to the inference server
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Error connecting to inference server: {0}")]
    Connect(String),

    #[error("Inference server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timeout while generating summary. The transcript may be too long.")]
    Timeout,

    #[error("Failed to parse inference server response: {0}")]
    Parse(String),
}

/// Sampling parameters sent with each generation request
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Debug, Clone)]
pub struct OllamaApi {
    client: reqwest::Client,
    base_url: String,
    listing_timeout: Duration,
    generate_timeout: Duration,
}

impl OllamaApi {
    pub fn new(base_url: &str, listing_timeout: Duration, generate_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            listing_timeout,
            generate_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models the server has installed, in server order
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        debug!("Listing models at {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.listing_timeout)
            .send()
            .await
            .map_err(|e| InferenceError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Single non-streaming completion
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<GenerateResponse, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options,
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.generate_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else {
                    InferenceError::Connect(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout
            } else {
                InferenceError::Parse(e.to_string())
            }
        })
    }
}
