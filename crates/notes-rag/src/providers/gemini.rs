//! Gemini client for answer generation via the Generative Language API
//!
//! [`GeminiClient::connect`] probes the primary model with a tiny prompt and
//! falls back to the secondary model when the probe fails, so a session only
//! ever holds a client that has answered at least once.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::llm::LlmProvider;

/// Probe sent to the primary model
pub const PRIMARY_PROBE: &str = "Say 'TEST OK' in one word.";
/// Probe sent to the fallback model
pub const FALLBACK_PROBE: &str = "Test";

/// Longest wait between retries
const MAX_BACKOFF_SECS: u64 = 60;

/// Gemini API client with optional retry
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    max_retries: u32,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Delay before retry `attempt` (0-based): 1s, 2s, 4s, ... capped at a minute
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS))
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiClient {
    /// Create a client for one model without contacting the API
    pub fn new(config: &LlmConfig, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let mut builder = Client::builder().pool_max_idle_per_host(5);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
        })
    }

    /// Connect to the first model that answers its probe
    ///
    /// Fails with [`Error::BackendUnavailable`] when generation is disabled,
    /// no API key is configured, or every candidate model fails.
    pub async fn connect(config: &LlmConfig) -> Result<Self> {
        if !config.enabled {
            return Err(Error::BackendUnavailable("generation is disabled".to_string()));
        }

        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::BackendUnavailable("no Gemini API key configured".to_string()))?;

        let primary = Self::new(config, api_key, &config.primary_model)?;
        let primary_err = match primary.probe(PRIMARY_PROBE).await {
            Ok(()) => {
                tracing::info!("Connected to Gemini model {}", primary.model);
                return Ok(primary);
            }
            Err(e) => e,
        };

        let Some(fallback_model) = config.fallback_model.as_deref() else {
            return Err(Error::BackendUnavailable(format!(
                "{}: {}",
                config.primary_model, primary_err
            )));
        };

        tracing::warn!(
            "Gemini model {} failed its probe ({}), trying {}",
            config.primary_model,
            primary_err,
            fallback_model
        );

        let fallback = Self::new(config, api_key, fallback_model)?;
        match fallback.probe(FALLBACK_PROBE).await {
            Ok(()) => {
                tracing::info!("Connected to fallback Gemini model {}", fallback.model);
                Ok(fallback)
            }
            Err(fallback_err) => Err(Error::BackendUnavailable(format!(
                "{}: {}; {}: {}",
                config.primary_model, primary_err, fallback_model, fallback_err
            ))),
        }
    }

    /// Liveness check: the model must return some text
    async fn probe(&self, prompt: &str) -> Result<()> {
        let reply = self.generate_once(prompt).await?;
        if reply.trim().is_empty() {
            return Err(Error::llm("empty reply to probe"));
        }
        tracing::debug!("Probe reply from {}: {}", self.model, reply.trim());
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = backoff_delay(attempt);
                        tracing::warn!(
                            "Gemini request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Llm("Unknown error".to_string())))
    }

    /// Send one generateContent request; the text of all parts of the
    /// first candidate is concatenated and may be empty
    async fn generate_once(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(Error::Llm(format!(
                "Gemini generation failed ({}): {}",
                status, message
            )));
        }

        let gen_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Failed to parse Gemini response: {}", e)))?;

        Ok(gen_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.retry_request(|| self.generate_once(prompt)).await
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct MockState {
        failing_models: Vec<String>,
        calls: Arc<Mutex<Vec<(String, String)>>>,
    }

    async fn mock_generate(
        State(state): State<MockState>,
        Path(call): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let model = call.split(':').next().unwrap_or_default().to_string();
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        state.calls.lock().push((model.clone(), prompt));

        if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"error": {"message": "API key not valid"}})),
            );
        }
        if state.failing_models.contains(&model) {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"message": format!("models/{} is not found", model)}})),
            );
        }

        (
            StatusCode::OK,
            Json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "TEST "}, {"text": "OK"}]}}]
            })),
        )
    }

    async fn spawn_mock(state: MockState) -> String {
        let app = Router::new()
            .route("/models/:call", post(mock_generate))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            api_key: Some("test-key".to_string()),
            base_url,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_uses_primary_when_probe_succeeds() {
        let state = MockState::default();
        let base_url = spawn_mock(state.clone()).await;

        let client = GeminiClient::connect(&config(base_url)).await.unwrap();

        assert_eq!(client.model(), "gemini-2.0-flash");
        let calls = state.calls.lock().clone();
        assert_eq!(calls, vec![("gemini-2.0-flash".to_string(), PRIMARY_PROBE.to_string())]);
        assert_eq!(client.generate("hello").await.unwrap(), "TEST OK");
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_secondary_model() {
        let state = MockState {
            failing_models: vec!["gemini-2.0-flash".to_string()],
            ..MockState::default()
        };
        let base_url = spawn_mock(state.clone()).await;

        let client = GeminiClient::connect(&config(base_url)).await.unwrap();

        assert_eq!(client.model(), "gemini-2.0-flash-lite");
        let calls = state.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, FALLBACK_PROBE);
    }

    #[tokio::test]
    async fn test_connect_fails_when_both_models_fail() {
        let state = MockState {
            failing_models: vec!["gemini-2.0-flash".to_string(), "gemini-2.0-flash-lite".to_string()],
            ..MockState::default()
        };
        let base_url = spawn_mock(state).await;

        let err = GeminiClient::connect(&config(base_url)).await.unwrap_err();

        match err {
            Error::BackendUnavailable(message) => {
                assert!(message.contains("gemini-2.0-flash-lite"));
                assert!(message.contains("is not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connect_without_key_makes_no_request() {
        let state = MockState::default();
        let base_url = spawn_mock(state.clone()).await;
        let mut config = config(base_url);
        config.api_key = None;

        let err = GeminiClient::connect(&config).await.unwrap_err();

        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert!(state.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_generate_surfaces_api_error_message() {
        let state = MockState::default();
        let base_url = spawn_mock(state).await;
        let config = config(base_url);
        let client = GeminiClient::new(&config, "wrong-key", "gemini-2.0-flash").unwrap();

        let err = client.generate("question").await.unwrap_err();

        assert!(matches!(err, Error::Llm(ref m) if m.contains("API key not valid")));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = LlmConfig::default();
        let client = GeminiClient::new(&config, "secret-key-123", "gemini-2.0-flash").unwrap();

        let printed = format!("{:?}", client);

        assert!(!printed.contains("secret-key-123"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("gemini-2.0-flash"));
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(6), Duration::from_secs(MAX_BACKOFF_SECS));
        assert_eq!(backoff_delay(64), Duration::from_secs(MAX_BACKOFF_SECS));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(MAX_BACKOFF_SECS));
    }

}
