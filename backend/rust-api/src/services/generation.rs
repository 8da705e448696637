use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationSettings;
use crate::metrics::PROVIDER_REQUEST_DURATION_SECONDS;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("provider timed out after {0}s")]
    Timeout(u64),
}

/// Text-completion backend behind the sprint engine. Implementations return
/// the raw completion string; parsing it is the normalizer's job.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpGenerationClient {
    pub fn new(settings: &GenerationSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to create generation HTTP client")?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            timeout_secs: settings.timeout_secs,
        })
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.endpoint);

        let payload = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
        };

        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let started = std::time::Instant::now();
        let result = request.send().await;
        PROVIDER_REQUEST_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_secs)
            } else {
                GenerationError::Unavailable(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        // 5xx and 429 are retryable provider trouble; other 4xx means the
        // request itself is bad and a retry would fail the same way.
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(GenerationError::Unavailable(format!(
                "provider returned {}",
                status
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Rejected(format!(
                "provider returned {}: {}",
                status,
                truncate(&error_text, 200)
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            GenerationError::Rejected(format!("provider response was not valid JSON: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(GenerationError::Rejected(
                "provider returned an empty completion".to_string(),
            ));
        }

        Ok(content)
    }
}

/// Scripted provider for tests. Returns queued responses in order and counts
/// calls so retry behavior can be asserted exactly; an exhausted script is a
/// loud failure rather than a silent repeat.
pub struct ScriptedProvider {
    responses: tokio::sync::Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().await;
        match responses.pop_front() {
            Some(response) => response,
            None => Err(GenerationError::Unavailable(
                "script exhausted".to_string(),
            )),
        }
    }
}
