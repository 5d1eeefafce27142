//! LLM client: one interface over Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use reqwest::Client;
use reverie_core::config::LlmConfig;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// e.g. `http://localhost:11434`
        base_url: String,
    },
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available; every call fails and the engine uses its defaults.
    None,
}

/// Routes requests to the configured backend.
#[derive(Debug)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// Create a client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// Build a client from the `[llm]` config section.
    ///
    /// The OpenAI key is read from the environment variable named by
    /// `api_key_env`.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` for an unknown provider or a
    /// missing API key.
    pub fn from_config(config: &LlmConfig, max_retries: u32) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let provider = match config.provider.as_str() {
            "ollama" => LlmProvider::Ollama { base_url },
            "openai" => {
                let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                    LlmError::ConfigError(format!("environment variable {} is not set", config.api_key_env))
                })?;
                LlmProvider::OpenAiCompatible { base_url, api_key }
            }
            "none" => LlmProvider::None,
            other => return Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        };
        Ok(Self::new(provider, config.model.clone(), max_retries))
    }

    /// Model name sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a response from the LLM.
    ///
    /// # Errors
    /// Returns `Err` if the LLM is unavailable or all retries fail.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    /// Generate using Ollama's API.
    async fn generate_ollama(&self, base_url: &str, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{base_url}/api/generate");
        let mut body = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.user,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });
        if request.json_mode {
            body["format"] = json!("json");
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, of = self.max_retries + 1, "Retrying Ollama call");
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .json(&body)
                .timeout(Duration::from_millis(request.timeout_ms))
                .send()
                .await;
            let latency_ms = elapsed_ms(start);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: serde_json::Value =
                        resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()))?;
                    return Ok(LlmResponse {
                        text: json["response"].as_str().unwrap_or_default().to_string(),
                        tokens_generated: token_count(&json["eval_count"]),
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}: {}", resp.status(), resp.text().await.unwrap_or_default());
                    warn!(error = %last_error, "Ollama returned error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(timeout_ms = request.timeout_ms, "Ollama request timed out");
                    } else {
                        warn!(error = %last_error, "Ollama request failed");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Generate using an OpenAI-compatible API.
    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        let url = format!("{base_url}/v1/chat/completions");
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, of = self.max_retries + 1, "Retrying OpenAI call");
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .bearer_auth(api_key)
                .json(&body)
                .timeout(Duration::from_millis(request.timeout_ms))
                .send()
                .await;
            let latency_ms = elapsed_ms(start);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: serde_json::Value =
                        resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()))?;
                    return Ok(LlmResponse {
                        text: json["choices"][0]["message"]["content"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                        tokens_generated: token_count(&json["usage"]["completion_tokens"]),
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!(error = %last_error, "OpenAI API returned error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(error = %last_error, "OpenAI API request failed");
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Embed `text` with `model` through the backend's embeddings endpoint.
    ///
    /// # Errors
    /// Returns `Err` if no backend is configured, every attempt fails, or
    /// the reply holds no vector.
    pub async fn embed(&self, model: &str, text: &str, timeout_ms: u64) -> Result<Vec<f32>, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let url = format!("{base_url}/api/embeddings");
                let body = json!({ "model": model, "prompt": text });
                let reply = self.post_json(&url, None, &body, timeout_ms).await?;
                parse_ollama_embedding(reply)
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let url = format!("{base_url}/v1/embeddings");
                let body = json!({ "model": model, "input": [text] });
                let reply = self.post_json(&url, Some(api_key), &body, timeout_ms).await?;
                parse_openai_embedding(reply)
            }
        }
    }

    /// POST `body` with retries and return the JSON reply.
    async fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<serde_json::Value, LlmError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, of = self.max_retries + 1, %url, "Retrying LLM call");
            }
            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(timeout_ms));
            if let Some(key) = bearer {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()));
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!(error = %last_error, %url, "LLM endpoint returned error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(error = %last_error, %url, "LLM request failed");
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Parse a raw response as structured JSON.
    ///
    /// Models often wrap the object in prose or a code fence, so the
    /// outermost `{...}` is extracted first.
    ///
    /// # Errors
    /// Returns `LlmError::ParseError` if no object is found or it does not
    /// match `T`.
    pub fn parse_structured<T: serde::de::DeserializeOwned>(response: &LlmResponse) -> Result<T, LlmError> {
        let body = extract_json(&response.text)
            .ok_or_else(|| LlmError::ParseError(format!("no JSON object in '{}'", response.text)))?;
        serde_json::from_str(body)
            .map_err(|e| LlmError::ParseError(format!("{e}; raw text: '{}'", response.text)))
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }
}

/// The outermost `{...}` span of `text`.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// `{"embedding": [...]}`: an Ollama reply, or one OpenAI `data` entry.
#[derive(Deserialize)]
struct VectorReply {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddings {
    data: Vec<VectorReply>,
}

/// Vector from an Ollama `/api/embeddings` reply.
fn parse_ollama_embedding(reply: serde_json::Value) -> Result<Vec<f32>, LlmError> {
    let parsed: VectorReply = serde_json::from_value(reply).map_err(|e| LlmError::ParseError(e.to_string()))?;
    non_empty(parsed.embedding)
}

/// First vector from an OpenAI `/v1/embeddings` reply.
fn parse_openai_embedding(reply: serde_json::Value) -> Result<Vec<f32>, LlmError> {
    let parsed: OpenAiEmbeddings = serde_json::from_value(reply).map_err(|e| LlmError::ParseError(e.to_string()))?;
    let first = parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::SchemaValidation("no embedding in reply".into()))?;
    non_empty(first.embedding)
}

fn non_empty(vector: Vec<f32>) -> Result<Vec<f32>, LlmError> {
    if vector.is_empty() {
        Err(LlmError::SchemaValidation("empty embedding".into()))
    } else {
        Ok(vector)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn token_count(value: &serde_json::Value) -> u32 {
    value.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0)
}
