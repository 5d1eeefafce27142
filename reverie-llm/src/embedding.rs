//! [`EmbeddingProvider`] backed by the configured model API.
//!
//! Ollama is asked through `/api/embeddings`, OpenAI-compatible servers
//! through `/v1/embeddings`. The engine caches each vector under its
//! embedding key, so a text is only sent once per memory store.

use std::sync::atomic::{AtomicUsize, Ordering};

use reverie_core::config::ReverieConfig;
use reverie_core::embedding::EmbeddingProvider;
use reverie_core::oracle::OracleError;
use reverie_core::{Embedding, ReverieError};
use tracing::debug;

use crate::bridge::Blocking;
use crate::client::LlmClient;
use crate::error::LlmError;
use crate::oracle::TRANSPORT_RETRIES;

/// Sent in place of an empty text; the endpoints reject empty input.
const BLANK_TEXT: &str = "this is blank";

/// Embeddings from a language-model server.
pub struct LlmEmbeddingProvider {
    client: LlmClient,
    model: String,
    timeout_ms: u64,
    /// Length of the last vector returned; zero before the first call.
    dims: AtomicUsize,
    bridge: Blocking,
}

impl std::fmt::Debug for LlmEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmEmbeddingProvider")
            .field("client", &self.client)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmEmbeddingProvider {
    /// Embed with `model` through `client`.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` if `client` has no backend or the
    /// fallback runtime cannot start.
    pub fn new(client: LlmClient, model: impl Into<String>) -> Result<Self, LlmError> {
        if !client.is_available() {
            return Err(LlmError::ConfigError("embeddings need an LLM provider".into()));
        }
        Ok(Self {
            client,
            model: model.into(),
            timeout_ms: 30_000,
            dims: AtomicUsize::new(0),
            bridge: Blocking::new()?,
        })
    }

    /// Build a provider from the `[llm]` section, using `embedding_model`.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` for a bad or absent provider or a
    /// missing key.
    pub fn from_config(config: &ReverieConfig) -> Result<Self, LlmError> {
        let client = LlmClient::from_config(&config.llm, TRANSPORT_RETRIES)?;
        let mut provider = Self::new(client, config.llm.embedding_model.clone())?;
        provider.timeout_ms = config.llm.request_timeout_ms;
        Ok(provider)
    }
}

impl EmbeddingProvider for LlmEmbeddingProvider {
    fn embed(&self, text: &str) -> reverie_core::Result<Embedding> {
        let input = embedding_input(text);
        let vector = self
            .bridge
            .block_on(self.client.embed(&self.model, &input, self.timeout_ms))
            .map_err(|e| ReverieError::Oracle(OracleError::from(e)))?;
        self.dims.store(vector.len(), Ordering::Relaxed);
        debug!(model = %self.model, dims = vector.len(), "Text embedded");
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.dims.load(Ordering::Relaxed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Newlines flattened; blank text replaced by a fixed phrase.
fn embedding_input(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.trim().is_empty() {
        BLANK_TEXT.to_string()
    } else {
        flat
    }
}
