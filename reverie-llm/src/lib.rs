//! # reverie-llm
//!
//! A [`CognitionOracle`](reverie_core::CognitionOracle) that asks a language
//! model for every decision the engine delegates.
//!
//! Backends:
//!   - **Ollama** (local, default)
//!   - **OpenAI-compatible API**
//!
//! Memory embeddings can come from the same server through
//! [`LlmEmbeddingProvider`].
//!
//! Every call is a single JSON-mode request whose reply is parsed into a
//! typed struct and checked before it reaches the engine. Failures surface
//! as [`OracleError`](reverie_core::OracleError)s, which the engine retries
//! and then replaces with its defaults.
//!
//! ```text
//! decision ──▶ PromptEngine ──▶ LlmClient ──▶ JSON reply ──▶ checked value
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod bridge;
pub mod client;
pub mod embedding;
pub mod error;
pub mod oracle;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use embedding::LlmEmbeddingProvider;
pub use error::LlmError;
pub use oracle::{LlmOracle, OracleStats};
pub use prompt::PromptEngine;
pub use types::{LlmRequest, LlmResponse};
