//! LLM error types.

use reverie_core::oracle::OracleError;
use thiserror::Error;

/// Errors that can occur while talking to a language model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// LLM response was not valid JSON.
    #[error("Failed to parse LLM response as JSON: {0}")]
    ParseError(String),

    /// LLM response parsed but did not make sense for the decision.
    #[error("LLM output schema validation failed: {0}")]
    SchemaValidation(String),

    /// Request timed out.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// LLM provider is unavailable.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("All LLM retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The final failure.
        last_error: String,
    },

    /// Configuration error.
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}

impl From<LlmError> for OracleError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ParseError(_) | LlmError::SchemaValidation(_) => {
                OracleError::InvalidResponse(err.to_string())
            }
            LlmError::RetriesExhausted {
                attempts,
                last_error,
            } => OracleError::RetriesExhausted {
                attempts,
                last_error,
            },
            LlmError::RequestFailed(_)
            | LlmError::Timeout(_)
            | LlmError::Unavailable(_)
            | LlmError::ConfigError(_) => OracleError::Unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_become_invalid_responses() {
        let e: OracleError = LlmError::ParseError("expected value".into()).into();
        assert!(matches!(e, OracleError::InvalidResponse(ref m) if m.contains("expected value")));
        let e: OracleError = LlmError::SchemaValidation("hour 31".into()).into();
        assert!(matches!(e, OracleError::InvalidResponse(_)));
    }

    #[test]
    fn transport_failures_become_unavailable() {
        let e: OracleError = LlmError::Timeout(500).into();
        assert!(matches!(e, OracleError::Unavailable(ref m) if m.contains("500ms")));
        let e: OracleError = LlmError::RetriesExhausted {
            attempts: 3,
            last_error: "HTTP 502".into(),
        }
        .into();
        assert_eq!(
            e,
            OracleError::RetriesExhausted {
                attempts: 3,
                last_error: "HTTP 502".into()
            }
        );
    }
}
