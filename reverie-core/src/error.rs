//! Error types for the reverie core library.

use thiserror::Error;

/// Top-level error type for all engine operations.
#[derive(Error, Debug)]
pub enum ReverieError {
    /// A world bootstrap file is malformed (grid sizes, unknown tokens).
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// No agent with this name is part of the simulation.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// A memory node id does not resolve in this store.
    #[error("Memory node not found: node_{0}")]
    NodeNotFound(usize),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The cognition oracle failed and no default applies.
    #[error("Oracle error: {0}")]
    Oracle(#[from] crate::oracle::OracleError),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ReverieError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ReverieError>;
