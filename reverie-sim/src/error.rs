//! Simulation error types.

use reverie_core::ReverieError;
use thiserror::Error;

/// Errors raised while driving the tick loop.
#[derive(Error, Debug)]
pub enum SimError {
    /// Engine, persistence or bootstrap failure.
    #[error(transparent)]
    Core(#[from] ReverieError),

    /// The run was cancelled through the abort channel.
    #[error("simulation aborted at step {step}")]
    Aborted {
        /// Step that was waiting when the abort arrived.
        step: u64,
    },

    /// The mover supplied no positions in time.
    #[error("no movement input for step {step} after {waited_ms}ms")]
    MoverTimeout {
        /// Step being waited for.
        step: u64,
        /// How long we waited.
        waited_ms: u64,
    },

    /// The mover's input could not be read or understood.
    #[error("mover error: {0}")]
    Mover(String),

    /// An agent has no position to start the tick from.
    #[error("no position for agent {0}")]
    MissingPosition(String),
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        Self::Core(ReverieError::Io(err))
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        Self::Mover(err.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SimError>;
