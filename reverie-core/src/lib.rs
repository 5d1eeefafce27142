//! # Reverie Core Library
//!
//! Engine for simulating a small town of generative agents on a tile world.
//!
//! Each agent owns three stores:
//!
//! - **Scratch**: identity, the day's schedule and the current action
//! - **Associative memory**: events, thoughts and chats with embeddings
//! - **Spatial memory**: the world → sector → arena → object tree it has seen
//!
//! Every tick an agent runs perceive → retrieve → plan → reflect → execute
//! against the shared [`WorldMap`]. Content decisions (what to do next, how
//! poignant an event is, what to say) are delegated to a
//! [`CognitionOracle`]; the engine keeps every schedule, memory and world
//! invariant itself and falls back to safe defaults when the oracle fails.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod cognition;
pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod oracle;
pub mod persistence;
pub mod retrieval;
pub mod types;
pub mod world;

pub use agent::{Agent, AgentSnapshot, AgentState, ScheduleEntry};
pub use cognition::{CognitionEngine, IncidentLog, NewDay, StepOutcome};
pub use config::ReverieConfig;
pub use embedding::{EmbeddingProvider, HashingEmbeddingProvider};
pub use error::{Result, ReverieError};
pub use memory::{MemoryStore, SpatialMemory};
pub use oracle::{CognitionOracle, OracleError, StubOracle};
pub use persistence::{PersistenceEngine, SimMeta};
pub use retrieval::RetrievalEngine;
pub use types::*;
pub use world::{WorldBootstrap, WorldMap};
