//! # reverie-sim
//!
//! Drives a reverie town forward in time.
//!
//! ```text
//!   mover (renderer / path follower)
//!        │ positions            ▲ movement records
//!        ▼                      │
//!   ┌──────────────────────────────────┐
//!   │ Simulation                        │
//!   │   accidents ─▶ WorldMap ◀─┐       │
//!   │   agents ──▶ CognitionEngine      │
//!   │                 │                 │
//!   │                 ▼                 │
//!   │         CognitionOracle           │
//!   └──────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `orchestrator`: the tick loop, saving and resuming
//! - `mover`: the external positioning seam (files or headless)
//! - `movement`: per-step records exchanged with the renderer
//! - `accidents`: scheduled fires

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accidents;
pub mod error;
pub mod movement;
pub mod mover;
pub mod orchestrator;

pub use accidents::AccidentSchedule;
pub use error::SimError;
pub use movement::{AgentMovement, MovementRecord};
pub use mover::{FileMover, Mover, PathFollower};
pub use orchestrator::Simulation;
