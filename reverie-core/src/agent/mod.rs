//! Agents: scratch state, associative memory and spatial knowledge.
//!
//! An [`Agent`] bundles the three stores one persona owns. On disk it is a
//! directory:
//!
//! ```text
//! {dir}/spatial_memory.json
//! {dir}/associative_memory/{nodes,kw_strength,embeddings}.json
//! {dir}/scratch.json
//! ```

pub mod schedule;
pub mod scratch;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::memory::{MemorySnapshot, MemoryStore, SpatialMemory};

pub use schedule::{ReactionWindow, ScheduleEntry, WindowPlan};
pub use scratch::{AgentState, CHAT_PREDICATE, NewAction};

/// One simulated persona.
#[derive(Debug, Clone, Default)]
pub struct Agent {
    /// Short-term state.
    pub scratch: AgentState,
    /// Associative memory.
    pub memory: MemoryStore,
    /// Known locations.
    pub spatial: SpatialMemory,
}

impl Agent {
    /// An agent with empty memories.
    #[must_use]
    pub fn new(scratch: AgentState) -> Self {
        Self {
            scratch,
            memory: MemoryStore::new(),
            spatial: SpatialMemory::new(),
        }
    }

    /// Agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.scratch.name
    }

    /// Write the agent's three stores under `dir`.
    ///
    /// # Errors
    /// Returns an I/O or serialization error.
    pub fn save_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.spatial.save(&dir.join("spatial_memory.json"))?;
        self.memory.save_dir(&dir.join("associative_memory"))?;
        std::fs::write(dir.join("scratch.json"), serde_json::to_string_pretty(&self.scratch)?)?;
        Ok(())
    }

    /// Load an agent written by [`Agent::save_dir`].
    ///
    /// # Errors
    /// Returns an I/O error for missing files, or a serialization error.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let scratch: AgentState =
            serde_json::from_str(&std::fs::read_to_string(dir.join("scratch.json"))?)?;
        let spatial = SpatialMemory::load(&dir.join("spatial_memory.json"))?;
        let memory = MemoryStore::load_dir(&dir.join("associative_memory"))?;
        info!(agent = %scratch.name, nodes = memory.len(), "Agent loaded");
        Ok(Self {
            scratch,
            memory,
            spatial,
        })
    }
}

/// Serializable image of an [`Agent`], as kept in the SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Short-term state.
    pub scratch: AgentState,
    /// Associative memory.
    pub memory: MemorySnapshot,
    /// Known locations.
    pub spatial: SpatialMemory,
}

impl Agent {
    /// Capture all three stores.
    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            scratch: self.scratch.clone(),
            memory: self.memory.snapshot(),
            spatial: self.spatial.clone(),
        }
    }

    /// Rebuild an agent from a snapshot.
    ///
    /// # Errors
    /// Returns `ReverieError::NodeNotFound` if the memory nodes are not
    /// numbered contiguously.
    pub fn from_snapshot(snapshot: AgentSnapshot) -> Result<Self> {
        Ok(Self {
            scratch: snapshot.scratch,
            memory: MemoryStore::from_snapshot(snapshot.memory)?,
            spatial: snapshot.spatial,
        })
    }
}

/// Mutable borrows of two distinct agents.
///
/// # Panics
/// Panics if `a == b` or either index is out of range.
pub fn two_mut(agents: &mut [Agent], a: usize, b: usize) -> (&mut Agent, &mut Agent) {
    assert_ne!(a, b, "two_mut needs distinct agents");
    if a < b {
        let (lo, hi) = agents.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = agents.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}
