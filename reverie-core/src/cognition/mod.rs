//! The cognitive loop: what one agent does with one tick.
//!
//! ```text
//! perceive → retrieve → plan (+ react) → reflect → execute
//! ```
//!
//! [`CognitionEngine::step`] runs the loop for a single agent against the
//! shared world and returns where the agent wants to be next tick. The
//! engine owns the oracle, the embedder, the retrieval scorer, a seedable
//! RNG and the accident [`IncidentLog`]; agents and the world are borrowed
//! for the duration of the call.

mod accident;
mod execute;
mod perceive;
mod plan;
mod react;
mod reflect;
mod retrieve;

pub use accident::{FIRE_PREDICATE, FIRE_STATE, IncidentLog, fire_event, is_resolved};
pub use retrieve::Retrieved;

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::config::ReverieConfig;
use crate::embedding::EmbeddingProvider;
use crate::memory::MemoryStore;
use crate::oracle::{CognitionOracle, Decision, OracleResult, consult_or};
use crate::retrieval::RetrievalEngine;
use crate::types::{Coord, Embedding, SimTime};
use crate::world::WorldMap;

/// What an agent hands back to the orchestrator after its step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Tile the agent moves to next.
    pub next_tile: Coord,
    /// Icon for the renderer.
    pub pronunciatio: String,
    /// `"{activity} @ {address}"`.
    pub description: String,
}

/// Which kind of day boundary a step crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewDay {
    /// The agent has never stepped before.
    First,
    /// The date changed since the agent's last step.
    Next,
}

impl NewDay {
    /// Classify the move from `previous` to `now`.
    #[must_use]
    pub fn between(previous: Option<SimTime>, now: SimTime) -> Option<Self> {
        match previous {
            None => Some(Self::First),
            Some(prev) if prev.date() != now.date() => Some(Self::Next),
            Some(_) => None,
        }
    }
}

/// Runs the cognitive loop for agents.
pub struct CognitionEngine {
    oracle: Arc<dyn CognitionOracle>,
    embedder: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalEngine,
    max_retries: u32,
    rng: StdRng,
    incidents: IncidentLog,
}

impl CognitionEngine {
    /// Build an engine from configuration.
    ///
    /// Without a configured seed the RNG is seeded from entropy.
    #[must_use]
    pub fn new(
        oracle: Arc<dyn CognitionOracle>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &ReverieConfig,
    ) -> Self {
        let rng = config
            .simulation
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            oracle,
            embedder,
            retrieval: RetrievalEngine::new(config.retrieval.clone()),
            max_retries: config.oracle.max_retries,
            rng,
            incidents: IncidentLog::default(),
        }
    }

    /// Reseed the RNG used for focus selection and tile sampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Open accident incidents.
    #[must_use]
    pub fn incidents(&self) -> &IncidentLog {
        &self.incidents
    }

    /// The retrieval scorer.
    #[must_use]
    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    /// Run one tick for `agents[idx]`, who now stands on `tile`.
    ///
    /// The agent's own action for the next tick is decided here; chat
    /// reactions may also rewrite the partner's action.
    ///
    /// # Panics
    /// Panics if `idx` is out of range or `tile` is off the grid.
    pub fn step(
        &mut self,
        agents: &mut [Agent],
        idx: usize,
        world: &mut WorldMap,
        tile: Coord,
        now: SimTime,
    ) -> StepOutcome {
        let new_day = {
            let scratch = &mut agents[idx].scratch;
            scratch.curr_tile = Some(tile);
            let new_day = NewDay::between(scratch.curr_time, now);
            scratch.curr_time = Some(now);
            new_day
        };
        debug!(agent = %agents[idx].name(), tile = ?tile, ?new_day, "Agent step");

        let perceived = self.perceive(&mut agents[idx], world);
        let retrieved = retrieve::around_perceptions(&agents[idx].memory, &perceived);
        self.plan(agents, idx, world, new_day, &retrieved);
        self.reflect(&mut agents[idx]);
        self.execute(agents, idx, world, tile)
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Ask the oracle, retrying, and fall back to `fallback`.
    fn ask<T>(
        &self,
        decision: Decision,
        fallback: T,
        mut call: impl FnMut(&dyn CognitionOracle) -> OracleResult<T>,
    ) -> T {
        let oracle = self.oracle.as_ref();
        consult_or(self.max_retries, decision, fallback, || call(oracle))
    }

    /// Cached vector for `key`, embedding it on a miss.
    ///
    /// A failing embedder yields an empty vector, which scores zero
    /// relevance against everything.
    fn embed(&self, memory: &MemoryStore, key: &str) -> Embedding {
        if let Some(cached) = memory.embedding(key) {
            return cached.clone();
        }
        self.embedder.embed(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "Embedding failed; using empty vector");
            Embedding::default()
        })
    }
}

/// Last colon-separated component of an address or name.
fn last_segment(s: &str) -> &str {
    s.rsplit(':').next().unwrap_or(s)
}

/// Text inside the first pair of parentheses, if any.
fn parenthesized(s: &str) -> Option<&str> {
    let (_, rest) = s.split_once('(')?;
    Some(rest.split(')').next().unwrap_or(rest).trim())
}
