//! The external mover seam.
//!
//! Between ticks, something outside the engine (a renderer, a path
//! follower, a test) decides where every agent actually stands. The
//! orchestrator polls a [`Mover`] until it has an answer for the step.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reverie_core::{Agent, Coord, WorldMap};
use tracing::debug;

use crate::error::{Result, SimError};
use crate::movement::{EnvironmentFrame, MovementRecord, frame_tiles};

/// Supplies agent positions and receives movement records.
pub trait Mover: Send {
    /// Positions for `step`, or `None` if they are not ready yet.
    ///
    /// # Errors
    /// Returns an error if the input exists but cannot be read.
    fn poll(&mut self, step: u64) -> Result<Option<BTreeMap<String, Coord>>>;

    /// Receive the record produced by `step`.
    ///
    /// # Errors
    /// Returns an error if the record cannot be delivered.
    fn publish(&mut self, step: u64, record: &MovementRecord) -> Result<()>;
}

// ---------------------------------------------------------------------------
// File exchange
// ---------------------------------------------------------------------------

/// Exchanges JSON files with a front-end.
///
/// Reads `{dir}/environment/{step}.json` and writes
/// `{dir}/movement/{step}.json`.
#[derive(Debug, Clone)]
pub struct FileMover {
    dir: PathBuf,
}

impl FileMover {
    /// A mover rooted at `dir`. Creates the two subdirectories.
    ///
    /// # Errors
    /// Returns an I/O error if the directories cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(dir.join("environment"))?;
        std::fs::create_dir_all(dir.join("movement"))?;
        Ok(Self { dir })
    }

    /// Path of the environment file for `step`.
    #[must_use]
    pub fn environment_path(&self, step: u64) -> PathBuf {
        self.dir.join("environment").join(format!("{step}.json"))
    }

    /// Path of the movement file for `step`.
    #[must_use]
    pub fn movement_path(&self, step: u64) -> PathBuf {
        self.dir.join("movement").join(format!("{step}.json"))
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Mover for FileMover {
    fn poll(&mut self, step: u64) -> Result<Option<BTreeMap<String, Coord>>> {
        let path = self.environment_path(step);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        // A front-end may still be writing; an unreadable file is retried.
        match serde_json::from_str::<EnvironmentFrame>(&text) {
            Ok(frame) => Ok(Some(frame_tiles(&frame))),
            Err(e) => {
                debug!(step, path = %path.display(), error = %e, "Environment file not ready");
                Ok(None)
            }
        }
    }

    fn publish(&mut self, step: u64, record: &MovementRecord) -> Result<()> {
        let path = self.movement_path(step);
        std::fs::write(&path, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Headless
// ---------------------------------------------------------------------------

/// Puts every agent exactly where it asked to go.
///
/// Used for headless runs: the first step starts from the given tiles,
/// every later step from the destinations of the previous record.
#[derive(Debug, Clone, Default)]
pub struct PathFollower {
    positions: BTreeMap<String, Coord>,
    ready_for: u64,
}

impl PathFollower {
    /// Start from explicit tiles.
    #[must_use]
    pub fn new(positions: BTreeMap<String, Coord>) -> Self {
        Self {
            positions,
            ready_for: 0,
        }
    }

    /// Start from the agents' last known tiles, or the first tile of their
    /// living area.
    ///
    /// # Errors
    /// Returns [`SimError::MissingPosition`] for an agent with neither.
    pub fn from_agents(agents: &[Agent], world: &WorldMap) -> Result<Self> {
        let mut positions = BTreeMap::new();
        for agent in agents {
            let tile = agent
                .scratch
                .curr_tile
                .or_else(|| world.tiles_for_address(&agent.scratch.living_area).first().copied())
                .ok_or_else(|| SimError::MissingPosition(agent.name().to_string()))?;
            positions.insert(agent.name().to_string(), tile);
        }
        Ok(Self::new(positions))
    }

    /// Resume at `step` instead of 0.
    #[must_use]
    pub fn starting_at(mut self, step: u64) -> Self {
        self.ready_for = step;
        self
    }
}

impl Mover for PathFollower {
    fn poll(&mut self, step: u64) -> Result<Option<BTreeMap<String, Coord>>> {
        Ok((step == self.ready_for).then(|| self.positions.clone()))
    }

    fn publish(&mut self, step: u64, record: &MovementRecord) -> Result<()> {
        self.positions.extend(record.destinations());
        self.ready_for = step + 1;
        Ok(())
    }
}
