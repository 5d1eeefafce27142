//! The per-step exchange with the renderer.
//!
//! Outbound, one [`MovementRecord`] per step:
//!
//! ```json
//! {
//!   "persona": {
//!     "Isabella Rodriguez": {
//!       "movement": [58, 9],
//!       "pronunciatio": "☕",
//!       "description": "brewing coffee @ the Ville:Hobbs Cafe:cafe:cafe counter",
//!       "chat": null
//!     }
//!   },
//!   "meta": { "curr_time": "February 13, 2023, 08:00:10" }
//! }
//! ```
//!
//! Inbound, one [`EnvironmentFrame`] per step: where each agent actually
//! ended up, `{"Isabella Rodriguez": {"maze": "the_ville", "x": 58, "y": 9}}`.

use std::collections::BTreeMap;

use reverie_core::memory::Transcript;
use reverie_core::types::serde_time;
use reverie_core::{Coord, SimTime};
use serde::{Deserialize, Serialize};

/// One agent's line in a movement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMovement {
    /// Tile the agent heads to next.
    pub movement: Coord,
    /// Icon for the current action.
    pub pronunciatio: String,
    /// `"{activity} @ {address}"`.
    pub description: String,
    /// Transcript while chatting.
    pub chat: Option<Transcript>,
}

/// Clock stamp of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementMeta {
    /// World time of the step.
    #[serde(with = "serde_time::scratch")]
    pub curr_time: SimTime,
}

/// Everything the renderer needs for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// Per agent, by name.
    pub persona: BTreeMap<String, AgentMovement>,
    /// Step metadata.
    pub meta: MovementMeta,
}

impl MovementRecord {
    /// An empty record stamped `curr_time`.
    #[must_use]
    pub fn new(curr_time: SimTime) -> Self {
        Self {
            persona: BTreeMap::new(),
            meta: MovementMeta { curr_time },
        }
    }

    /// Where each agent asked to go.
    #[must_use]
    pub fn destinations(&self) -> BTreeMap<String, Coord> {
        self.persona
            .iter()
            .map(|(name, m)| (name.clone(), m.movement))
            .collect()
    }
}

/// One agent's reported position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
}

/// Positions reported by the mover for one step, by agent name.
///
/// Extra keys per agent (e.g. `maze`) are ignored.
pub type EnvironmentFrame = BTreeMap<String, Position>;

/// Convert a frame into tiles.
#[must_use]
pub fn frame_tiles(frame: &EnvironmentFrame) -> BTreeMap<String, Coord> {
    frame
        .iter()
        .map(|(name, p)| (name.clone(), Coord(p.x, p.y)))
        .collect()
}
