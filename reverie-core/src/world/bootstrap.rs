//! World bootstrap format.
//!
//! A single JSON document carrying the world metadata, five flattened
//! row-major token grids and the token → label tables. The token `"0"`
//! (or any token missing from a table) means "no label".

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ReverieError};

use super::{Tile, WorldMap};

/// World metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMeta {
    /// Name of the world (also the top address component).
    pub world_name: String,
    /// Grid width in tiles.
    pub maze_width: usize,
    /// Grid height in tiles.
    pub maze_height: usize,
    /// Tile edge length in pixels.
    pub sq_tile_size: u32,
}

/// The five classification grids, each `width * height` tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldGrids {
    /// Any token other than `"0"` blocks movement.
    pub collision: Vec<String>,
    /// Sector tokens.
    pub sector: Vec<String>,
    /// Arena tokens.
    pub arena: Vec<String>,
    /// Game-object tokens.
    pub game_object: Vec<String>,
    /// Spawn-location tokens.
    pub spawning_location: Vec<String>,
}

/// Token → label tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldBlocks {
    /// Sector labels.
    #[serde(default)]
    pub sector: HashMap<String, String>,
    /// Arena labels.
    #[serde(default)]
    pub arena: HashMap<String, String>,
    /// Game-object labels.
    #[serde(default)]
    pub game_object: HashMap<String, String>,
    /// Spawn-location labels.
    #[serde(default)]
    pub spawning_location: HashMap<String, String>,
}

/// Everything needed to build a [`WorldMap`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldBootstrap {
    /// Metadata.
    pub meta: WorldMeta,
    /// Classification grids.
    pub grids: WorldGrids,
    /// Label tables.
    pub blocks: WorldBlocks,
}

impl WorldBootstrap {
    /// Parse a bootstrap document.
    ///
    /// # Errors
    /// Returns `ReverieError::Serialization` on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a bootstrap file.
    ///
    /// # Errors
    /// Returns an I/O error if the file is missing, or a serialization error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Build the world.
    ///
    /// # Errors
    /// Returns `ReverieError::Bootstrap` if any grid length differs from
    /// `width * height`.
    pub fn build(&self) -> Result<WorldMap> {
        let width = self.meta.maze_width;
        let height = self.meta.maze_height;
        let expected = width * height;

        for (name, grid) in [
            ("collision", &self.grids.collision),
            ("sector", &self.grids.sector),
            ("arena", &self.grids.arena),
            ("game_object", &self.grids.game_object),
            ("spawning_location", &self.grids.spawning_location),
        ] {
            if grid.len() != expected {
                return Err(ReverieError::Bootstrap(format!(
                    "{name} grid has {} tokens, expected {expected} ({width}x{height})",
                    grid.len()
                )));
            }
        }

        let label = |table: &HashMap<String, String>, token: &str| -> String {
            table.get(token).cloned().unwrap_or_default()
        };

        let mut tiles = Vec::with_capacity(height);
        for y in 0..height {
            let mut row = Vec::with_capacity(width);
            for x in 0..width {
                let i = y * width + x;
                row.push(Tile {
                    world: self.meta.world_name.clone(),
                    sector: label(&self.blocks.sector, &self.grids.sector[i]),
                    arena: label(&self.blocks.arena, &self.grids.arena[i]),
                    game_object: label(&self.blocks.game_object, &self.grids.game_object[i]),
                    spawning_location: label(
                        &self.blocks.spawning_location,
                        &self.grids.spawning_location[i],
                    ),
                    collision: self.grids.collision[i] != "0",
                    events: std::collections::BTreeSet::new(),
                });
            }
            tiles.push(row);
        }

        info!(
            world = %self.meta.world_name,
            width,
            height,
            "World bootstrap loaded"
        );
        Ok(WorldMap::from_tiles(
            self.meta.world_name.clone(),
            self.meta.sq_tile_size,
            tiles,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coord, Event};

    fn tiny() -> WorldBootstrap {
        let t = |v: &[&str]| v.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        WorldBootstrap {
            meta: WorldMeta {
                world_name: "the Ville".into(),
                maze_width: 3,
                maze_height: 2,
                sq_tile_size: 32,
            },
            grids: WorldGrids {
                collision: t(&["1", "0", "0", "0", "0", "1"]),
                sector: t(&["0", "10", "10", "10", "10", "0"]),
                arena: t(&["0", "20", "20", "20", "20", "0"]),
                game_object: t(&["0", "30", "0", "0", "0", "0"]),
                spawning_location: t(&["0", "0", "0", "40", "0", "0"]),
            },
            blocks: WorldBlocks {
                sector: HashMap::from([("10".into(), "Hobbs Cafe".into())]),
                arena: HashMap::from([("20".into(), "cafe".into())]),
                game_object: HashMap::from([("30".into(), "cooking area".into())]),
                spawning_location: HashMap::from([("40".into(), "sp-A".into())]),
            },
        }
    }

    #[test]
    fn builds_labels_and_collision() {
        let world = tiny().build().expect("build");
        assert_eq!(world.width(), 3);
        assert_eq!(world.height(), 2);
        assert!(world.tile_at(Coord(0, 0)).collision);
        assert!(!world.tile_at(Coord(1, 0)).collision);
        assert_eq!(world.tile_at(Coord(1, 0)).game_object, "cooking area");
        assert!(
            world
                .tile_at(Coord(1, 0))
                .events
                .contains(&Event::idle("the Ville:Hobbs Cafe:cafe:cooking area"))
        );
        assert_eq!(world.tiles_for_address("<spawn_loc>sp-A"), vec![Coord(0, 1)]);
    }

    #[test]
    fn wrong_grid_length_is_rejected() {
        let mut boot = tiny();
        boot.grids.arena.pop();
        assert!(matches!(boot.build(), Err(ReverieError::Bootstrap(_))));
    }

    #[test]
    fn json_round_trip_builds_same_world() {
        let json = serde_json::to_string(&tiny()).expect("serialize");
        let world = WorldBootstrap::from_json(&json).expect("parse").build().expect("build");
        assert_eq!(world.name(), "the Ville");
    }
}
