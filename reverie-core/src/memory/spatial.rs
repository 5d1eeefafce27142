//! What an agent knows about where things are.
//!
//! A fixed three-level tree: world → sector → arena → objects. Objects keep
//! the order in which they were first seen.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::world::Tile;

type Arenas = BTreeMap<String, Vec<String>>;
type Sectors = BTreeMap<String, Arenas>;

/// Spatial knowledge of one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpatialMemory {
    tree: BTreeMap<String, Sectors>,
}

impl SpatialMemory {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the address components of `tile`.
    ///
    /// Each level is only added under a known parent, so a tile with an
    /// empty sector adds nothing below the world.
    pub fn observe(&mut self, tile: &Tile) {
        if tile.world.is_empty() {
            return;
        }
        let sectors = self.tree.entry(tile.world.clone()).or_default();
        if tile.sector.is_empty() {
            return;
        }
        let arenas = sectors.entry(tile.sector.clone()).or_default();
        if tile.arena.is_empty() {
            return;
        }
        let objects = arenas.entry(tile.arena.clone()).or_default();
        if !tile.game_object.is_empty() && !objects.contains(&tile.game_object) {
            objects.push(tile.game_object.clone());
        }
    }

    /// Add a known location by its components.
    pub fn insert(&mut self, world: &str, sector: &str, arena: &str, object: Option<&str>) {
        let objects = self
            .tree
            .entry(world.to_string())
            .or_default()
            .entry(sector.to_string())
            .or_default()
            .entry(arena.to_string())
            .or_default();
        if let Some(object) = object
            && !objects.iter().any(|o| o == object)
        {
            objects.push(object.to_string());
        }
    }

    /// Sectors known in `world`.
    #[must_use]
    pub fn accessible_sectors(&self, world: &str) -> Vec<String> {
        self.tree
            .get(world)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Arenas known under `world:sector`.
    #[must_use]
    pub fn accessible_arenas(&self, sector_address: &str) -> Vec<String> {
        let mut parts = sector_address.split(':');
        let (Some(world), Some(sector)) = (parts.next(), parts.next()) else {
            return Vec::new();
        };
        self.tree
            .get(world)
            .and_then(|s| s.get(sector))
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Objects known under `world:sector:arena`.
    ///
    /// Falls back to a lower-cased arena name before giving up.
    #[must_use]
    pub fn accessible_objects(&self, arena_address: &str) -> Vec<String> {
        let mut parts = arena_address.split(':');
        let (Some(world), Some(sector), Some(arena)) = (parts.next(), parts.next(), parts.next())
        else {
            return Vec::new();
        };
        let Some(arenas) = self.tree.get(world).and_then(|s| s.get(sector)) else {
            return Vec::new();
        };
        arenas
            .get(arena)
            .or_else(|| arenas.get(&arena.to_lowercase()))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of known arenas across all worlds and sectors.
    #[must_use]
    pub fn arena_count(&self) -> usize {
        self.tree.values().flat_map(BTreeMap::values).map(BTreeMap::len).sum()
    }

    /// Read a tree from JSON.
    ///
    /// # Errors
    /// Returns an I/O or serialization error.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Write the tree as JSON.
    ///
    /// # Errors
    /// Returns an I/O or serialization error.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}
