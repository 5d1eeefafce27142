//! Hierarchical addresses and the address → tiles index.

use std::collections::{BTreeSet, HashMap};

use crate::types::Coord;

use super::Tile;

/// Depth of an address, from the whole world down to a single object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressLevel {
    /// `world`
    World,
    /// `world:sector`
    Sector,
    /// `world:sector:arena`
    Arena,
    /// `world:sector:arena:object`
    GameObject,
}

/// Prefix used for spawn-location keys in the index.
pub const SPAWN_PREFIX: &str = "<spawn_loc>";

/// Maps address strings to the set of tiles they cover.
///
/// Sector, arena and object addresses are indexed for every tile that
/// has that component, plus `<spawn_loc>{label}` for spawn points.
#[derive(Debug, Clone, Default)]
pub struct AddressIndex {
    entries: HashMap<String, BTreeSet<Coord>>,
}

impl AddressIndex {
    /// Derive the index from a `tiles[y][x]` grid.
    #[must_use]
    pub fn build(tiles: &[Vec<Tile>]) -> Self {
        let mut entries: HashMap<String, BTreeSet<Coord>> = HashMap::new();
        for (y, row) in tiles.iter().enumerate() {
            for (x, tile) in row.iter().enumerate() {
                let mut keys = Vec::with_capacity(4);
                if !tile.sector.is_empty() {
                    keys.push(tile.address(AddressLevel::Sector));
                }
                if !tile.arena.is_empty() {
                    keys.push(tile.address(AddressLevel::Arena));
                }
                if !tile.game_object.is_empty() {
                    keys.push(tile.address(AddressLevel::GameObject));
                }
                if !tile.spawning_location.is_empty() {
                    keys.push(format!("{SPAWN_PREFIX}{}", tile.spawning_location));
                }
                for key in keys {
                    entries.entry(key).or_default().insert(Coord(x, y));
                }
            }
        }
        Self { entries }
    }

    /// Tiles for an address, if it is known.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&BTreeSet<Coord>> {
        self.entries.get(address)
    }

    /// Whether an address is known.
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    /// Number of distinct addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over every address.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
