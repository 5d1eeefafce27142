//! The shared tile world.
//!
//! A [`WorldMap`] owns the tile grid (`tiles[y][x]`) and the
//! [`AddressIndex`] that resolves colon-joined addresses such as
//! `the Ville:Hobbs Cafe:cafe:cooking area` to the tiles they cover.
//! Address components never change after load; tile event sets change
//! every tick.

pub mod address;
pub mod bootstrap;
pub mod path;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Coord, Event};

pub use address::{AddressIndex, AddressLevel};
pub use bootstrap::WorldBootstrap;

// ---------------------------------------------------------------------------
// Tile
// ---------------------------------------------------------------------------

/// One grid cell.
///
/// Empty address components are stored as empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tile {
    /// World label.
    pub world: String,
    /// Sector label, or empty.
    pub sector: String,
    /// Arena label, or empty.
    pub arena: String,
    /// Game-object label, or empty.
    pub game_object: String,
    /// Spawn-location label, or empty.
    pub spawning_location: String,
    /// Whether agents may not enter this tile.
    pub collision: bool,
    /// Events currently placed on this tile.
    pub events: BTreeSet<Event>,
}

impl Tile {
    /// Colon-joined address of this tile down to `level`.
    ///
    /// Components are joined even when empty, so a tile without an arena
    /// still yields `world:sector::` at object level.
    #[must_use]
    pub fn address(&self, level: AddressLevel) -> String {
        let mut path = self.world.clone();
        for (lvl, part) in [
            (AddressLevel::Sector, &self.sector),
            (AddressLevel::Arena, &self.arena),
            (AddressLevel::GameObject, &self.game_object),
        ] {
            if level < lvl {
                break;
            }
            path.push(':');
            path.push_str(part);
        }
        path
    }
}

/// Events of one tile, as written to the per-step snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEvents {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
    /// Events with a description, in set order.
    pub events: Vec<Event>,
}

// ---------------------------------------------------------------------------
// WorldMap
// ---------------------------------------------------------------------------

/// The tile grid plus its address index.
#[derive(Debug, Clone)]
pub struct WorldMap {
    name: String,
    width: usize,
    height: usize,
    tile_size: u32,
    tiles: Vec<Vec<Tile>>,
    index: AddressIndex,
}

impl WorldMap {
    /// Build a world from tiles laid out as `tiles[y][x]`.
    ///
    /// Every game-object tile receives the object's idle event and the
    /// address index is derived from the tile components.
    #[must_use]
    pub fn from_tiles(name: impl Into<String>, tile_size: u32, mut tiles: Vec<Vec<Tile>>) -> Self {
        let height = tiles.len();
        let width = tiles.first().map_or(0, Vec::len);

        for row in &mut tiles {
            for tile in row.iter_mut() {
                if !tile.game_object.is_empty() {
                    let object = tile.address(AddressLevel::GameObject);
                    tile.events.insert(Event::idle(object));
                }
            }
        }

        let index = AddressIndex::build(&tiles);
        let name = name.into();
        debug!(world = %name, width, height, addresses = index.len(), "World map built");

        Self {
            name,
            width,
            height,
            tile_size,
            tiles,
            index,
        }
    }

    /// World name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grid width in tiles.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// The address index.
    #[must_use]
    pub fn index(&self) -> &AddressIndex {
        &self.index
    }

    /// Whether `coord` lies on the grid.
    #[must_use]
    pub fn contains(&self, coord: Coord) -> bool {
        coord.x() < self.width && coord.y() < self.height
    }

    /// The tile at `coord`.
    ///
    /// # Panics
    ///
    /// Panics if `coord` is outside the grid. Callers own that contract;
    /// use [`WorldMap::try_tile`] for untrusted coordinates.
    #[must_use]
    pub fn tile_at(&self, coord: Coord) -> &Tile {
        &self.tiles[coord.y()][coord.x()]
    }

    /// The tile at `coord`, or `None` off the grid.
    #[must_use]
    pub fn try_tile(&self, coord: Coord) -> Option<&Tile> {
        self.tiles.get(coord.y()).and_then(|row| row.get(coord.x()))
    }

    fn tile_mut(&mut self, coord: Coord) -> &mut Tile {
        &mut self.tiles[coord.y()][coord.x()]
    }

    /// All tiles an address resolves to. Unknown addresses yield nothing.
    #[must_use]
    pub fn tiles_for_address(&self, address: &str) -> Vec<Coord> {
        self.index
            .get(address)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rectangular neighbourhood of `center`, clamped to the grid.
    ///
    /// Spans `[x - r, x + r)` by `[y - r, y + r)`, so at most `(2r)²`
    /// tiles. Ordered column-major, matching perception scans.
    #[must_use]
    pub fn nearby_tiles(&self, center: Coord, radius: usize) -> Vec<Coord> {
        let left = center.x().saturating_sub(radius);
        let right = (center.x() + radius).min(self.width);
        let top = center.y().saturating_sub(radius);
        let bottom = (center.y() + radius).min(self.height);

        let mut out = Vec::with_capacity(right.saturating_sub(left) * bottom.saturating_sub(top));
        for x in left..right {
            for y in top..bottom {
                out.push(Coord(x, y));
            }
        }
        out
    }

    /// Address of the tile at `coord` down to `level`.
    #[must_use]
    pub fn address_path(&self, coord: Coord, level: AddressLevel) -> String {
        self.tile_at(coord).address(level)
    }

    /// Tile containing the pixel position `(px, py)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tile_from_pixel(&self, px: f64, py: f64) -> Coord {
        let size = f64::from(self.tile_size.max(1));
        Coord((px / size).ceil().max(0.0) as usize, (py / size).ceil().max(0.0) as usize)
    }

    // ------------------------------------------------------------------
    // Event mutation
    // ------------------------------------------------------------------

    /// Place `event` on `coord`.
    pub fn add_event(&mut self, event: Event, coord: Coord) {
        self.tile_mut(coord).events.insert(event);
    }

    /// Remove an exact match of `event` from `coord`.
    /// Returns whether anything was removed.
    pub fn remove_event(&mut self, event: &Event, coord: Coord) -> bool {
        self.tile_mut(coord).events.remove(event)
    }

    /// Remove every event on `coord` whose subject is `subject`.
    pub fn clear_subject_events(&mut self, subject: &str, coord: Coord) {
        self.tile_mut(coord).events.retain(|e| e.subject != subject);
    }

    /// Replace an exact match of `event` on `coord` with its idle form.
    ///
    /// Fire events are left in place; they only leave a tile through
    /// [`WorldMap::remove_event`]. Returns whether the event was idled.
    pub fn idle_event(&mut self, event: &Event, coord: Coord) -> bool {
        if event.describes_fire() {
            return false;
        }
        let tile = self.tile_mut(coord);
        if tile.events.remove(event) {
            tile.events.insert(Event::idle(event.subject.clone()));
            true
        } else {
            false
        }
    }

    /// The state (object field) of the first event about `address` found
    /// on any of its tiles.
    #[must_use]
    pub fn current_object_state(&self, address: &str) -> Option<String> {
        let tiles = self.index.get(address)?;
        tiles.iter().find_map(|&coord| {
            self.tile_at(coord)
                .events
                .iter()
                .find(|e| e.subject == address)
                .and_then(|e| e.object.clone())
        })
    }

    /// Every tile's events that carry a description.
    #[must_use]
    pub fn tile_events_snapshot(&self) -> Vec<TileEvents> {
        let mut out = Vec::new();
        for (y, row) in self.tiles.iter().enumerate() {
            for (x, tile) in row.iter().enumerate() {
                let events: Vec<Event> = tile
                    .events
                    .iter()
                    .filter(|e| e.description.is_some())
                    .cloned()
                    .collect();
                if !events.is_empty() {
                    out.push(TileEvents { x, y, events });
                }
            }
        }
        out
    }

    /// The snapshot in its line format: `"{x} {y} {events}"`.
    #[must_use]
    pub fn tile_events_lines(&self) -> Vec<String> {
        self.tile_events_snapshot()
            .into_iter()
            .map(|t| {
                let events: Vec<String> = t.events.iter().map(ToString::to_string).collect();
                format!("{} {} {{{}}}", t.x, t.y, events.join(", "))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
