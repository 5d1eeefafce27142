//! Breadth-first path finding over walkable tiles.

use std::collections::{HashMap, VecDeque};

use crate::types::Coord;

use super::WorldMap;

impl WorldMap {
    /// Whether an agent may stand on `coord`.
    #[must_use]
    pub fn is_walkable(&self, coord: Coord) -> bool {
        self.try_tile(coord).is_some_and(|t| !t.collision)
    }

    /// Shortest 4-connected path from `from` to `to`.
    ///
    /// The returned tiles exclude `from` and end with `to`; an empty
    /// vector means the agent is already there. `None` when `to` is
    /// unreachable or blocked.
    #[must_use]
    pub fn find_path(&self, from: Coord, to: Coord) -> Option<Vec<Coord>> {
        if from == to {
            return Some(Vec::new());
        }
        if !self.is_walkable(to) || !self.contains(from) {
            return None;
        }

        let mut came_from: HashMap<Coord, Coord> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        came_from.insert(from, from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current];
                let mut step = current;
                while let Some(&prev) = came_from.get(&step) {
                    if prev == from {
                        break;
                    }
                    path.push(prev);
                    step = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.neighbours(current) {
                if self.is_walkable(next) && !came_from.contains_key(&next) {
                    came_from.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn neighbours(&self, c: Coord) -> impl Iterator<Item = Coord> + use<> {
        let (w, h) = (self.width(), self.height());
        let mut out = Vec::with_capacity(4);
        if c.x() > 0 {
            out.push(Coord(c.x() - 1, c.y()));
        }
        if c.x() + 1 < w {
            out.push(Coord(c.x() + 1, c.y()));
        }
        if c.y() > 0 {
            out.push(Coord(c.x(), c.y() - 1));
        }
        if c.y() + 1 < h {
            out.push(Coord(c.x(), c.y() + 1));
        }
        out.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Coord;
    use crate::world::tests::sample_world;

    #[test]
    fn path_excludes_start_and_ends_at_target() {
        let world = sample_world();
        let path = world.find_path(Coord(1, 1), Coord(4, 1)).expect("reachable");
        assert_eq!(path.len(), 3);
        assert_eq!(path.last(), Some(&Coord(4, 1)));
        assert!(!path.contains(&Coord(1, 1)));
    }

    #[test]
    fn same_tile_is_empty_path() {
        let world = sample_world();
        assert_eq!(world.find_path(Coord(2, 2), Coord(2, 2)), Some(vec![]));
    }

    #[test]
    fn blocked_target_is_unreachable() {
        let world = sample_world();
        assert_eq!(world.find_path(Coord(1, 1), Coord(1, 0)), None);
    }
}
