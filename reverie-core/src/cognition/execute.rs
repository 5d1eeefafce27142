//! Execution: turning the current action into the next tile to stand on.

use std::collections::HashSet;

use rand::seq::{IteratorRandom, SliceRandom};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::types::Coord;
use crate::world::WorldMap;

use super::plan::{DEFAULT_ICON, RANDOM_OBJECT};
use super::react::{PERSONA_ADDRESS, WAITING_ADDRESS};
use super::{CognitionEngine, StepOutcome};

/// Candidate destination tiles considered per path search.
const MAX_TARGETS: usize = 4;

impl CognitionEngine {
    /// Advance `agents[idx]` one tile along the path to its action.
    ///
    /// The path is computed once per action; `<random>` actions pick a
    /// fresh random tile each time the previous one is reached.
    pub(super) fn execute(
        &mut self,
        agents: &mut [Agent],
        idx: usize,
        world: &WorldMap,
        curr: Coord,
    ) -> StepOutcome {
        let address = agents[idx].scratch.act_address.clone().unwrap_or_default();
        if address.contains(RANDOM_OBJECT) && agents[idx].scratch.planned_path.is_empty() {
            agents[idx].scratch.act_path_set = false;
        }

        if !agents[idx].scratch.act_path_set {
            let targets = self.target_tiles(agents, idx, world, &address, curr);
            let path = closest_path(world, curr, &targets).unwrap_or_default();
            debug!(
                agent = %agents[idx].name(),
                address = %address,
                targets = targets.len(),
                steps = path.len(),
                "Path planned"
            );
            let scratch = &mut agents[idx].scratch;
            scratch.planned_path = path;
            scratch.act_path_set = true;
        }

        let scratch = &mut agents[idx].scratch;
        let next_tile = if scratch.planned_path.is_empty() {
            curr
        } else {
            scratch.planned_path.remove(0)
        };
        StepOutcome {
            next_tile,
            pronunciatio: scratch
                .act_pronunciatio
                .clone()
                .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            description: format!(
                "{} @ {address}",
                scratch.act_description.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Where the action at `address` can take place, sampled and with
    /// tiles occupied by agents dropped when possible.
    fn target_tiles(
        &mut self,
        agents: &[Agent],
        idx: usize,
        world: &WorldMap,
        address: &str,
        curr: Coord,
    ) -> Vec<Coord> {
        let mut targets = if let Some(name) = address.strip_prefix(PERSONA_ADDRESS) {
            let name = name.trim();
            match agents.iter().find(|a| a.scratch.name == name).and_then(|a| a.scratch.curr_tile) {
                Some(tile) => vec![meeting_point(world, curr, tile)],
                None => {
                    warn!(agent = %agents[idx].name(), partner = name, "Chat partner not found");
                    Vec::new()
                }
            }
        } else if let Some(spot) = address.strip_prefix(WAITING_ADDRESS) {
            let mut xy = spot.split_whitespace().filter_map(|n| n.parse::<usize>().ok());
            match (xy.next(), xy.next()) {
                (Some(x), Some(y)) => vec![Coord(x, y)],
                _ => Vec::new(),
            }
        } else if address.contains(RANDOM_OBJECT) {
            let area = address.rsplit_once(':').map_or("", |(area, _)| area);
            world
                .tiles_for_address(area)
                .into_iter()
                .choose(&mut self.rng)
                .into_iter()
                .collect()
        } else {
            world.tiles_for_address(address)
        };

        if targets.is_empty() && !address.is_empty() {
            warn!(agent = %agents[idx].name(), address, "Unknown action address; staying put");
        }

        targets.shuffle(&mut self.rng);
        targets.truncate(MAX_TARGETS);

        let names: HashSet<&str> = agents.iter().map(Agent::name).collect();
        let free: Vec<Coord> = targets
            .iter()
            .copied()
            .filter(|&c| {
                !world
                    .tile_at(c)
                    .events
                    .iter()
                    .any(|e| names.contains(e.subject.as_str()))
            })
            .collect();
        if free.is_empty() { targets } else { free }
    }
}

/// The tile halfway along the path to `other`.
fn meeting_point(world: &WorldMap, curr: Coord, other: Coord) -> Coord {
    let Some(steps) = world.find_path(curr, other) else {
        return curr;
    };
    let mut full = Vec::with_capacity(steps.len() + 1);
    full.push(curr);
    full.extend(steps);
    if full.len() <= 2 {
        curr
    } else {
        full[full.len() / 2]
    }
}

/// Shortest reachable path among `targets`.
fn closest_path(world: &WorldMap, curr: Coord, targets: &[Coord]) -> Option<Vec<Coord>> {
    targets
        .iter()
        .filter(|c| world.contains(**c))
        .filter_map(|&target| world.find_path(curr, target))
        .min_by_key(Vec::len)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::{AgentState, NewAction};
    use crate::config::{AgentConfig, ReverieConfig};
    use crate::embedding::HashingEmbeddingProvider;
    use crate::oracle::StubOracle;
    use crate::types::{Event, Triple};
    use crate::world::tests::sample_world;

    fn engine() -> CognitionEngine {
        CognitionEngine::new(
            Arc::new(StubOracle::new()),
            Arc::new(HashingEmbeddingProvider::default()),
            &ReverieConfig::default(),
        )
        .with_seed(9)
    }

    fn agent(name: &str, tile: Coord, address: &str) -> Agent {
        let mut a = Agent::new(AgentState::new(name, &AgentConfig::default()));
        a.scratch.curr_tile = Some(tile);
        a.scratch.add_new_action(NewAction {
            address: address.into(),
            duration: 30,
            description: "resting".into(),
            pronunciatio: "😴".into(),
            event: Triple::new(name, "is", "resting"),
            ..NewAction::default()
        });
        a
    }

    #[test]
    fn walks_to_the_object_one_tile_per_tick() {
        let mut engine = engine();
        let world = sample_world();
        let bed = "the Ville:Lin family's house:bedroom:bed";
        let mut agents = vec![agent("Klaus Mueller", Coord(1, 5), bed)];

        let first = engine.execute(&mut agents, 0, &world, Coord(1, 5));
        assert_eq!(first.next_tile, Coord(1, 4));
        assert_eq!(first.pronunciatio, "😴");
        assert_eq!(first.description, format!("resting @ {bed}"));
        assert!(agents[0].scratch.act_path_set);

        let second = engine.execute(&mut agents, 0, &world, first.next_tile);
        assert_eq!(second.next_tile, Coord(1, 3));
        let third = engine.execute(&mut agents, 0, &world, second.next_tile);
        assert_eq!(third.next_tile, Coord(1, 2));
        let arrived = engine.execute(&mut agents, 0, &world, third.next_tile);
        assert_eq!(arrived.next_tile, Coord(1, 2));
    }

    #[test]
    fn occupied_tiles_are_avoided() {
        let mut engine = engine();
        let mut world = sample_world();
        let bed = "the Ville:Lin family's house:bedroom:bed";
        world.add_event(Event::idle("Maria Lopez"), Coord(1, 2));
        let mut agents = vec![
            agent("Klaus Mueller", Coord(1, 5), bed),
            agent("Maria Lopez", Coord(1, 2), "the Ville:Hobbs Cafe:cafe:<random>"),
        ];
        engine.execute(&mut agents, 0, &world, Coord(1, 5));
        assert_eq!(agents[0].scratch.planned_path.last(), Some(&Coord(2, 2)));
    }

    #[test]
    fn chat_partners_meet_halfway() {
        let mut engine = engine();
        let world = sample_world();
        let mut agents = vec![
            agent("Klaus Mueller", Coord(2, 4), "<persona> Maria Lopez"),
            agent("Maria Lopez", Coord(6, 4), "<persona> Klaus Mueller"),
        ];
        engine.execute(&mut agents, 0, &world, Coord(2, 4));
        assert_eq!(agents[0].scratch.planned_path.last(), Some(&Coord(4, 4)));
    }

    #[test]
    fn waiting_and_unknown_addresses() {
        let mut engine = engine();
        let world = sample_world();
        let mut agents = vec![
            agent("Klaus Mueller", Coord(2, 4), "<waiting> 2 4"),
            agent("Maria Lopez", Coord(6, 4), "the Ville:nowhere:at all:chair"),
        ];
        assert_eq!(engine.execute(&mut agents, 0, &world, Coord(2, 4)).next_tile, Coord(2, 4));
        assert_eq!(engine.execute(&mut agents, 1, &world, Coord(6, 4)).next_tile, Coord(6, 4));
    }

    #[test]
    fn random_targets_stay_inside_the_arena() {
        let mut engine = engine();
        let world = sample_world();
        let mut agents = vec![agent("Klaus Mueller", Coord(6, 4), "the Ville:Hobbs Cafe:cafe:<random>")];
        for _ in 0..10 {
            let out = engine.execute(&mut agents, 0, &world, Coord(6, 4));
            assert!(out.next_tile.x() >= 4 && out.next_tile.x() <= 7);
            if let Some(dest) = agents[0].scratch.planned_path.last() {
                assert!(dest.x() >= 5);
            }
        }
    }
}
