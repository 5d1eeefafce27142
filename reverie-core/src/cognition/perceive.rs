//! Perception: what the agent notices around its tile this tick.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::agent::{Agent, CHAT_PREDICATE};
use crate::memory::{Filling, NodeDraft, NodeId};
use crate::oracle::{Decision, PoignancyKind};
use crate::types::{Event, SimTime, Triple};
use crate::world::{AddressLevel, WorldMap};

use super::{CognitionEngine, last_segment, parenthesized};

impl CognitionEngine {
    /// Learn nearby space and store newly noticed events.
    ///
    /// Events on nearby tiles of the agent's own arena are candidates,
    /// nearest first. Hazards anywhere in view are pinned at distance zero
    /// and replace other percepts about the same subject. Only the
    /// `att_bandwidth` nearest survive, and events already among the latest
    /// `retention` memories are not stored again.
    ///
    /// Returns the ids of the stored event nodes.
    pub(super) fn perceive(&self, agent: &mut Agent, world: &WorldMap) -> Vec<NodeId> {
        let (Some(curr), Some(now)) = (agent.scratch.curr_tile, agent.scratch.curr_time) else {
            return Vec::new();
        };

        let nearby = world.nearby_tiles(curr, agent.scratch.vision_r);
        for &coord in &nearby {
            agent.spatial.observe(world.tile_at(coord));
        }

        let arena = world.address_path(curr, AddressLevel::Arena);
        let mut seen: HashSet<&Event> = HashSet::new();
        let mut percepts: Vec<(f64, &Event)> = Vec::new();
        let mut hazards: Vec<&Event> = Vec::new();
        for &coord in &nearby {
            let tile = world.tile_at(coord);
            let same_arena = tile.address(AddressLevel::Arena) == arena;
            for event in &tile.events {
                if event.is_accident() {
                    if !hazards.contains(&event) {
                        hazards.push(event);
                    }
                } else if same_arena && seen.insert(event) {
                    percepts.push((curr.distance(coord), event));
                }
            }
        }
        for hazard in hazards {
            percepts.retain(|(_, e)| e.subject != hazard.subject);
            percepts.push((0.0, hazard));
        }
        percepts.sort_by(|a, b| a.0.total_cmp(&b.0));
        percepts.truncate(agent.scratch.att_bandwidth);

        let mut stored = Vec::new();
        for (_, event) in percepts {
            let (predicate, object, description) = match (&event.predicate, &event.object) {
                (Some(p), Some(o)) => (
                    p.clone(),
                    o.clone(),
                    event.description.clone().unwrap_or_default(),
                ),
                _ => ("is".to_string(), "idle".to_string(), "idle".to_string()),
            };
            let description = format!("{} is {description}", last_segment(&event.subject));
            let spo = Triple::new(event.subject.clone(), predicate, object);

            if agent
                .memory
                .summarized_latest_events(agent.scratch.retention)
                .contains(&spo)
            {
                continue;
            }

            let keywords: BTreeSet<String> = [
                last_segment(&spo.subject).to_string(),
                last_segment(&spo.object).to_string(),
            ]
            .into_iter()
            .collect();
            let embedding_key = parenthesized(&description).unwrap_or(&description).to_string();
            let embedding = self.embed(&agent.memory, &embedding_key);
            let poignancy = if embedding_key.contains("is idle") {
                1
            } else {
                self.ask(Decision::Poignancy, 1, |o| {
                    o.poignancy(&agent.scratch, PoignancyKind::Event, &embedding_key)
                })
            };

            let mut chat_ids = Vec::new();
            if spo.subject == agent.scratch.name && spo.predicate == CHAT_PREDICATE {
                chat_ids.push(self.store_own_chat(agent, &keywords, now));
            }

            let id = agent.memory.add_event(NodeDraft {
                created: now,
                expiration: None,
                spo,
                description,
                keywords,
                poignancy,
                embedding_key,
                embedding,
                filling: Filling::Nodes(chat_ids),
            });
            agent.scratch.importance_trigger_curr -= i64::from(poignancy);
            agent.scratch.importance_ele_n += 1;
            stored.push(id);
        }

        debug!(agent = %agent.name(), stored = stored.len(), "Perceived");
        stored
    }

    /// Store the agent's current conversation as a chat node.
    fn store_own_chat(
        &self,
        agent: &mut Agent,
        keywords: &BTreeSet<String>,
        now: SimTime,
    ) -> NodeId {
        let description = agent.scratch.act_description.clone().unwrap_or_default();
        let embedding = self.embed(&agent.memory, &description);
        let poignancy = self.ask(Decision::Poignancy, 1, |o| {
            o.poignancy(&agent.scratch, PoignancyKind::Chat, &description)
        });
        let spo = agent.scratch.act_event.clone().unwrap_or_default();
        let transcript = agent.scratch.chat.clone().unwrap_or_default();
        agent.memory.add_chat(NodeDraft {
            created: now,
            expiration: None,
            spo,
            description: description.clone(),
            keywords: keywords.clone(),
            poignancy,
            embedding_key: description,
            embedding,
            filling: Filling::Transcript(transcript),
        })
    }
}
