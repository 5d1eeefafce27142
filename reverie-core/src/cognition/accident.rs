//! Hazards: fire events, their remediation, and the per-address record of
//! state events layered on top while a hazard is open.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::agent::{Agent, NewAction};
use crate::oracle::{AccidentResponse, Decision, ObjectAction};
use crate::types::{Event, Triple};
use crate::world::WorldMap;

use super::plan::DEFAULT_ICON;
use super::{CognitionEngine, Retrieved};

/// Predicate of an injected fire event.
pub const FIRE_PREDICATE: &str = "is being";

/// Object of an injected fire event.
pub const FIRE_STATE: &str = "on fire";

/// Corrective actions last between five and fifteen minutes.
const MIN_RESPONSE_MINUTES: u32 = 5;
const MAX_RESPONSE_MINUTES: u32 = 15;

const RESOLVED_MARKERS: [&str; 5] = ["safe", "extinguished", "clean", "calm", "idle"];
const UNRESOLVED_MARKERS: [&str; 2] = ["escap", "flee"];

/// The event that sets `address` on fire.
#[must_use]
pub fn fire_event(address: impl Into<String>, description: impl Into<String>) -> Event {
    Event::new(address, FIRE_PREDICATE, FIRE_STATE, description)
}

/// Whether an object state means the hazard is over.
#[must_use]
pub fn is_resolved(state: &str) -> bool {
    let state = state.to_lowercase();
    RESOLVED_MARKERS.iter().any(|m| state.contains(m))
        && !UNRESOLVED_MARKERS.iter().any(|m| state.contains(m))
}

/// State events added on top of open hazards, per object address.
///
/// Entries are retracted from the world when their hazard resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentLog {
    open: BTreeMap<String, Vec<Event>>,
}

impl IncidentLog {
    /// Remember `event` as layered on `address`. Duplicates are ignored.
    pub fn record(&mut self, address: &str, event: Event) {
        let layered = self.open.entry(address.to_string()).or_default();
        if !layered.contains(&event) {
            layered.push(event);
        }
    }

    /// Close the incident at `address`, returning what was layered.
    pub fn take(&mut self, address: &str) -> Vec<Event> {
        self.open.remove(address).unwrap_or_default()
    }

    /// Events layered on `address` so far.
    #[must_use]
    pub fn layered(&self, address: &str) -> &[Event] {
        self.open.get(address).map_or(&[], Vec::as_slice)
    }

    /// Addresses with an open incident.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.open.keys().map(String::as_str)
    }

    /// Whether no incident is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// The object event behind a hazard percept.
///
/// An object percept is its own hazard. A percept about an agent ("Maria
/// Lopez is fleeing the fire") points at the nearest burning object within
/// the agent's vision.
fn hazard_in_sight(agent: &Agent, world: &WorldMap, focus: &Retrieved) -> Option<Event> {
    if focus.event.subject.contains(':') {
        return Some(Event::new(
            focus.event.subject.clone(),
            focus.event.predicate.clone(),
            focus.event.object.clone(),
            focus.description.clone(),
        ));
    }
    let here = agent.scratch.curr_tile?;
    world
        .nearby_tiles(here, agent.scratch.vision_r)
        .into_iter()
        .filter_map(|coord| {
            world
                .tile_at(coord)
                .events
                .iter()
                .find(|e| e.subject.contains(':') && e.is_accident())
                .map(|e| (here.distance(coord), e.clone()))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, event)| event)
}

impl CognitionEngine {
    /// Respond to the hazard in `focus`.
    ///
    /// The agent takes up a short corrective activity at the object and the
    /// oracle says what state the object ends up in. A resolved state clears
    /// the fire and everything layered on it and idles the object; anything
    /// else is layered on every tile of the object and logged.
    pub(super) fn accident_react(&mut self, agent: &mut Agent, world: &mut WorldMap, focus: &Retrieved) {
        let Some(hazard) = hazard_in_sight(agent, world, focus) else {
            debug!(agent = %agent.scratch.name, focus = %focus.description, "No burning object in sight");
            return;
        };
        let address = hazard.subject.clone();
        let scratch = &agent.scratch;

        let response = self.ask(Decision::AccidentResponse, AccidentResponse::default(), |o| {
            o.accident_response(scratch, &hazard)
        });
        let duration = response
            .duration
            .clamp(MIN_RESPONSE_MINUTES, MAX_RESPONSE_MINUTES);
        let activity = response.activity;
        let current_state = world
            .current_object_state(&address)
            .unwrap_or_else(|| "unknown".to_string());

        let pronunciatio = self.ask(Decision::Pronunciatio, DEFAULT_ICON.to_string(), |o| {
            o.pronunciatio(scratch, &activity)
        });
        let event = self.ask(
            Decision::EventTriple,
            Triple::new(scratch.name.clone(), "is", activity.clone()),
            |o| o.event_triple(scratch, &activity),
        );
        let unchanged = ObjectAction {
            description: current_state.clone(),
            event: Triple::new(address.clone(), "is", current_state.clone()),
        };
        let obj = self.ask(Decision::ObjectAction, unchanged, |o| {
            o.object_action(scratch, &address, &activity)
        });
        let new_state = self.ask(Decision::ObjectStateUpdate, current_state.clone(), |o| {
            o.update_object_state(scratch, &address, &current_state, &activity)
        });

        let resolved = is_resolved(&new_state);
        let tiles = world.tiles_for_address(&address);
        let idle = Event::idle(address.clone());
        if resolved {
            let layered = self.incidents.take(&address);
            for &coord in &tiles {
                let hazards: Vec<Event> = world
                    .tile_at(coord)
                    .events
                    .iter()
                    .filter(|e| {
                        e.subject == address
                            && (e.is_accident() || e.predicate.as_deref() == Some(FIRE_PREDICATE))
                    })
                    .cloned()
                    .collect();
                for e in hazards.iter().chain(&layered) {
                    world.remove_event(e, coord);
                }
                world.add_event(idle.clone(), coord);
            }
        } else {
            let update = Event::new(
                address.clone(),
                "is",
                new_state.clone(),
                format!("{new_state} by {}", scratch.name),
            );
            for &coord in &tiles {
                world.remove_event(&idle, coord);
                world.add_event(update.clone(), coord);
            }
            self.incidents.record(&address, update);
        }
        info!(
            agent = %scratch.name,
            address = %address,
            from = %current_state,
            to = %new_state,
            resolved,
            "Hazard handled"
        );

        let action = NewAction {
            address: address.clone(),
            duration,
            description: activity,
            pronunciatio,
            event,
            obj_description: Some(obj.description),
            obj_pronunciatio: Some(DEFAULT_ICON.to_string()),
            obj_event: Some(obj.event),
            ..NewAction::default()
        };
        self.create_react(agent, action);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::AgentState;
    use crate::agent::schedule::{self, SLEEPING, ScheduleEntry};
    use crate::config::{AgentConfig, ReverieConfig};
    use crate::embedding::HashingEmbeddingProvider;
    use crate::memory::NodeId;
    use crate::memory::tests::t;
    use crate::oracle::StubOracle;
    use crate::types::Coord;
    use crate::world::tests::sample_world;

    const STOVE: &str = "the Ville:Hobbs Cafe:cafe:cooking area";

    fn engine(oracle: Arc<StubOracle>) -> CognitionEngine {
        CognitionEngine::new(
            oracle,
            Arc::new(HashingEmbeddingProvider::default()),
            &ReverieConfig::default(),
        )
        .with_seed(1)
    }

    fn agent() -> Agent {
        let mut a = Agent::new(AgentState::new("Isabella Rodriguez", &AgentConfig::default()));
        let day = vec![ScheduleEntry::new(SLEEPING, 480), ScheduleEntry::new("running the cafe", 960)];
        a.scratch.f_daily_schedule = day.clone();
        a.scratch.f_daily_schedule_hourly_org = day;
        a.scratch.curr_tile = Some(Coord(6, 5));
        a.scratch.curr_time = Some(t(10, 0));
        a
    }

    fn burning_world() -> WorldMap {
        let mut world = sample_world();
        let c = Coord(7, 5);
        world.remove_event(&Event::idle(STOVE), c);
        world.add_event(fire_event(STOVE, "on fire"), c);
        world
    }

    fn focus() -> Retrieved {
        Retrieved {
            description: "cooking area is on fire".into(),
            event: Triple::new(STOVE, FIRE_PREDICATE, FIRE_STATE),
            curr_event: NodeId(1),
            events: Vec::new(),
            thoughts: Vec::new(),
        }
    }

    #[test]
    fn resolution_markers() {
        assert!(is_resolved("extinguished"));
        assert!(is_resolved("Safe now"));
        assert!(!is_resolved("still burning"));
        assert!(!is_resolved("safe, but people are fleeing"));
    }

    #[test]
    fn unresolved_state_is_layered_then_retracted() {
        let oracle = Arc::new(StubOracle::new().with_object_states(["smoldering", "extinguished"]));
        let mut engine = engine(oracle);
        let mut world = burning_world();
        let mut agent = agent();

        engine.accident_react(&mut agent, &mut world, &focus());
        let layered = Event::new(STOVE, "is", "smoldering", "smoldering by Isabella Rodriguez");
        let tile = &world.tile_at(Coord(7, 5)).events;
        assert!(tile.contains(&layered));
        assert!(tile.contains(&fire_event(STOVE, "on fire")));
        assert_eq!(engine.incidents().layered(STOVE), &[layered.clone()]);

        let s = &agent.scratch;
        assert_eq!(s.act_address.as_deref(), Some(STOVE));
        assert_eq!(s.act_description.as_deref(), Some("putting out the fire"));
        assert_eq!(s.act_duration, Some(10));
        assert_eq!(schedule::total_minutes(&s.f_daily_schedule), schedule::DAY_MINUTES);

        engine.accident_react(&mut agent, &mut world, &focus());
        let events: Vec<Event> = world.tile_at(Coord(7, 5)).events.iter().cloned().collect();
        assert_eq!(events, vec![Event::idle(STOVE)]);
        assert!(engine.incidents().is_empty());
    }

    #[test]
    fn an_agent_fleeing_the_fire_leads_to_the_burning_object() {
        let oracle = Arc::new(StubOracle::new().with_object_states(["smoldering"]));
        let mut engine = engine(oracle.clone());
        let mut world = burning_world();
        let mut agent = agent();
        let fleeing = Retrieved {
            description: "Maria Lopez is fleeing the fire".into(),
            event: Triple::new("Maria Lopez", "is", "fleeing the fire"),
            curr_event: NodeId(1),
            events: Vec::new(),
            thoughts: Vec::new(),
        };

        engine.accident_react(&mut agent, &mut world, &fleeing);

        assert_eq!(oracle.call_count(Decision::AccidentResponse), 1);
        assert_eq!(agent.scratch.act_address.as_deref(), Some(STOVE));
        assert_eq!(engine.incidents().addresses().collect::<Vec<_>>(), vec![STOVE]);
    }

    #[test]
    fn an_agent_hazard_with_nothing_burning_is_ignored() {
        let oracle = Arc::new(StubOracle::new());
        let mut engine = engine(oracle.clone());
        let mut world = sample_world();
        let mut agent = agent();
        let before = agent.scratch.f_daily_schedule.clone();
        let fleeing = Retrieved {
            description: "Maria Lopez is fleeing the fire".into(),
            event: Triple::new("Maria Lopez", "is", "fleeing the fire"),
            curr_event: NodeId(1),
            events: Vec::new(),
            thoughts: Vec::new(),
        };

        engine.accident_react(&mut agent, &mut world, &fleeing);

        assert_eq!(oracle.call_count(Decision::AccidentResponse), 0);
        assert_eq!(agent.scratch.f_daily_schedule, before);
        assert!(engine.incidents().is_empty());
    }

    #[test]
    fn failing_oracle_keeps_the_fire_burning() {
        let mut engine = engine(Arc::new(StubOracle::new().failing()));
        let mut world = burning_world();
        let mut agent = agent();
        engine.accident_react(&mut agent, &mut world, &focus());
        // Default response; the object state stays "on fire".
        assert_eq!(agent.scratch.act_duration, Some(10));
        assert!(world.tile_at(Coord(7, 5)).events.contains(&fire_event(STOVE, "on fire")));
        assert_eq!(engine.incidents().layered(STOVE).len(), 1);
    }
}
