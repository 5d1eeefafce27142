//! Planning: the day's schedule, the next action, and the choice of what
//! to react to.

use std::collections::{BTreeSet, HashSet};

use chrono::Duration;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::agent::schedule::{self, SLEEPING, ScheduleEntry};
use crate::agent::{Agent, AgentState, NewAction};
use crate::memory::{Filling, NodeDraft};
use crate::oracle::{Decision, IdentityRevision, LocationRequest, ObjectAction};
use crate::types::{ACCIDENT_MARKERS, SimTime, Triple};
use crate::world::{AddressLevel, WorldMap};

use super::{CognitionEngine, NewDay, Retrieved, last_segment};

/// Icon used when the oracle gives none.
pub(super) const DEFAULT_ICON: &str = "🙂";

/// Object placeholder when the chosen arena has no known objects.
pub(super) const RANDOM_OBJECT: &str = "<random>";

/// Regenerations allowed for an hourly plan with too little variety.
const HOURLY_ATTEMPTS: usize = 3;

/// Distinct hourly activities below which a plan is regenerated.
const MIN_DISTINCT_HOURS: usize = 5;

impl CognitionEngine {
    /// Plan for one tick: new-day planning, the next action once the
    /// current one is over, then at most one reaction to a perceived event.
    pub(super) fn plan(
        &mut self,
        agents: &mut [Agent],
        idx: usize,
        world: &mut WorldMap,
        new_day: Option<NewDay>,
        retrieved: &[Retrieved],
    ) {
        if let Some(kind) = new_day {
            self.long_term_planning(&mut agents[idx], kind);
        }
        if agents[idx].scratch.act_check_finished() {
            self.determine_action(&mut agents[idx], world);
        }

        let focus = choose_focus(&mut self.rng, &agents[idx].scratch.name, retrieved);
        if let Some(focus) = focus {
            self.react_to(agents, idx, world, focus);
        }

        let scratch = &mut agents[idx].scratch;
        scratch.clear_finished_chat();
        scratch.decrement_chat_buffers();
    }

    // ------------------------------------------------------------------
    // Day boundary
    // ------------------------------------------------------------------

    fn long_term_planning(&self, agent: &mut Agent, kind: NewDay) {
        let Some(now) = agent.scratch.curr_time else {
            return;
        };
        let wake_hour = self
            .ask(Decision::WakeHour, 8, |o| o.wake_up_hour(&agent.scratch))
            .min(23);

        match kind {
            NewDay::First => {
                agent.scratch.daily_req = self.ask(Decision::DailyPlan, Vec::new(), |o| {
                    o.daily_plan(&agent.scratch, wake_hour)
                });
            }
            NewDay::Next => self.revise_identity(agent, now),
        }

        let mut day = self.hourly_schedule(&agent.scratch, wake_hour);
        schedule::top_up_day(&mut day);
        agent.scratch.f_daily_schedule_hourly_org.clone_from(&day);
        agent.scratch.f_daily_schedule = day;

        self.store_plan_thought(agent, now);
        info!(
            agent = %agent.scratch.name,
            wake_hour,
            slots = agent.scratch.f_daily_schedule.len(),
            "Day planned"
        );
    }

    /// Refresh `currently` and the plan requirement from recent memories.
    fn revise_identity(&self, agent: &mut Agent, now: SimTime) {
        let name = agent.scratch.name.clone();
        let focal = [
            format!("{name}'s plan for {}.", now.format("%A %B %d")),
            format!("Important recent events for {name}'s life."),
        ];
        let ids = self.focal_nodes(agent, &focal);
        let statements: Vec<String> = ids
            .iter()
            .filter_map(|id| agent.memory.get(*id))
            .map(|n| format!("{}: {}", n.created.format("%A %B %d -- %H:%M %p"), n.embedding_key))
            .collect();

        let unchanged = IdentityRevision {
            currently: agent.scratch.currently.clone(),
            daily_plan_req: agent.scratch.daily_plan_req.clone(),
        };
        let revision = self.ask(Decision::IdentityRevision, unchanged, |o| {
            o.revise_identity(&agent.scratch, &statements)
        });
        agent.scratch.currently = revision.currently;
        agent.scratch.daily_plan_req = revision.daily_plan_req;
    }

    /// One activity per hour, sleeping before `wake_hour`, merged into
    /// slots.
    fn hourly_schedule(&self, scratch: &AgentState, wake_hour: u32) -> Vec<ScheduleEntry> {
        let mut activities: Vec<String> = Vec::with_capacity(24);
        for attempt in 1..=HOURLY_ATTEMPTS {
            activities.clear();
            for hour in 0..24 {
                if hour < wake_hour {
                    activities.push(SLEEPING.to_string());
                    continue;
                }
                let fallback = activities.last().cloned().unwrap_or_else(|| SLEEPING.to_string());
                let activity = self.ask(Decision::HourlySchedule, fallback, |o| {
                    o.hourly_activity(scratch, hour, &activities)
                });
                activities.push(activity);
            }
            let distinct = activities.iter().collect::<HashSet<_>>().len();
            if distinct >= MIN_DISTINCT_HOURS {
                break;
            }
            debug!(agent = %scratch.name, attempt, distinct, "Hourly plan too uniform");
        }
        schedule::compress_hourly(&activities)
    }

    fn store_plan_thought(&self, agent: &mut Agent, now: SimTime) {
        let date = now.format("%A %B %d").to_string();
        let mut text = format!("This is {}'s plan for {date}:", agent.scratch.name);
        for goal in &agent.scratch.daily_req {
            text.push(' ');
            text.push_str(goal);
            text.push(',');
        }
        text.pop();
        text.push('.');

        let embedding = self.embed(&agent.memory, &text);
        agent.memory.add_thought(NodeDraft {
            created: now,
            expiration: Some(now + Duration::days(30)),
            spo: Triple::new(agent.scratch.name.clone(), "plan", date),
            description: text.clone(),
            keywords: BTreeSet::from(["plan".to_string()]),
            poignancy: 5,
            embedding_key: text,
            embedding,
            filling: Filling::default(),
        });
    }

    // ------------------------------------------------------------------
    // Next action
    // ------------------------------------------------------------------

    /// Refine the schedule around now and start the slot that covers it.
    fn determine_action(&self, agent: &mut Agent, world: &WorldMap) {
        let scratch = &mut agent.scratch;
        if scratch.schedule_index(0) == 0 {
            self.decompose_at(scratch, 0);
            let next = scratch.schedule_index(60) + 1;
            self.decompose_at(scratch, next);
        }
        if scratch.minute_of_day() / 60 < 23 {
            let ahead = scratch.schedule_index(60);
            self.decompose_at(scratch, ahead);
        }
        schedule::top_up_day(&mut scratch.f_daily_schedule);

        let slot = scratch
            .f_daily_schedule
            .get(scratch.schedule_index(0))
            .cloned()
            .unwrap_or_else(|| ScheduleEntry::new(SLEEPING, 60));
        let activity = slot.activity().to_string();

        let address = self.action_address(agent, world, &activity);
        let scratch = &agent.scratch;
        let pronunciatio = self.ask(Decision::Pronunciatio, DEFAULT_ICON.to_string(), |o| {
            o.pronunciatio(scratch, &activity)
        });
        let event = self.ask(
            Decision::EventTriple,
            Triple::new(scratch.name.clone(), "is", activity.clone()),
            |o| o.event_triple(scratch, &activity),
        );
        let object = last_segment(&address).to_string();
        let idle_object = ObjectAction {
            description: "idle".to_string(),
            event: Triple::new(object.clone(), "is", "idle"),
        };
        let obj = self.ask(Decision::ObjectAction, idle_object, |o| {
            o.object_action(scratch, &object, &activity)
        });
        let obj_pronunciatio = self.ask(Decision::Pronunciatio, DEFAULT_ICON.to_string(), |o| {
            o.pronunciatio(scratch, &obj.description)
        });

        agent.scratch.add_new_action(NewAction {
            address,
            duration: slot.duration(),
            description: activity,
            pronunciatio,
            event,
            obj_description: Some(obj.description),
            obj_pronunciatio: Some(obj_pronunciatio),
            obj_event: Some(obj.event),
            ..NewAction::default()
        });
    }

    /// Split slot `index` into finer steps if it is long and not sleep.
    fn decompose_at(&self, scratch: &mut AgentState, index: usize) {
        let Some(slot) = scratch.f_daily_schedule.get(index).cloned() else {
            return;
        };
        if slot.duration() < 60 || !schedule::needs_decomposition(slot.activity(), slot.duration()) {
            return;
        }
        let parts = self.ask(Decision::TaskDecomposition, vec![slot.clone()], |o| {
            o.decompose_task(scratch, &slot)
        });
        let inserted = schedule::splice_decomposition(&mut scratch.f_daily_schedule, index, parts);
        debug!(agent = %scratch.name, activity = slot.activity(), inserted, "Slot decomposed");
    }

    /// `world:sector:arena:object` for an activity, chosen among places the
    /// agent knows.
    fn action_address(&self, agent: &Agent, world: &WorldMap, activity: &str) -> String {
        let Some(curr) = agent.scratch.curr_tile else {
            return RANDOM_OBJECT.to_string();
        };
        let here = world.tile_at(curr);
        let world_name = here.world.as_str();

        let sector = self.pick_location(
            &agent.scratch,
            AddressLevel::Sector,
            activity,
            world_name,
            agent.spatial.accessible_sectors(world_name),
            &here.sector,
        );
        let sector_address = format!("{world_name}:{sector}");
        let arena = self.pick_location(
            &agent.scratch,
            AddressLevel::Arena,
            activity,
            &sector_address,
            agent.spatial.accessible_arenas(&sector_address),
            &here.arena,
        );
        let arena_address = format!("{sector_address}:{arena}");
        let objects = agent.spatial.accessible_objects(&arena_address);
        let object = if objects.is_empty() {
            RANDOM_OBJECT.to_string()
        } else {
            self.pick_location(
                &agent.scratch,
                AddressLevel::GameObject,
                activity,
                &arena_address,
                objects,
                &here.game_object,
            )
        };
        format!("{arena_address}:{object}")
    }

    /// One of `options`. An answer outside the options falls back to
    /// `current` when that is an option, else to the first option.
    fn pick_location(
        &self,
        scratch: &AgentState,
        level: AddressLevel,
        activity: &str,
        parent: &str,
        options: Vec<String>,
        current: &str,
    ) -> String {
        if options.len() <= 1 {
            return options.into_iter().next().unwrap_or_else(|| current.to_string());
        }
        let request = LocationRequest {
            level,
            activity: activity.to_string(),
            parent: parent.to_string(),
            options,
        };
        let answer = self.ask(Decision::ActionTarget, String::new(), |o| {
            o.action_location(scratch, &request)
        });
        let options = request.options;
        if options.contains(&answer) {
            answer
        } else if options.iter().any(|o| o == current) {
            current.to_string()
        } else {
            options.into_iter().next().unwrap_or_default()
        }
    }
}

/// Pick the percept to react to.
///
/// The agent's own events are ignored. Other agents come first, then
/// anything that is not idle. Ties are broken at random.
fn choose_focus<'r>(rng: &mut StdRng, name: &str, retrieved: &'r [Retrieved]) -> Option<&'r Retrieved> {
    let others: Vec<&Retrieved> = retrieved.iter().filter(|r| r.event.subject != name).collect();
    let tiers: [fn(&Retrieved) -> bool; 2] = [is_agent, is_active];
    for keep in tiers {
        let pool: Vec<&Retrieved> = others.iter().copied().filter(|r| keep(r)).collect();
        if let Some(pick) = pool.choose(rng) {
            return Some(*pick);
        }
    }
    None
}

/// Whether the percept describes an accident, whoever its subject is.
pub(super) fn is_hazard(r: &Retrieved) -> bool {
    ACCIDENT_MARKERS.iter().any(|m| r.description.contains(m))
}

fn is_agent(r: &Retrieved) -> bool {
    !r.event.subject.contains(':')
}

fn is_active(r: &Retrieved) -> bool {
    !r.description.contains("is idle")
}
