//! Reactions to a focused percept: chatting, waiting, or handling a hazard.
//!
//! Every reaction ends in [`CognitionEngine::create_react`], which makes
//! room for the new activity in the agent's schedule before starting it.

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::agent::{
    Agent, AgentState, CHAT_PREDICATE, NewAction, ReactionWindow, ScheduleEntry, WindowPlan, two_mut,
};
use crate::memory::Transcript;
use crate::oracle::{Conversation, Decision, ReactMode, ReactionContext, WindowRequest, consult};
use crate::types::{SimTime, Triple, ceil_to_minute, minutes_since_midnight};
use crate::world::WorldMap;

use super::plan::is_hazard;
use super::{CognitionEngine, Retrieved};

/// Pseudo-address prefix of an agent waiting in place.
pub(super) const WAITING_ADDRESS: &str = "<waiting>";

/// Pseudo-address prefix of an agent walking to another agent.
pub(super) const PERSONA_ADDRESS: &str = "<persona>";

const CHAT_ICON: &str = "💬";
const WAIT_ICON: &str = "⌛";

/// Characters per chat-minute unit: transcript length / 8 / 30, rounded up.
const CHARS_PER_TOKEN: usize = 8;
const TOKENS_PER_MINUTE: usize = 30;

/// What the agent decided to do about its focus.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reaction {
    /// Start a chat with the agent at this index.
    Chat(usize),
    /// Wait for another agent to finish.
    Wait {
        /// Last minute the other agent is busy.
        until: SimTime,
        /// The activity the agent is waiting to start.
        activity: String,
    },
    /// Respond to a hazard.
    Accident,
}

impl CognitionEngine {
    /// Decide on and carry out a reaction to `focus`.
    pub(super) fn react_to(
        &mut self,
        agents: &mut [Agent],
        idx: usize,
        world: &mut WorldMap,
        focus: &Retrieved,
    ) {
        let Some(reaction) = self.should_react(agents, idx, focus) else {
            return;
        };
        debug!(agent = %agents[idx].name(), ?reaction, focus = %focus.description, "Reacting");
        match reaction {
            Reaction::Accident => self.accident_react(&mut agents[idx], world, focus),
            Reaction::Chat(other) => self.chat_react(agents, idx, other, focus),
            Reaction::Wait { until, activity } => self.wait_react(&mut agents[idx], until, &activity),
        }
    }

    fn should_react(&self, agents: &[Agent], idx: usize, focus: &Retrieved) -> Option<Reaction> {
        if is_hazard(focus) {
            return Some(Reaction::Accident);
        }
        let me = &agents[idx];
        if me.scratch.is_chatting()
            || me
                .scratch
                .act_address
                .as_deref()
                .is_some_and(|a| a.contains(WAITING_ADDRESS))
        {
            return None;
        }
        if focus.event.subject.contains(':') {
            return None;
        }
        let other = agents
            .iter()
            .position(|a| a.scratch.name == focus.event.subject)
            .filter(|&j| j != idx)?;
        let target = &agents[other].scratch;
        let context = reaction_context(me, focus);

        if self.lets_talk(&me.scratch, target, &context) {
            return Some(Reaction::Chat(other));
        }
        self.lets_react(&me.scratch, target, &context)
    }

    fn lets_talk(&self, me: &AgentState, target: &AgentState, context: &ReactionContext) -> bool {
        if !both_active(me, target)
            || target
                .act_address
                .as_deref()
                .is_some_and(|a| a.contains(WAITING_ADDRESS))
            || me.chatting_with.is_some()
            || target.chatting_with.is_some()
            || me.chat_buffer_for(&target.name) > 0
        {
            return false;
        }
        self.ask(Decision::DecideToTalk, false, |o| o.decide_to_talk(me, target, context))
    }

    fn lets_react(&self, me: &AgentState, target: &AgentState, context: &ReactionContext) -> Option<Reaction> {
        if !both_active(me, target)
            || target
                .act_description
                .as_deref()
                .is_some_and(|d| d.contains("waiting"))
            || me.planned_path.is_empty()
            || me.act_address != target.act_address
        {
            return None;
        }
        let mode = self.ask(Decision::DecideToReact, ReactMode::Keep, |o| {
            o.decide_to_react(me, target, context)
        });
        match mode {
            ReactMode::Wait => {
                let start = target.act_start_time?;
                let busy = i64::from(target.act_duration.unwrap_or(1)) - 1;
                let own = me.act_description.as_deref().unwrap_or_default();
                Some(Reaction::Wait {
                    until: start + Duration::minutes(busy),
                    activity: pending_activity(own).to_string(),
                })
            }
            ReactMode::DoOther | ReactMode::Keep => None,
        }
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    fn chat_react(&self, agents: &mut [Agent], idx: usize, other: usize, focus: &Retrieved) {
        let (me, target) = two_mut(agents, idx, other);
        let Some(now) = me.scratch.curr_time else {
            return;
        };
        let context = self.conversation_context(me, target, focus);
        let convo = match consult(self.max_retries, Decision::Conversation, || {
            self.oracle.converse(&me.scratch, &target.scratch, &context)
        }) {
            Ok(convo) => convo,
            Err(e) => {
                warn!(agent = %me.scratch.name, partner = %target.scratch.name, error = %e, "No conversation; skipping chat");
                return;
            }
        };

        let duration = chat_duration(&convo.transcript);
        let end = ceil_to_minute(now) + Duration::minutes(i64::from(duration));
        info!(
            agent = %me.scratch.name,
            partner = %target.scratch.name,
            duration,
            lines = convo.transcript.len(),
            "Chat started"
        );

        let me_name = me.scratch.name.clone();
        let target_name = target.scratch.name.clone();
        self.join_chat(me, &target_name, &convo, duration, end);
        self.join_chat(target, &me_name, &convo, duration, end);
    }

    fn join_chat(&self, agent: &mut Agent, partner: &str, convo: &Conversation, duration: u32, end: SimTime) {
        let cooldown = agent.scratch.chat_cooldown;
        let action = NewAction {
            address: format!("{PERSONA_ADDRESS} {partner}"),
            duration,
            description: convo.summary.clone(),
            pronunciatio: CHAT_ICON.to_string(),
            event: Triple::new(agent.scratch.name.clone(), CHAT_PREDICATE, partner),
            chatting_with: Some(partner.to_string()),
            chat: Some(convo.transcript.clone()),
            chatting_with_buffer: BTreeMap::from([(partner.to_string(), cooldown)]),
            chatting_end_time: Some(end),
            ..NewAction::default()
        };
        self.create_react(agent, action);
    }

    fn wait_react(&self, agent: &mut Agent, until: SimTime, activity: &str) {
        let (Some(now), Some(tile)) = (agent.scratch.curr_time, agent.scratch.curr_tile) else {
            return;
        };
        let span = i64::from(minutes_since_midnight(until)) - i64::from(minutes_since_midnight(now)) + 1;
        let duration = u32::try_from(span.max(1)).unwrap_or(1);
        let action = NewAction {
            address: format!("{WAITING_ADDRESS} {} {}", tile.x(), tile.y()),
            duration,
            description: format!("waiting to start {activity}"),
            pronunciatio: WAIT_ICON.to_string(),
            event: Triple::new(agent.scratch.name.clone(), "waiting to start", activity),
            ..NewAction::default()
        };
        self.create_react(agent, action);
    }

    /// Fit `action` into the schedule around now, then start it.
    ///
    /// The window comes from the frozen hourly plan. The oracle may rewrite
    /// it; a rewrite that changes the window total or the already-lived
    /// prefix is replaced by the deterministic splice.
    pub(super) fn create_react(&self, agent: &mut Agent, action: NewAction) {
        let scratch = &mut agent.scratch;
        let minute = scratch.minute_of_day();
        let window = ReactionWindow::around(&scratch.f_daily_schedule_hourly_org, minute);
        let inserted = ScheduleEntry::new(action.description.clone(), action.duration);
        let plan = WindowPlan::new(&scratch.f_daily_schedule, window, minute, inserted);

        let request = WindowRequest {
            inserted: plan.inserted.clone(),
            main: plan.main.clone(),
            truncated: plan.truncated.clone(),
            proposal: plan.proposal.clone(),
            start_hour: window.start_hour,
            end_hour: window.end_hour,
        };
        let rewrite = self.ask(Decision::WindowRewrite, None, |o| {
            o.rewrite_window(scratch, &request).map(Some)
        });
        plan.apply(&mut scratch.f_daily_schedule, rewrite);
        scratch.add_new_action(action);
    }

    /// Memories the initiator brings to a conversation.
    fn conversation_context(&self, me: &mut Agent, target: &Agent, focus: &Retrieved) -> ReactionContext {
        let about = format!(
            "{} is {}",
            target.scratch.name,
            target.scratch.act_description.as_deref().unwrap_or("idle")
        );
        let ids = self.focal_nodes(me, &[target.scratch.name.clone(), about]);
        let mut context = reaction_context(me, focus);
        for id in ids {
            if let Some(node) = me.memory.get(id)
                && !context.memories.contains(&node.embedding_key)
            {
                context.memories.push(node.embedding_key.clone());
            }
        }
        context
    }
}

/// Shared preconditions for chatting and waiting.
fn both_active(me: &AgentState, target: &AgentState) -> bool {
    let has_action = |s: &AgentState| s.act_address.is_some() && s.act_description.is_some();
    has_action(me)
        && has_action(target)
        && !me.is_sleeping()
        && !target.is_sleeping()
        && me.minute_of_day() / 60 != 23
}

fn reaction_context(agent: &Agent, focus: &Retrieved) -> ReactionContext {
    let memories = focus
        .events
        .iter()
        .chain(&focus.thoughts)
        .filter_map(|id| agent.memory.get(*id))
        .map(|n| n.description.clone())
        .collect();
    ReactionContext {
        focus: focus.description.clone(),
        memories,
    }
}

/// The step an activity description is on: the text of its last
/// parenthesized part, or the whole description.
fn pending_activity(description: &str) -> &str {
    match description.rsplit_once('(') {
        Some((_, tail)) => tail.trim_end().trim_end_matches(')').trim(),
        None => description,
    }
}

/// Minutes a conversation takes.
fn chat_duration(transcript: &Transcript) -> u32 {
    let chars: usize = transcript
        .iter()
        .map(|(speaker, line)| speaker.chars().count() + line.chars().count() + 3)
        .sum();
    let minutes = (chars / CHARS_PER_TOKEN).div_ceil(TOKENS_PER_MINUTE);
    u32::try_from(minutes.max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::schedule::{self, SLEEPING};
    use crate::config::{AgentConfig, ReverieConfig};
    use crate::embedding::HashingEmbeddingProvider;
    use crate::memory::NodeId;
    use crate::memory::tests::t;
    use crate::oracle::StubOracle;
    use crate::types::Coord;
    use crate::world::tests::sample_world;

    fn engine(oracle: Arc<StubOracle>) -> CognitionEngine {
        CognitionEngine::new(
            oracle,
            Arc::new(HashingEmbeddingProvider::default()),
            &ReverieConfig::default(),
        )
        .with_seed(5)
    }

    fn busy_agent(name: &str, tile: Coord, activity: &str) -> Agent {
        let mut a = Agent::new(AgentState::new(name, &AgentConfig::default()));
        let day = vec![
            ScheduleEntry::new(SLEEPING, 480),
            ScheduleEntry::new(activity, 120),
            ScheduleEntry::new(SLEEPING, 840),
        ];
        a.scratch.f_daily_schedule = day.clone();
        a.scratch.f_daily_schedule_hourly_org = day;
        a.scratch.curr_tile = Some(tile);
        a.scratch.curr_time = Some(t(8, 30));
        a.scratch.add_new_action(NewAction {
            address: "the Ville:Hobbs Cafe:cafe:counter".into(),
            duration: 120,
            description: activity.into(),
            pronunciatio: "🙂".into(),
            event: Triple::new(name, "is", activity),
            ..NewAction::default()
        });
        a
    }

    fn focus_on(name: &str) -> Retrieved {
        Retrieved {
            description: format!("{name} is working"),
            event: Triple::new(name, "is", "working"),
            curr_event: NodeId(1),
            events: Vec::new(),
            thoughts: Vec::new(),
        }
    }

    #[test]
    fn chat_sets_both_parties() {
        let mut engine = engine(Arc::new(StubOracle::new().with_talk(true)));
        let mut world = sample_world();
        let mut agents = vec![
            busy_agent("Klaus Mueller", Coord(6, 3), "working at the cafe"),
            busy_agent("Maria Lopez", Coord(7, 3), "working at the cafe"),
        ];
        engine.react_to(&mut agents, 0, &mut world, &focus_on("Maria Lopez"));

        for (me, other) in [(0, "Maria Lopez"), (1, "Klaus Mueller")] {
            let s = &agents[me].scratch;
            assert_eq!(s.chatting_with.as_deref(), Some(other));
            assert_eq!(s.act_address.as_deref(), Some(format!("<persona> {other}").as_str()));
            assert_eq!(s.act_pronunciatio.as_deref(), Some(CHAT_ICON));
            assert_eq!(s.chat_buffer_for(other), 800);
            assert!(s.is_chatting());
            assert_eq!(s.chatting_end_time, Some(t(8, 31)));
            assert_eq!(schedule::total_minutes(&s.f_daily_schedule), schedule::DAY_MINUTES);
        }
    }

    #[test]
    fn chat_refused_while_cooling_down() {
        let oracle = Arc::new(StubOracle::new().with_talk(true));
        let mut engine = engine(oracle.clone());
        let mut world = sample_world();
        let mut agents = vec![
            busy_agent("Klaus Mueller", Coord(6, 3), "working at the cafe"),
            busy_agent("Maria Lopez", Coord(7, 3), "working at the cafe"),
        ];
        agents[0].scratch.chatting_with_buffer.insert("Maria Lopez".into(), 795);
        engine.react_to(&mut agents, 0, &mut world, &focus_on("Maria Lopez"));
        assert!(agents[0].scratch.chatting_with.is_none());
        assert_eq!(oracle.call_count(Decision::DecideToTalk), 0);
    }

    #[test]
    fn sleeping_partner_is_left_alone() {
        let oracle = Arc::new(StubOracle::new().with_talk(true));
        let mut engine = engine(oracle.clone());
        let mut world = sample_world();
        let mut agents = vec![
            busy_agent("Klaus Mueller", Coord(6, 3), "working at the cafe"),
            busy_agent("Maria Lopez", Coord(7, 3), "sleeping"),
        ];
        engine.react_to(&mut agents, 0, &mut world, &focus_on("Maria Lopez"));
        assert!(agents[0].scratch.chatting_with.is_none());
        assert_eq!(oracle.call_count(Decision::DecideToTalk), 0);
        assert_eq!(oracle.call_count(Decision::DecideToReact), 0);
    }

    #[test]
    fn waiting_for_a_shared_spot() {
        let mut engine = engine(Arc::new(StubOracle::new().with_react(ReactMode::Wait)));
        let mut world = sample_world();
        let mut agents = vec![
            busy_agent("Klaus Mueller", Coord(6, 3), "using the counter (ordering coffee)"),
            busy_agent("Maria Lopez", Coord(7, 3), "working at the cafe"),
        ];
        agents[0].scratch.planned_path = vec![Coord(7, 3)];
        agents[1].scratch.act_start_time = Some(t(8, 20));
        agents[1].scratch.act_duration = Some(20);

        engine.react_to(&mut agents, 0, &mut world, &focus_on("Maria Lopez"));

        let s = &agents[0].scratch;
        assert_eq!(s.act_address.as_deref(), Some("<waiting> 6 3"));
        assert_eq!(s.act_description.as_deref(), Some("waiting to start ordering coffee"));
        // Busy until 8:39, so 8:30..=8:39.
        assert_eq!(s.act_duration, Some(10));
        assert_eq!(s.act_pronunciatio.as_deref(), Some(WAIT_ICON));
        assert_eq!(schedule::total_minutes(&s.f_daily_schedule), schedule::DAY_MINUTES);
    }

    #[test]
    fn chat_duration_rounds_up_to_a_minute() {
        let short: Transcript = vec![("A".into(), "hi".into())];
        assert_eq!(chat_duration(&short), 1);
        let long: Transcript = vec![("Klaus".into(), "x".repeat(500))];
        // (5 + 500 + 3) / 8 = 63 → ceil(63 / 30) = 3
        assert_eq!(chat_duration(&long), 3);
    }

    #[test]
    fn pending_activity_reads_the_last_step() {
        assert_eq!(pending_activity("using the counter (ordering coffee)"), "ordering coffee");
        assert_eq!(pending_activity("working"), "working");
    }
}
