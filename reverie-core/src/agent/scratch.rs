//! Short-term state of one agent: identity, schedule and current action.
//!
//! Everything here is rewritten every tick by the cognition pipeline and
//! serialized as the agent's `scratch.json`.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::schedule::{self, ScheduleEntry};
use crate::config::AgentConfig;
use crate::memory::Transcript;
use crate::retrieval::RetrievalWeights;
use crate::types::{Coord, Event, SimTime, Triple, ceil_to_minute, minutes_since_midnight, serde_time};

/// Predicate of an agent's event while it is talking to someone.
pub const CHAT_PREDICATE: &str = "chat with";

/// Mutable per-agent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentState {
    // --- perception ---
    /// Perception radius in tiles.
    pub vision_r: usize,
    /// Percepts attended per tick.
    pub att_bandwidth: usize,
    /// Recent events that suppress duplicate percepts.
    pub retention: usize,

    // --- world ---
    /// The agent's notion of the current time.
    #[serde(with = "serde_time::scratch_opt")]
    pub curr_time: Option<SimTime>,
    /// The tile the agent stands on.
    pub curr_tile: Option<Coord>,
    /// Free-text requirement for today's plan.
    pub daily_plan_req: String,

    // --- identity ---
    /// Full name; also the agent's event subject.
    pub name: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Age in years.
    pub age: u32,
    /// Stable traits.
    pub innate: String,
    /// Learned background.
    pub learned: String,
    /// What the agent is currently up to in life.
    pub currently: String,
    /// Daily habits.
    pub lifestyle: String,
    /// `world:sector:arena` of home.
    pub living_area: String,

    // --- reflection ---
    /// Days before unused concepts are forgotten.
    pub concept_forget: usize,
    /// Minute of day of the daily reflection.
    pub daily_reflection_time: u32,
    /// Statements considered by the daily reflection.
    pub daily_reflection_size: usize,
    /// Overlap threshold for reflection.
    pub overlap_reflect_th: usize,
    /// Keyword strength threshold for event reflection.
    pub kw_strg_event_reflect_th: usize,
    /// Keyword strength threshold for thought reflection.
    pub kw_strg_thought_reflect_th: usize,
    /// Retrieval weight on recency.
    pub recency_w: f64,
    /// Retrieval weight on relevance.
    pub relevance_w: f64,
    /// Retrieval weight on importance.
    pub importance_w: f64,
    /// Per-rank recency decay.
    pub recency_decay: f64,
    /// Reflection budget when full.
    pub importance_trigger_max: i64,
    /// Remaining budget; a reflection runs once it reaches zero.
    pub importance_trigger_curr: i64,
    /// Events stored since the last reflection.
    pub importance_ele_n: u32,
    /// Insights requested per reflection.
    pub thought_count: usize,
    /// Ticks before chatting with the same partner again.
    pub chat_cooldown: i64,

    // --- plan ---
    /// Broad goals for the day.
    pub daily_req: Vec<String>,
    /// The refined schedule for today.
    pub f_daily_schedule: Vec<ScheduleEntry>,
    /// The hourly schedule as first generated. Never mutated.
    pub f_daily_schedule_hourly_org: Vec<ScheduleEntry>,

    // --- current action ---
    /// `world:sector:arena:object`, or a `<persona>` / `<waiting>` /
    /// `<random>` pseudo-address.
    pub act_address: Option<String>,
    /// When the action started.
    #[serde(with = "serde_time::scratch_opt")]
    pub act_start_time: Option<SimTime>,
    /// Minutes.
    pub act_duration: Option<u32>,
    /// What the agent is doing.
    pub act_description: Option<String>,
    /// Icon for the renderer.
    pub act_pronunciatio: Option<String>,
    /// `(name, predicate, object)` of the action.
    pub act_event: Option<Triple>,
    /// What happens to the object the action uses.
    pub act_obj_description: Option<String>,
    /// Icon for the object state.
    pub act_obj_pronunciatio: Option<String>,
    /// `(object address, predicate, object)` of the object state.
    pub act_obj_event: Option<Triple>,

    // --- conversation ---
    /// Current chat partner.
    pub chatting_with: Option<String>,
    /// Transcript of the current chat.
    pub chat: Option<Transcript>,
    /// Partner → ticks until another chat is allowed.
    pub chatting_with_buffer: BTreeMap<String, i64>,
    /// When the current chat ends.
    #[serde(with = "serde_time::scratch_opt")]
    pub chatting_end_time: Option<SimTime>,

    // --- movement ---
    /// Whether `planned_path` was computed for the current action.
    pub act_path_set: bool,
    /// Remaining tiles to the destination, destination last.
    pub planned_path: Vec<Coord>,
}

/// Everything that describes a freshly chosen action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAction {
    /// Target address.
    pub address: String,
    /// Minutes.
    pub duration: u32,
    /// Description.
    pub description: String,
    /// Icon.
    pub pronunciatio: String,
    /// Action triple.
    pub event: Triple,
    /// Chat partner, if this action is a chat.
    pub chatting_with: Option<String>,
    /// Transcript, if this action is a chat.
    pub chat: Option<Transcript>,
    /// Cooldowns merged into the agent's buffer.
    pub chatting_with_buffer: BTreeMap<String, i64>,
    /// End of the chat.
    pub chatting_end_time: Option<SimTime>,
    /// Object description.
    pub obj_description: Option<String>,
    /// Object icon.
    pub obj_pronunciatio: Option<String>,
    /// Object triple.
    pub obj_event: Option<Triple>,
}

impl AgentState {
    /// Fresh state for `name` with cognitive parameters from `config`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: &AgentConfig) -> Self {
        let name = name.into();
        let mut parts = name.split_whitespace();
        let first_name = parts.next().unwrap_or_default().to_string();
        let last_name = parts.last().unwrap_or_default().to_string();
        Self {
            vision_r: config.vision_r,
            att_bandwidth: config.att_bandwidth,
            retention: config.retention,
            curr_time: None,
            curr_tile: None,
            daily_plan_req: String::new(),
            first_name,
            last_name,
            name,
            age: 0,
            innate: String::new(),
            learned: String::new(),
            currently: String::new(),
            lifestyle: String::new(),
            living_area: String::new(),
            concept_forget: config.concept_forget,
            daily_reflection_time: config.daily_reflection_time,
            daily_reflection_size: config.daily_reflection_size,
            overlap_reflect_th: config.overlap_reflect_th,
            kw_strg_event_reflect_th: config.kw_strg_event_reflect_th,
            kw_strg_thought_reflect_th: config.kw_strg_thought_reflect_th,
            recency_w: config.recency_w,
            relevance_w: config.relevance_w,
            importance_w: config.importance_w,
            recency_decay: config.recency_decay,
            importance_trigger_max: config.importance_trigger_max,
            importance_trigger_curr: config.importance_trigger_max,
            importance_ele_n: 0,
            thought_count: config.thought_count,
            chat_cooldown: config.chat_buffer,
            daily_req: Vec::new(),
            f_daily_schedule: Vec::new(),
            f_daily_schedule_hourly_org: Vec::new(),
            act_address: None,
            act_start_time: None,
            act_duration: None,
            act_description: None,
            act_pronunciatio: None,
            act_event: None,
            act_obj_description: None,
            act_obj_pronunciatio: None,
            act_obj_event: None,
            chatting_with: None,
            chat: None,
            chatting_with_buffer: BTreeMap::new(),
            chatting_end_time: None,
            act_path_set: false,
            planned_path: Vec::new(),
        }
    }

    /// Retrieval weights of this agent.
    #[must_use]
    pub fn weights(&self) -> RetrievalWeights {
        RetrievalWeights {
            recency: self.recency_w,
            relevance: self.relevance_w,
            importance: self.importance_w,
            decay: self.recency_decay,
        }
    }

    /// Minute of day of `curr_time`, or 0 before the first tick.
    #[must_use]
    pub fn minute_of_day(&self) -> u32 {
        self.curr_time.map_or(0, minutes_since_midnight)
    }

    /// Index of the `f_daily_schedule` slot covering now plus `advance`
    /// minutes.
    #[must_use]
    pub fn schedule_index(&self, advance: u32) -> usize {
        schedule::schedule_index(&self.f_daily_schedule, self.minute_of_day() + advance)
    }

    /// Same lookup against the frozen hourly schedule.
    #[must_use]
    pub fn hourly_org_index(&self, advance: u32) -> usize {
        schedule::schedule_index(&self.f_daily_schedule_hourly_org, self.minute_of_day() + advance)
    }

    // ------------------------------------------------------------------
    // Current action
    // ------------------------------------------------------------------

    /// The agent's own event for the current action.
    ///
    /// Without an action this is the agent's idle event.
    #[must_use]
    pub fn curr_event_and_desc(&self) -> Event {
        match (&self.act_address, &self.act_event) {
            (Some(_), Some(ev)) => Event {
                subject: ev.subject.clone(),
                predicate: Some(ev.predicate.clone()),
                object: Some(ev.object.clone()),
                description: self.act_description.clone(),
            },
            _ => Event::idle(self.name.clone()),
        }
    }

    /// The event placed on the action's object while it is in use.
    #[must_use]
    pub fn curr_obj_event_and_desc(&self) -> Event {
        let Some(address) = &self.act_address else {
            return Event::idle(String::new());
        };
        match &self.act_obj_event {
            Some(ev) => Event {
                subject: address.clone(),
                predicate: Some(ev.predicate.clone()),
                object: Some(ev.object.clone()),
                description: self.act_obj_description.clone(),
            },
            None => Event::idle(address.clone()),
        }
    }

    /// Replace the current action. The start time is now and a new path
    /// will be computed.
    pub fn add_new_action(&mut self, action: NewAction) {
        debug!(
            agent = %self.name,
            address = %action.address,
            duration = action.duration,
            description = %action.description,
            "New action"
        );
        self.act_address = Some(action.address);
        self.act_duration = Some(action.duration);
        self.act_description = Some(action.description);
        self.act_pronunciatio = Some(action.pronunciatio);
        self.act_event = Some(action.event);
        self.chatting_with = action.chatting_with;
        self.chat = action.chat;
        self.chatting_with_buffer.extend(action.chatting_with_buffer);
        self.chatting_end_time = action.chatting_end_time;
        self.act_obj_description = action.obj_description;
        self.act_obj_pronunciatio = action.obj_pronunciatio;
        self.act_obj_event = action.obj_event;
        self.act_start_time = self.curr_time;
        self.act_path_set = false;
    }

    /// When the current action ends.
    ///
    /// A chat ends at its recorded end time; anything else at its start
    /// rounded up to the minute plus its duration.
    #[must_use]
    pub fn act_end_time(&self) -> Option<SimTime> {
        if self.chatting_with.is_some() {
            return self.chatting_end_time;
        }
        let start = self.act_start_time?;
        Some(ceil_to_minute(start) + Duration::minutes(i64::from(self.act_duration.unwrap_or(0))))
    }

    /// Whether the current action is over. No action counts as over.
    #[must_use]
    pub fn act_check_finished(&self) -> bool {
        if self.act_address.is_none() {
            return true;
        }
        match (self.act_end_time(), self.curr_time) {
            (Some(end), Some(now)) => end == now,
            _ => true,
        }
    }

    /// Whether the current action is a chat.
    #[must_use]
    pub fn is_chatting(&self) -> bool {
        self.act_event
            .as_ref()
            .is_some_and(|e| e.predicate == CHAT_PREDICATE)
    }

    /// Whether the agent is asleep right now.
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.act_description
            .as_deref()
            .is_some_and(|d| d.contains("sleeping"))
    }

    /// Drop chat fields left over from an action that is no longer a chat.
    pub fn clear_finished_chat(&mut self) {
        if !self.is_chatting() {
            self.chatting_with = None;
            self.chat = None;
            self.chatting_end_time = None;
        }
    }

    /// One tick of chat cooldown for every partner but the current one.
    pub fn decrement_chat_buffers(&mut self) {
        for (partner, ticks) in &mut self.chatting_with_buffer {
            if self.chatting_with.as_deref() != Some(partner.as_str()) {
                *ticks -= 1;
            }
        }
    }

    /// Remaining cooldown before chatting with `partner` again.
    #[must_use]
    pub fn chat_buffer_for(&self, partner: &str) -> i64 {
        self.chatting_with_buffer.get(partner).copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------

    /// A short identity paragraph.
    #[must_use]
    pub fn identity_summary(&self) -> String {
        let mut s = format!("Name: {}\nAge: {}\n", self.name, self.age);
        s.push_str(&format!("Innate traits: {}\n", self.innate));
        s.push_str(&format!("Learned traits: {}\n", self.learned));
        s.push_str(&format!("Currently: {}\n", self.currently));
        s.push_str(&format!("Lifestyle: {}\n", self.lifestyle));
        s.push_str(&format!("Daily plan requirement: {}\n", self.daily_plan_req));
        if let Some(now) = self.curr_time {
            s.push_str(&format!("Current Date: {}\n", now.format("%A %B %d")));
        }
        s
    }

    /// Today's schedule as `hh:mm ~ hh:mm -- activity` lines.
    #[must_use]
    pub fn daily_schedule_summary(&self) -> String {
        let mut out = String::new();
        let mut start = 0;
        for slot in &self.f_daily_schedule {
            let end = start + slot.duration();
            out.push_str(&format!(
                "{:02}:{:02} ~ {:02}:{:02} -- {}\n",
                start / 60,
                start % 60,
                end / 60,
                end % 60,
                slot.activity()
            ));
            start = end;
        }
        out
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new("", &AgentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::t;

    fn agent() -> AgentState {
        AgentState::new("Isabella Rodriguez", &AgentConfig::default())
    }

    fn action(address: &str, duration: u32) -> NewAction {
        NewAction {
            address: address.into(),
            duration,
            description: "brewing coffee".into(),
            pronunciatio: "☕".into(),
            event: Triple::new("Isabella Rodriguez", "brew", "coffee"),
            ..NewAction::default()
        }
    }

    #[test]
    fn names_are_split() {
        let a = agent();
        assert_eq!(a.first_name, "Isabella");
        assert_eq!(a.last_name, "Rodriguez");
        assert_eq!(a.importance_trigger_curr, 150);
    }

    #[test]
    fn no_action_is_finished_and_idle() {
        let a = agent();
        assert!(a.act_check_finished());
        assert_eq!(a.curr_event_and_desc(), Event::idle("Isabella Rodriguez"));
        assert_eq!(a.curr_obj_event_and_desc(), Event::idle(""));
    }

    #[test]
    fn action_finishes_at_rounded_start_plus_duration() {
        let mut a = agent();
        a.curr_time = Some(t(8, 0) + Duration::seconds(10));
        a.add_new_action(action("the Ville:Hobbs Cafe:cafe:cafe customer seating", 5));
        assert_eq!(a.act_end_time(), Some(t(8, 6)));

        a.curr_time = Some(t(8, 5));
        assert!(!a.act_check_finished());
        a.curr_time = Some(t(8, 6));
        assert!(a.act_check_finished());
    }

    #[test]
    fn events_follow_the_current_action() {
        let mut a = agent();
        a.curr_time = Some(t(8, 0));
        let mut act = action("the Ville:Hobbs Cafe:cafe:coffee machine", 10);
        act.obj_description = Some("brewing coffee".into());
        act.obj_event = Some(Triple::new("coffee machine", "is", "brewing coffee"));
        a.add_new_action(act);

        let ev = a.curr_event_and_desc();
        assert_eq!(ev.predicate.as_deref(), Some("brew"));
        assert_eq!(ev.description.as_deref(), Some("brewing coffee"));

        let obj = a.curr_obj_event_and_desc();
        assert_eq!(obj.subject, "the Ville:Hobbs Cafe:cafe:coffee machine");
        assert_eq!(obj.object.as_deref(), Some("brewing coffee"));
        assert!(!a.act_path_set);
    }

    #[test]
    fn chat_buffers_skip_current_partner() {
        let mut a = agent();
        a.chatting_with_buffer.insert("Klaus Mueller".into(), 800);
        a.chatting_with_buffer.insert("Maria Lopez".into(), 10);
        a.chatting_with = Some("Maria Lopez".into());
        for _ in 0..5 {
            a.decrement_chat_buffers();
        }
        assert_eq!(a.chat_buffer_for("Klaus Mueller"), 795);
        assert_eq!(a.chat_buffer_for("Maria Lopez"), 10);
        assert_eq!(a.chat_buffer_for("Nobody"), 0);
    }

    #[test]
    fn finished_chat_fields_are_cleared() {
        let mut a = agent();
        a.chatting_with = Some("Klaus Mueller".into());
        a.chat = Some(vec![("Isabella Rodriguez".into(), "Hi".into())]);
        a.act_event = Some(Triple::new("Isabella Rodriguez", "brew", "coffee"));
        a.clear_finished_chat();
        assert!(a.chatting_with.is_none());
        assert!(a.chat.is_none());
    }

    #[test]
    fn schedule_index_uses_current_minute() {
        let mut a = agent();
        a.f_daily_schedule = vec![ScheduleEntry::new("sleeping", 60); 24];
        a.curr_time = Some(t(2, 5));
        assert_eq!(a.schedule_index(0), 2);
        assert_eq!(a.schedule_index(60), 3);
    }

    #[test]
    fn scratch_roundtrips_with_formatted_times() {
        let mut a = agent();
        a.curr_time = Some(t(7, 30));
        let json = serde_json::to_string(&a).expect("serialize");
        assert!(json.contains("\"February 13, 2023, 07:30:00\""));
        let back: AgentState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, a);
    }

    #[test]
    fn partial_scratch_takes_defaults() {
        let a: AgentState = serde_json::from_str(r#"{"name": "Klaus Mueller", "age": 20}"#)
            .expect("deserialize");
        assert_eq!(a.name, "Klaus Mueller");
        assert_eq!(a.vision_r, 4);
        assert!(a.curr_time.is_none());
    }
}
