//! The cognition oracle: every decision the engine cannot compute itself.
//!
//! One trait method per decision kind. The production implementation
//! (in `reverie-llm`) asks a language model; [`StubOracle`] answers
//! deterministically for tests and headless runs.
//!
//! Callers never let an oracle failure abort a tick. [`consult`] retries a
//! fixed number of times and [`consult_or`] falls back to a documented
//! default, logging the failure at `warn!`.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::agent::{AgentState, ScheduleEntry};
use crate::memory::NodeId;
use crate::memory::Transcript;
use crate::types::{Event, Triple};
use crate::world::AddressLevel;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an oracle call produced no decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The backend is not reachable or not configured.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something that does not parse.
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),

    /// Every retry failed.
    #[error("oracle failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The final failure.
        last_error: String,
    },
}

/// Result of one oracle call.
pub type OracleResult<T> = std::result::Result<T, OracleError>;

// ---------------------------------------------------------------------------
// Decision kinds
// ---------------------------------------------------------------------------

/// Which decision is being asked for. Used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Hour the agent gets up.
    WakeHour,
    /// Broad goals for the day.
    DailyPlan,
    /// One hour of the schedule.
    HourlySchedule,
    /// Splitting a slot into steps.
    TaskDecomposition,
    /// Rewriting a window around a reaction.
    WindowRewrite,
    /// Sector, arena or object for an action.
    ActionTarget,
    /// Icon for an activity.
    Pronunciatio,
    /// Triple for an activity.
    EventTriple,
    /// What happens to the object in use.
    ObjectAction,
    /// Salience of a memory.
    Poignancy,
    /// Whether to start a chat.
    DecideToTalk,
    /// Whether to wait for someone.
    DecideToReact,
    /// A conversation.
    Conversation,
    /// How to respond to a hazard.
    AccidentResponse,
    /// New state of an object after an intervention.
    ObjectStateUpdate,
    /// Revising the identity at a day boundary.
    IdentityRevision,
    /// What to reflect on.
    ReflectionFocus,
    /// What was learned.
    ReflectionInsight,
}

impl Decision {
    /// Short snake-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WakeHour => "wake_hour",
            Self::DailyPlan => "daily_plan",
            Self::HourlySchedule => "hourly_schedule",
            Self::TaskDecomposition => "task_decomposition",
            Self::WindowRewrite => "window_rewrite",
            Self::ActionTarget => "action_target",
            Self::Pronunciatio => "pronunciatio",
            Self::EventTriple => "event_triple",
            Self::ObjectAction => "object_action",
            Self::Poignancy => "poignancy",
            Self::DecideToTalk => "decide_to_talk",
            Self::DecideToReact => "decide_to_react",
            Self::Conversation => "conversation",
            Self::AccidentResponse => "accident_response",
            Self::ObjectStateUpdate => "object_state_update",
            Self::IdentityRevision => "identity_revision",
            Self::ReflectionFocus => "reflection_focus",
            Self::ReflectionInsight => "reflection_insight",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Requests & responses
// ---------------------------------------------------------------------------

/// What a poignancy score is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoignancyKind {
    /// A perceived event.
    Event,
    /// A conversation.
    Chat,
    /// A reflection.
    Thought,
}

/// Choosing one level of an action's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    /// Which component is being chosen.
    pub level: AddressLevel,
    /// The activity the place is for.
    pub activity: String,
    /// Address chosen so far (`world`, `world:sector`, ...).
    pub parent: String,
    /// Options known to the agent. Never empty.
    pub options: Vec<String>,
}

/// Rewriting the schedule window around an inserted activity.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRequest {
    /// The inserted activity.
    pub inserted: ScheduleEntry,
    /// Slots currently inside the window.
    pub main: Vec<ScheduleEntry>,
    /// The part of the window already lived.
    pub truncated: Vec<ScheduleEntry>,
    /// Deterministic rewrite that keeps the window total.
    pub proposal: Vec<ScheduleEntry>,
    /// Window start hour.
    pub start_hour: u32,
    /// Window end hour.
    pub end_hour: u32,
}

/// The object side of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAction {
    /// What the object is doing, e.g. "being used".
    pub description: String,
    /// `(object, predicate, object-state)`.
    pub event: Triple,
}

/// Context around a candidate reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionContext {
    /// Description of the focused event.
    pub focus: String,
    /// Descriptions of related memories.
    pub memories: Vec<String>,
}

/// How an agent reacts to someone else's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactMode {
    /// Wait until the other agent is done.
    Wait,
    /// Do something else instead.
    DoOther,
    /// Carry on with the current plan.
    #[default]
    Keep,
}

/// A generated conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// `(speaker, utterance)` rows.
    pub transcript: Transcript,
    /// One-line summary, used as the chat activity.
    pub summary: String,
}

/// What to do about a hazard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccidentResponse {
    /// Corrective activity.
    pub activity: String,
    /// Minutes. Clamped by the engine.
    pub duration: u32,
}

impl Default for AccidentResponse {
    fn default() -> Self {
        Self {
            activity: "putting out the fire".to_string(),
            duration: 10,
        }
    }
}

/// Day-boundary revision of who the agent is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRevision {
    /// New `currently`.
    pub currently: String,
    /// New plan requirement.
    pub daily_plan_req: String,
}

/// A reflected insight and the nodes it rests on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    /// The thought.
    pub text: String,
    /// Supporting nodes.
    pub evidence: Vec<NodeId>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Every decision the engine delegates.
///
/// Implementations must be `Send + Sync` so one oracle can serve every
/// agent.
pub trait CognitionOracle: Send + Sync {
    /// Hour of the day the agent wakes up.
    fn wake_up_hour(&self, agent: &AgentState) -> OracleResult<u32>;

    /// Broad goals for today.
    fn daily_plan(&self, agent: &AgentState, wake_hour: u32) -> OracleResult<Vec<String>>;

    /// The activity for `hour`, given the hours already planned.
    fn hourly_activity(&self, agent: &AgentState, hour: u32, so_far: &[String]) -> OracleResult<String>;

    /// Finer steps for one schedule slot.
    fn decompose_task(&self, agent: &AgentState, task: &ScheduleEntry) -> OracleResult<Vec<ScheduleEntry>>;

    /// A rewritten window that fits `request.inserted` in.
    fn rewrite_window(&self, agent: &AgentState, request: &WindowRequest) -> OracleResult<Vec<ScheduleEntry>>;

    /// One of `request.options`.
    fn action_location(&self, agent: &AgentState, request: &LocationRequest) -> OracleResult<String>;

    /// An emoji for the activity.
    fn pronunciatio(&self, agent: &AgentState, activity: &str) -> OracleResult<String>;

    /// `(agent, predicate, object)` for the activity.
    fn event_triple(&self, agent: &AgentState, activity: &str) -> OracleResult<Triple>;

    /// What happens to `object` while the activity uses it.
    fn object_action(&self, agent: &AgentState, object: &str, activity: &str) -> OracleResult<ObjectAction>;

    /// Salience on a 1..=10 scale.
    fn poignancy(&self, agent: &AgentState, kind: PoignancyKind, description: &str) -> OracleResult<u32>;

    /// Whether `agent` starts a chat with `target`.
    fn decide_to_talk(
        &self,
        agent: &AgentState,
        target: &AgentState,
        context: &ReactionContext,
    ) -> OracleResult<bool>;

    /// Whether `agent` waits for `target`.
    fn decide_to_react(
        &self,
        agent: &AgentState,
        target: &AgentState,
        context: &ReactionContext,
    ) -> OracleResult<ReactMode>;

    /// The conversation between `agent` and `target`.
    fn converse(
        &self,
        agent: &AgentState,
        target: &AgentState,
        context: &ReactionContext,
    ) -> OracleResult<Conversation>;

    /// How to respond to a hazard event.
    fn accident_response(&self, agent: &AgentState, event: &Event) -> OracleResult<AccidentResponse>;

    /// The state of `object` after `activity`.
    fn update_object_state(
        &self,
        agent: &AgentState,
        object: &str,
        current_state: &str,
        activity: &str,
    ) -> OracleResult<String>;

    /// Revise `currently` and the plan requirement from recent memories.
    fn revise_identity(&self, agent: &AgentState, memories: &[String]) -> OracleResult<IdentityRevision>;

    /// Up to `n` questions worth reflecting on.
    fn reflection_focal_points(
        &self,
        agent: &AgentState,
        statements: &[String],
        n: usize,
    ) -> OracleResult<Vec<String>>;

    /// Up to `n` insights drawn from numbered statements.
    fn reflection_insights(
        &self,
        agent: &AgentState,
        statements: &[(NodeId, String)],
        n: usize,
    ) -> OracleResult<Vec<Insight>>;
}

// ---------------------------------------------------------------------------
// Retry helpers
// ---------------------------------------------------------------------------

/// Call the oracle up to `max_retries + 1` times, capped at `u32::MAX`.
///
/// # Errors
/// Returns [`OracleError::RetriesExhausted`] with the last failure.
pub fn consult<T>(
    max_retries: u32,
    decision: Decision,
    mut call: impl FnMut() -> OracleResult<T>,
) -> OracleResult<T> {
    let attempts = max_retries.saturating_add(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(%decision, attempt, error = %e, "Oracle call failed");
                last_error = e.to_string();
            }
        }
    }
    Err(OracleError::RetriesExhausted {
        attempts,
        last_error,
    })
}

/// [`consult`], falling back to `fallback` once retries are spent.
pub fn consult_or<T>(
    max_retries: u32,
    decision: Decision,
    fallback: T,
    call: impl FnMut() -> OracleResult<T>,
) -> T {
    match consult(max_retries, decision, call) {
        Ok(value) => value,
        Err(e) => {
            warn!(%decision, error = %e, "Oracle failed; using default");
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Deterministic stub
// ---------------------------------------------------------------------------

const STUB_DAY: [&str; 24] = [
    "sleeping",
    "sleeping",
    "sleeping",
    "sleeping",
    "sleeping",
    "sleeping",
    "waking up and completing the morning routine",
    "eating breakfast",
    "working on the day's tasks",
    "working on the day's tasks",
    "working on the day's tasks",
    "taking a walk",
    "having lunch",
    "working on the day's tasks",
    "working on the day's tasks",
    "working on the day's tasks",
    "reading a book",
    "relaxing",
    "having dinner",
    "relaxing",
    "reading a book",
    "getting ready for bed",
    "sleeping",
    "sleeping",
];

/// Mutable knobs and a call log for [`StubOracle`].
#[derive(Debug, Default)]
struct StubState {
    talk: bool,
    react: ReactMode,
    poignancy: u32,
    object_states: VecDeque<String>,
    fail_all: bool,
    calls: Vec<Decision>,
}

/// A deterministic oracle.
///
/// Answers are fixed functions of the request. Chatting, reacting,
/// poignancy and object states can be scripted; every call is logged.
#[derive(Debug)]
pub struct StubOracle {
    state: Mutex<StubState>,
}

impl Default for StubOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl StubOracle {
    /// Never talks, keeps its plans, poignancy 3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                poignancy: 3,
                ..StubState::default()
            }),
        }
    }

    /// Whether agents start chats.
    #[must_use]
    pub fn with_talk(self, talk: bool) -> Self {
        self.state.lock().talk = talk;
        self
    }

    /// How agents react to each other.
    #[must_use]
    pub fn with_react(self, mode: ReactMode) -> Self {
        self.state.lock().react = mode;
        self
    }

    /// Poignancy of every memory.
    #[must_use]
    pub fn with_poignancy(self, poignancy: u32) -> Self {
        self.state.lock().poignancy = poignancy;
        self
    }

    /// Object states returned by successive updates. Once exhausted,
    /// updates answer "extinguished".
    #[must_use]
    pub fn with_object_states<I, S>(self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().object_states = states.into_iter().map(Into::into).collect();
        self
    }

    /// Make every call fail with [`OracleError::Unavailable`].
    #[must_use]
    pub fn failing(self) -> Self {
        self.state.lock().fail_all = true;
        self
    }

    /// Decisions asked for so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Decision> {
        self.state.lock().calls.clone()
    }

    /// How often `decision` was asked for.
    #[must_use]
    pub fn call_count(&self, decision: Decision) -> usize {
        self.state.lock().calls.iter().filter(|d| **d == decision).count()
    }

    fn record(&self, decision: Decision) -> OracleResult<()> {
        let mut state = self.state.lock();
        state.calls.push(decision);
        if state.fail_all {
            Err(OracleError::Unavailable("stub configured to fail".into()))
        } else {
            Ok(())
        }
    }
}

fn icon_for(activity: &str) -> &'static str {
    let a = activity.to_lowercase();
    if a.contains("sleep") || a.contains("bed") {
        "😴"
    } else if a.contains("eat") || a.contains("breakfast") || a.contains("lunch") || a.contains("dinner") {
        "🍽️"
    } else if a.contains("fire") {
        "🧯"
    } else if a.contains("work") || a.contains("paint") || a.contains("writ") {
        "💼"
    } else if a.contains("read") {
        "📖"
    } else {
        "🙂"
    }
}

impl CognitionOracle for StubOracle {
    fn wake_up_hour(&self, _agent: &AgentState) -> OracleResult<u32> {
        self.record(Decision::WakeHour)?;
        Ok(6)
    }

    fn daily_plan(&self, _agent: &AgentState, wake_hour: u32) -> OracleResult<Vec<String>> {
        self.record(Decision::DailyPlan)?;
        Ok(vec![
            format!("wake up and complete the morning routine at {wake_hour}:00 am"),
            "work on the day's tasks".to_string(),
            "have dinner and relax".to_string(),
        ])
    }

    fn hourly_activity(&self, _agent: &AgentState, hour: u32, _so_far: &[String]) -> OracleResult<String> {
        self.record(Decision::HourlySchedule)?;
        let slot = usize::try_from(hour).unwrap_or(0).min(STUB_DAY.len() - 1);
        Ok(STUB_DAY[slot].to_string())
    }

    fn decompose_task(&self, _agent: &AgentState, task: &ScheduleEntry) -> OracleResult<Vec<ScheduleEntry>> {
        self.record(Decision::TaskDecomposition)?;
        let parts = (task.duration() / 30).max(1);
        let chunk = task.duration() / parts;
        let mut out: Vec<ScheduleEntry> = (1..=parts)
            .map(|i| ScheduleEntry::new(format!("{} (part {i})", task.activity()), chunk))
            .collect();
        if let Some(last) = out.last_mut() {
            last.1 += task.duration() - chunk * parts;
        }
        Ok(out)
    }

    fn rewrite_window(&self, _agent: &AgentState, request: &WindowRequest) -> OracleResult<Vec<ScheduleEntry>> {
        self.record(Decision::WindowRewrite)?;
        Ok(request.proposal.clone())
    }

    fn action_location(&self, _agent: &AgentState, request: &LocationRequest) -> OracleResult<String> {
        self.record(Decision::ActionTarget)?;
        let activity = request.activity.to_lowercase();
        let overlapping = request.options.iter().find(|option| {
            option
                .to_lowercase()
                .split_whitespace()
                .any(|word| word.len() > 2 && activity.contains(word))
        });
        overlapping
            .or_else(|| request.options.first())
            .cloned()
            .ok_or_else(|| OracleError::InvalidResponse("no options".into()))
    }

    fn pronunciatio(&self, _agent: &AgentState, activity: &str) -> OracleResult<String> {
        self.record(Decision::Pronunciatio)?;
        Ok(icon_for(activity).to_string())
    }

    fn event_triple(&self, agent: &AgentState, activity: &str) -> OracleResult<Triple> {
        self.record(Decision::EventTriple)?;
        Ok(Triple::new(agent.name.clone(), "is", activity))
    }

    fn object_action(&self, _agent: &AgentState, object: &str, _activity: &str) -> OracleResult<ObjectAction> {
        self.record(Decision::ObjectAction)?;
        Ok(ObjectAction {
            description: "in use".to_string(),
            event: Triple::new(object, "is", "in use"),
        })
    }

    fn poignancy(&self, _agent: &AgentState, _kind: PoignancyKind, _description: &str) -> OracleResult<u32> {
        self.record(Decision::Poignancy)?;
        Ok(self.state.lock().poignancy)
    }

    fn decide_to_talk(
        &self,
        _agent: &AgentState,
        _target: &AgentState,
        _context: &ReactionContext,
    ) -> OracleResult<bool> {
        self.record(Decision::DecideToTalk)?;
        Ok(self.state.lock().talk)
    }

    fn decide_to_react(
        &self,
        _agent: &AgentState,
        _target: &AgentState,
        _context: &ReactionContext,
    ) -> OracleResult<ReactMode> {
        self.record(Decision::DecideToReact)?;
        Ok(self.state.lock().react)
    }

    fn converse(
        &self,
        agent: &AgentState,
        target: &AgentState,
        _context: &ReactionContext,
    ) -> OracleResult<Conversation> {
        self.record(Decision::Conversation)?;
        Ok(Conversation {
            transcript: vec![
                (agent.name.clone(), format!("Hi {}, how is your day going?", target.first_name)),
                (target.name.clone(), "Pretty good, thanks for asking!".to_string()),
            ],
            summary: "conversing about their day".to_string(),
        })
    }

    fn accident_response(&self, _agent: &AgentState, _event: &Event) -> OracleResult<AccidentResponse> {
        self.record(Decision::AccidentResponse)?;
        Ok(AccidentResponse::default())
    }

    fn update_object_state(
        &self,
        _agent: &AgentState,
        _object: &str,
        _current_state: &str,
        _activity: &str,
    ) -> OracleResult<String> {
        self.record(Decision::ObjectStateUpdate)?;
        Ok(self
            .state
            .lock()
            .object_states
            .pop_front()
            .unwrap_or_else(|| "extinguished".to_string()))
    }

    fn revise_identity(&self, agent: &AgentState, _memories: &[String]) -> OracleResult<IdentityRevision> {
        self.record(Decision::IdentityRevision)?;
        Ok(IdentityRevision {
            currently: agent.currently.clone(),
            daily_plan_req: agent.daily_plan_req.clone(),
        })
    }

    fn reflection_focal_points(
        &self,
        _agent: &AgentState,
        statements: &[String],
        n: usize,
    ) -> OracleResult<Vec<String>> {
        self.record(Decision::ReflectionFocus)?;
        Ok(statements.iter().take(n).cloned().collect())
    }

    fn reflection_insights(
        &self,
        agent: &AgentState,
        statements: &[(NodeId, String)],
        n: usize,
    ) -> OracleResult<Vec<Insight>> {
        self.record(Decision::ReflectionInsight)?;
        Ok(statements
            .iter()
            .take(n.min(1))
            .map(|(id, text)| Insight {
                text: format!("{} has been noticing that {text}", agent.first_name),
                evidence: vec![*id],
            })
            .collect())
    }
}
