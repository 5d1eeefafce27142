//! [`CognitionOracle`] backed by a language model.
//!
//! Each trait method renders its prompt, sends one request, parses the
//! JSON reply and checks it before handing it to the engine. Anything the
//! model gets wrong becomes an [`OracleError`]; the engine retries and then
//! falls back to its defaults.
//!
//! The trait is synchronous. Inside a multi-threaded tokio runtime the call
//! is driven with `block_in_place`; elsewhere the oracle uses its own
//! current-thread runtime.

use parking_lot::Mutex;
use reverie_core::agent::{AgentState, ScheduleEntry};
use reverie_core::config::ReverieConfig;
use reverie_core::memory::NodeId;
use reverie_core::oracle::{
    AccidentResponse, CognitionOracle, Conversation, Decision, IdentityRevision, Insight, LocationRequest,
    ObjectAction, OracleError, OracleResult, PoignancyKind, ReactMode, ReactionContext, WindowRequest,
};
use reverie_core::types::{Event, Triple};
use reverie_core::world::AddressLevel;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::bridge::Blocking;
use crate::client::LlmClient;
use crate::error::LlmError;
use crate::prompt::PromptEngine;
use crate::types::{
    AccidentReply, ActivityReply, ChoiceReply, ConversationReply, EmojiReply, IdentityReply, InsightsReply,
    LlmRequest, ListReply, ObjectActionReply, ScheduleReply, ScoreReply, StateReply, TripleReply, WakeHourReply,
    YesNoReply,
};

/// Transport-level retries per request. Parse failures are retried by the
/// engine.
pub(crate) const TRANSPORT_RETRIES: u32 = 1;

/// Running totals across all calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleStats {
    /// Requests sent.
    pub calls: u64,
    /// Requests that produced no usable decision.
    pub failures: u64,
    /// Tokens generated.
    pub tokens: u64,
}

/// Language-model oracle.
pub struct LlmOracle {
    client: LlmClient,
    prompts: PromptEngine,
    bridge: Blocking,
    timeout_ms: u64,
    max_tokens: u32,
    temperature: f32,
    stats: Mutex<OracleStats>,
}

impl std::fmt::Debug for LlmOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmOracle")
            .field("client", &self.client)
            .field("templates", &self.prompts.len())
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl LlmOracle {
    /// Build an oracle from explicit parts.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` if the fallback runtime cannot start.
    pub fn new(client: LlmClient, prompts: PromptEngine) -> Result<Self, LlmError> {
        Ok(Self {
            client,
            prompts,
            bridge: Blocking::new()?,
            timeout_ms: 30_000,
            max_tokens: u32::MAX,
            temperature: 1.0,
            stats: Mutex::new(OracleStats::default()),
        })
    }

    /// Build an oracle from the `[llm]` section with the built-in prompts.
    ///
    /// `max_tokens` and `temperature` cap the per-template values.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` for a bad provider or missing key.
    pub fn from_config(config: &ReverieConfig) -> Result<Self, LlmError> {
        let client = LlmClient::from_config(&config.llm, TRANSPORT_RETRIES)?;
        let mut oracle = Self::new(client, PromptEngine::builtin())?;
        oracle.timeout_ms = config.llm.request_timeout_ms;
        oracle.max_tokens = config.llm.max_tokens;
        oracle.temperature = config.llm.temperature;
        Ok(oracle)
    }

    /// Replace the prompt set.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptEngine) -> Self {
        self.prompts = prompts;
        self
    }

    /// Totals so far.
    #[must_use]
    pub fn stats(&self) -> OracleStats {
        *self.stats.lock()
    }

    /// Render, send and parse one decision.
    fn ask<T: DeserializeOwned>(
        &self,
        decision: Decision,
        agent: &AgentState,
        vars: &[(&str, &str)],
    ) -> OracleResult<T> {
        let identity = agent.identity_summary();
        let mut all: Vec<(&str, &str)> = vec![("name", agent.name.as_str()), ("identity", identity.as_str())];
        all.extend_from_slice(vars);

        let (system, user) = self
            .prompts
            .render(decision, &all)
            .map_err(OracleError::Unavailable)?;
        let (max_tokens, temperature) = self
            .prompts
            .get(decision)
            .map_or((self.max_tokens, self.temperature), |t| {
                (t.max_tokens.min(self.max_tokens), t.temperature.min(self.temperature))
            });
        let request = LlmRequest::new(system, user)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature)
            .with_timeout(self.timeout_ms);

        let result = self
            .bridge
            .block_on(self.client.generate(&request))
            .and_then(|response| {
                debug!(
                    %decision,
                    agent = %agent.name,
                    latency_ms = response.latency_ms,
                    tokens = response.tokens_generated,
                    "LLM answered"
                );
                self.stats.lock().tokens += u64::from(response.tokens_generated);
                LlmClient::parse_structured::<T>(&response)
            });

        let mut stats = self.stats.lock();
        stats.calls += 1;
        if result.is_err() {
            stats.failures += 1;
        }
        result.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn lines(items: &[String]) -> String {
    if items.is_empty() {
        return "(nothing)\n".to_string();
    }
    items.iter().map(|i| format!("- {i}\n")).collect()
}

fn slots(entries: &[ScheduleEntry]) -> String {
    if entries.is_empty() {
        return "(nothing)\n".to_string();
    }
    entries
        .iter()
        .map(|e| format!("- {} ({} minutes)\n", e.activity(), e.duration()))
        .collect()
}

fn numbered(statements: impl Iterator<Item = String>) -> String {
    statements
        .enumerate()
        .map(|(i, s)| format!("{}. {s}\n", i + 1))
        .collect()
}

fn level_name(level: AddressLevel) -> &'static str {
    match level {
        AddressLevel::World => "world",
        AddressLevel::Sector => "area",
        AddressLevel::Arena => "room",
        AddressLevel::GameObject => "object",
    }
}

fn activity_of(agent: &AgentState) -> &str {
    agent.act_description.as_deref().unwrap_or("idle")
}

fn non_empty(text: String, what: &str) -> Result<String, LlmError> {
    let text = text.trim().to_string();
    if text.is_empty() {
        Err(LlmError::SchemaValidation(format!("empty {what}")))
    } else {
        Ok(text)
    }
}

fn to_schedule(reply: ScheduleReply) -> Result<Vec<ScheduleEntry>, LlmError> {
    let entries: Vec<ScheduleEntry> = reply
        .slots
        .into_iter()
        .filter(|s| !s.activity.trim().is_empty())
        .map(|s| ScheduleEntry::new(s.activity.trim(), s.minutes))
        .collect();
    if entries.is_empty() {
        return Err(LlmError::SchemaValidation("empty schedule".into()));
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

impl CognitionOracle for LlmOracle {
    fn wake_up_hour(&self, agent: &AgentState) -> OracleResult<u32> {
        let reply: WakeHourReply = self.ask(Decision::WakeHour, agent, &[("lifestyle", &agent.lifestyle)])?;
        if reply.wake_hour > 23 {
            return Err(LlmError::SchemaValidation(format!("wake hour {}", reply.wake_hour)).into());
        }
        Ok(reply.wake_hour)
    }

    fn daily_plan(&self, agent: &AgentState, wake_hour: u32) -> OracleResult<Vec<String>> {
        let hour = wake_hour.to_string();
        let reply: ListReply = self.ask(Decision::DailyPlan, agent, &[("wake_hour", &hour)])?;
        let plan: Vec<String> = reply
            .items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if plan.is_empty() {
            return Err(LlmError::SchemaValidation("empty daily plan".into()).into());
        }
        Ok(plan)
    }

    fn hourly_activity(&self, agent: &AgentState, hour: u32, so_far: &[String]) -> OracleResult<String> {
        let hour = hour.to_string();
        let planned = numbered(so_far.iter().cloned());
        let reply: ActivityReply =
            self.ask(Decision::HourlySchedule, agent, &[("hour", &hour), ("so_far", &planned)])?;
        Ok(non_empty(reply.activity, "activity")?)
    }

    fn decompose_task(&self, agent: &AgentState, task: &ScheduleEntry) -> OracleResult<Vec<ScheduleEntry>> {
        let minutes = task.duration().to_string();
        let schedule = agent.daily_schedule_summary();
        let reply: ScheduleReply = self.ask(
            Decision::TaskDecomposition,
            agent,
            &[("task", task.activity()), ("minutes", &minutes), ("schedule", &schedule)],
        )?;
        Ok(to_schedule(reply)?)
    }

    fn rewrite_window(&self, agent: &AgentState, request: &WindowRequest) -> OracleResult<Vec<ScheduleEntry>> {
        let inserted = format!("{} ({} minutes)", request.inserted.activity(), request.inserted.duration());
        let (start, end) = (request.start_hour.to_string(), request.end_hour.to_string());
        let (main, truncated, proposal) = (
            slots(&request.main),
            slots(&request.truncated),
            slots(&request.proposal),
        );
        let reply: ScheduleReply = self.ask(
            Decision::WindowRewrite,
            agent,
            &[
                ("inserted", &inserted),
                ("start_hour", &start),
                ("end_hour", &end),
                ("main", &main),
                ("truncated", &truncated),
                ("proposal", &proposal),
            ],
        )?;
        Ok(to_schedule(reply)?)
    }

    fn action_location(&self, agent: &AgentState, request: &LocationRequest) -> OracleResult<String> {
        let options = lines(&request.options);
        let reply: ChoiceReply = self.ask(
            Decision::ActionTarget,
            agent,
            &[
                ("activity", &request.activity),
                ("level", level_name(request.level)),
                ("parent", &request.parent),
                ("options", &options),
            ],
        )?;
        let choice = reply.choice.trim();
        request
            .options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(choice))
            .cloned()
            .ok_or_else(|| LlmError::SchemaValidation(format!("'{choice}' is not an option")).into())
    }

    fn pronunciatio(&self, agent: &AgentState, activity: &str) -> OracleResult<String> {
        let reply: EmojiReply = self.ask(Decision::Pronunciatio, agent, &[("activity", activity)])?;
        Ok(non_empty(reply.emoji, "emoji")?)
    }

    fn event_triple(&self, agent: &AgentState, activity: &str) -> OracleResult<Triple> {
        let reply: TripleReply = self.ask(Decision::EventTriple, agent, &[("activity", activity)])?;
        Ok(Triple::new(
            agent.name.as_str(),
            non_empty(reply.predicate, "predicate")?,
            non_empty(reply.object, "object")?,
        ))
    }

    fn object_action(&self, agent: &AgentState, object: &str, activity: &str) -> OracleResult<ObjectAction> {
        let reply: ObjectActionReply =
            self.ask(Decision::ObjectAction, agent, &[("object", object), ("activity", activity)])?;
        Ok(ObjectAction {
            description: non_empty(reply.description, "description")?,
            event: Triple::new(object, non_empty(reply.predicate, "predicate")?, non_empty(reply.state, "state")?),
        })
    }

    fn poignancy(&self, agent: &AgentState, kind: PoignancyKind, description: &str) -> OracleResult<u32> {
        let kind = match kind {
            PoignancyKind::Event => "event",
            PoignancyKind::Chat => "conversation",
            PoignancyKind::Thought => "thought",
        };
        let reply: ScoreReply =
            self.ask(Decision::Poignancy, agent, &[("kind", kind), ("description", description)])?;
        Ok(reply.score.clamp(1, 10))
    }

    fn decide_to_talk(
        &self,
        agent: &AgentState,
        target: &AgentState,
        context: &ReactionContext,
    ) -> OracleResult<bool> {
        let memories = lines(&context.memories);
        let reply: YesNoReply = self.ask(
            Decision::DecideToTalk,
            agent,
            &[
                ("target", &target.name),
                ("target_activity", activity_of(target)),
                ("focus", &context.focus),
                ("memories", &memories),
            ],
        )?;
        Ok(reply.answer)
    }

    fn decide_to_react(
        &self,
        agent: &AgentState,
        target: &AgentState,
        context: &ReactionContext,
    ) -> OracleResult<ReactMode> {
        let memories = lines(&context.memories);
        let reply: ChoiceReply = self.ask(
            Decision::DecideToReact,
            agent,
            &[
                ("activity", activity_of(agent)),
                ("target", &target.name),
                ("target_activity", activity_of(target)),
                ("focus", &context.focus),
                ("memories", &memories),
            ],
        )?;
        match reply.choice.trim().to_ascii_lowercase().as_str() {
            "wait" => Ok(ReactMode::Wait),
            "do_other" | "do other" => Ok(ReactMode::DoOther),
            "keep" => Ok(ReactMode::Keep),
            other => Err(LlmError::SchemaValidation(format!("unknown reaction '{other}'")).into()),
        }
    }

    fn converse(
        &self,
        agent: &AgentState,
        target: &AgentState,
        context: &ReactionContext,
    ) -> OracleResult<Conversation> {
        let memories = lines(&context.memories);
        let target_identity = target.identity_summary();
        let location = agent.act_address.as_deref().unwrap_or("somewhere in town");
        let reply: ConversationReply = self.ask(
            Decision::Conversation,
            agent,
            &[
                ("target", &target.name),
                ("target_identity", &target_identity),
                ("focus", &context.focus),
                ("memories", &memories),
                ("location", location),
            ],
        )?;

        let transcript: Vec<(String, String)> = reply
            .utterances
            .into_iter()
            .filter(|u| u.speaker == agent.name || u.speaker == target.name)
            .filter(|u| !u.line.trim().is_empty())
            .map(|u| (u.speaker, u.line.trim().to_string()))
            .collect();
        if transcript.is_empty() {
            return Err(LlmError::SchemaValidation("no utterances from either speaker".into()).into());
        }
        Ok(Conversation {
            transcript,
            summary: non_empty(reply.summary, "summary")?,
        })
    }

    fn accident_response(&self, agent: &AgentState, event: &Event) -> OracleResult<AccidentResponse> {
        let hazard = event.description.as_deref().unwrap_or("something is wrong");
        let reply: AccidentReply =
            self.ask(Decision::AccidentResponse, agent, &[("hazard", hazard), ("address", &event.subject)])?;
        Ok(AccidentResponse {
            activity: non_empty(reply.activity, "activity")?,
            duration: reply.minutes,
        })
    }

    fn update_object_state(
        &self,
        agent: &AgentState,
        object: &str,
        current_state: &str,
        activity: &str,
    ) -> OracleResult<String> {
        let reply: StateReply = self.ask(
            Decision::ObjectStateUpdate,
            agent,
            &[("object", object), ("current_state", current_state), ("activity", activity)],
        )?;
        Ok(non_empty(reply.state, "state")?)
    }

    fn revise_identity(&self, agent: &AgentState, memories: &[String]) -> OracleResult<IdentityRevision> {
        let memories = lines(memories);
        let reply: IdentityReply = self.ask(
            Decision::IdentityRevision,
            agent,
            &[("memories", &memories), ("currently", &agent.currently)],
        )?;
        Ok(IdentityRevision {
            currently: non_empty(reply.currently, "status")?,
            daily_plan_req: non_empty(reply.daily_plan_req, "plan requirement")?,
        })
    }

    fn reflection_focal_points(
        &self,
        agent: &AgentState,
        statements: &[String],
        n: usize,
    ) -> OracleResult<Vec<String>> {
        let statements = lines(statements);
        let count = n.to_string();
        let reply: ListReply = self.ask(
            Decision::ReflectionFocus,
            agent,
            &[("statements", &statements), ("count", &count)],
        )?;
        let points: Vec<String> = reply
            .items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(n)
            .collect();
        if points.is_empty() {
            return Err(LlmError::SchemaValidation("no focal points".into()).into());
        }
        Ok(points)
    }

    fn reflection_insights(
        &self,
        agent: &AgentState,
        statements: &[(NodeId, String)],
        n: usize,
    ) -> OracleResult<Vec<Insight>> {
        let listed = numbered(statements.iter().map(|(_, s)| s.clone()));
        let count = n.to_string();
        let reply: InsightsReply = self.ask(
            Decision::ReflectionInsight,
            agent,
            &[("statements", &listed), ("count", &count)],
        )?;

        // Evidence is cited by 1-based statement number.
        let insights: Vec<Insight> = reply
            .insights
            .into_iter()
            .filter(|i| !i.insight.trim().is_empty())
            .take(n)
            .map(|i| Insight {
                text: i.insight.trim().to_string(),
                evidence: i
                    .evidence
                    .iter()
                    .filter_map(|&k| k.checked_sub(1).and_then(|k| statements.get(k)))
                    .map(|(id, _)| *id)
                    .collect(),
            })
            .collect();
        if insights.is_empty() {
            return Err(LlmError::SchemaValidation("no insights".into()).into());
        }
        Ok(insights)
    }
}
