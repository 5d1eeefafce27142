//! Prompt templates for every cognition decision.
//!
//! Templates use `{key}` placeholders filled by [`render_template`]. All
//! decisions share [`PERSONA_SYSTEM`]; each has its own user template that
//! ends by naming the JSON object the model must return.
//!
//! A directory of TOML files (`{decision}.toml`, e.g. `poignancy.toml`)
//! can override the built-in set:
//!
//! ```toml
//! [prompt]
//! version = "2"
//! max_tokens = 200
//! temperature = 0.5
//! system = "You are {name}. ..."
//! user = "..."
//! ```

use std::collections::HashMap;
use std::path::Path;

use reverie_core::oracle::Decision;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

/// Shared system prompt. Vars: `name`, `identity`.
pub const PERSONA_SYSTEM: &str = r"You are {name}, a resident of a small simulated town.
Stay in character and answer only for {name}.

{identity}
Always answer with a single JSON object and nothing else.";

/// Vars: `name`, `lifestyle`.
pub const WAKE_HOUR_USER: &str = r#"{name}'s lifestyle: {lifestyle}

At what hour of the day (0-23) does {name} wake up today?
Respond with JSON: {"wake_hour": <integer>}"#;

/// Vars: `name`, `wake_hour`.
pub const DAILY_PLAN_USER: &str = r#"{name} wakes up at {wake_hour}:00 today.
List {name}'s broad plan for the day, in order, as short phrases with times
(e.g. "wake up and complete the morning routine at 7:00 am").
Respond with JSON: {"items": ["...", "..."]}"#;

/// Vars: `name`, `hour`, `so_far`.
pub const HOURLY_SCHEDULE_USER: &str = r#"Hours already planned for {name} today:
{so_far}
What is {name} doing from {hour}:00 to {hour}:59? Use a short present-participle phrase.
Respond with JSON: {"activity": "..."}"#;

/// Vars: `name`, `task`, `minutes`, `schedule`.
pub const TASK_DECOMPOSITION_USER: &str = r#"{name}'s schedule today:
{schedule}
Break "{task}" ({minutes} minutes) into 5-15 minute steps that {name} performs in order.
The minutes must add up to {minutes}.
Respond with JSON: {"slots": [{"activity": "...", "minutes": <integer>}]}"#;

/// Vars: `name`, `inserted`, `start_hour`, `end_hour`, `main`, `truncated`, `proposal`.
pub const WINDOW_REWRITE_USER: &str = r#"{name}'s plan from {start_hour}:00 to {end_hour}:00 was:
{main}
Already done:
{truncated}
{name} now has to fit in: {inserted}.
A possible revision:
{proposal}
Rewrite the whole window so it keeps the same total minutes and includes the new activity.
Respond with JSON: {"slots": [{"activity": "...", "minutes": <integer>}]}"#;

/// Vars: `name`, `activity`, `level`, `parent`, `options`.
pub const ACTION_TARGET_USER: &str = r#"{name} is going to be {activity}.
{name} is at {parent} and knows of these {level} options:
{options}
Which {level} should {name} use? Pick exactly one of the options.
Respond with JSON: {"choice": "..."}"#;

/// Vars: `activity`.
pub const PRONUNCIATIO_USER: &str = r#"Convert this activity to one to three emoji: {activity}
Respond with JSON: {"emoji": "..."}"#;

/// Vars: `name`, `activity`.
pub const EVENT_TRIPLE_USER: &str = r#"Express "{name} is {activity}" as a (subject, predicate, object) triple
with subject "{name}".
Respond with JSON: {"predicate": "...", "object": "..."}"#;

/// Vars: `name`, `object`, `activity`.
pub const OBJECT_ACTION_USER: &str = r#"{name} is {activity} using the {object}.
What is the {object} doing meanwhile (e.g. "being used", "brewing coffee")?
Respond with JSON: {"description": "...", "predicate": "is", "state": "..."}"#;

/// Vars: `name`, `kind`, `description`.
pub const POIGNANCY_USER: &str = r#"On a scale of 1 to 10, where 1 is purely mundane (brushing teeth, making bed)
and 10 is extremely poignant (a break up, college acceptance), rate how poignant
this {kind} is for {name}:
{description}
Respond with JSON: {"score": <integer>}"#;

/// Vars: `name`, `target`, `target_activity`, `focus`, `memories`.
pub const DECIDE_TO_TALK_USER: &str = r#"{name} notices: {focus}
{target} is currently {target_activity}.
What {name} remembers:
{memories}
Would {name} start a conversation with {target} right now?
Respond with JSON: {"answer": true | false}"#;

/// Vars: `name`, `activity`, `target`, `target_activity`, `focus`, `memories`.
pub const DECIDE_TO_REACT_USER: &str = r#"{name} is about to be {activity} and notices: {focus}
{target} is currently {target_activity}.
What {name} remembers:
{memories}
Should {name} "wait" for {target} to finish, "do_other" and do something else,
or "keep" going with the plan?
Respond with JSON: {"choice": "wait" | "do_other" | "keep"}"#;

/// Vars: `name`, `target`, `target_identity`, `focus`, `memories`, `location`.
pub const CONVERSATION_USER: &str = r#"{name} and {target} meet at {location}.
About {target}:
{target_identity}
{name} notices: {focus}
What {name} remembers:
{memories}
Write their short conversation, alternating speakers and starting with {name},
then summarize it in one line ("conversing about ...").
Respond with JSON: {"utterances": [{"speaker": "...", "line": "..."}], "summary": "..."}"#;

/// Vars: `name`, `hazard`, `address`.
pub const ACCIDENT_RESPONSE_USER: &str = r#"{name} notices an emergency: {hazard} at {address}.
What does {name} do about it, and for how many minutes (5-15)?
Respond with JSON: {"activity": "...", "minutes": <integer>}"#;

/// Vars: `name`, `object`, `current_state`, `activity`.
pub const OBJECT_STATE_USER: &str = r#"The {object} was {current_state}. {name} spent time {activity}.
What state is the {object} in now? Use a short phrase such as "extinguished" or "safe"
if the problem is solved.
Respond with JSON: {"state": "..."}"#;

/// Vars: `name`, `memories`, `currently`.
pub const IDENTITY_REVISION_USER: &str = r#"Until now, {name}'s status was: {currently}
Recent memories:
{memories}
Write {name}'s updated status paragraph and what {name}'s plan for today should include.
Respond with JSON: {"currently": "...", "daily_plan_req": "..."}"#;

/// Vars: `name`, `statements`, `count`.
pub const REFLECTION_FOCUS_USER: &str = r#"{statements}
Given only the statements above, what are the {count} most salient high-level
questions we can answer about {name}?
Respond with JSON: {"items": ["...", "..."]}"#;

/// Vars: `name`, `statements`, `count`.
pub const REFLECTION_INSIGHT_USER: &str = r#"Statements about {name}:
{statements}
What {count} high-level insights can you infer from the statements above?
Cite the numbers of the statements each insight rests on.
Respond with JSON: {"insights": [{"insight": "...", "evidence": [<integer>]}]}"#;

/// Every decision with a template.
pub const DECISIONS: [Decision; 18] = [
    Decision::WakeHour,
    Decision::DailyPlan,
    Decision::HourlySchedule,
    Decision::TaskDecomposition,
    Decision::WindowRewrite,
    Decision::ActionTarget,
    Decision::Pronunciatio,
    Decision::EventTriple,
    Decision::ObjectAction,
    Decision::Poignancy,
    Decision::DecideToTalk,
    Decision::DecideToReact,
    Decision::Conversation,
    Decision::AccidentResponse,
    Decision::ObjectStateUpdate,
    Decision::IdentityRevision,
    Decision::ReflectionFocus,
    Decision::ReflectionInsight,
];

/// Replaces `{key}` with the corresponding value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(default)]
    system: Option<String>,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Version string ("builtin" for compiled-in templates).
    pub version: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// System prompt template.
    pub system: String,
    /// User prompt template.
    pub user: String,
}

impl PromptTemplate {
    fn builtin(user: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            version: "builtin".into(),
            max_tokens,
            temperature,
            system: PERSONA_SYSTEM.into(),
            user: user.into(),
        }
    }
}

/// Holds one template per decision and renders them.
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<Decision, PromptTemplate>,
}

impl PromptEngine {
    /// The compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        let templates = DECISIONS
            .iter()
            .map(|&decision| {
                let (user, max_tokens, temperature) = match decision {
                    Decision::WakeHour => (WAKE_HOUR_USER, 20, 0.3),
                    Decision::DailyPlan => (DAILY_PLAN_USER, 300, 0.8),
                    Decision::HourlySchedule => (HOURLY_SCHEDULE_USER, 50, 0.7),
                    Decision::TaskDecomposition => (TASK_DECOMPOSITION_USER, 500, 0.5),
                    Decision::WindowRewrite => (WINDOW_REWRITE_USER, 600, 0.5),
                    Decision::ActionTarget => (ACTION_TARGET_USER, 50, 0.2),
                    Decision::Pronunciatio => (PRONUNCIATIO_USER, 20, 0.5),
                    Decision::EventTriple => (EVENT_TRIPLE_USER, 60, 0.2),
                    Decision::ObjectAction => (OBJECT_ACTION_USER, 80, 0.3),
                    Decision::Poignancy => (POIGNANCY_USER, 20, 0.2),
                    Decision::DecideToTalk => (DECIDE_TO_TALK_USER, 20, 0.5),
                    Decision::DecideToReact => (DECIDE_TO_REACT_USER, 20, 0.5),
                    Decision::Conversation => (CONVERSATION_USER, 800, 0.9),
                    Decision::AccidentResponse => (ACCIDENT_RESPONSE_USER, 80, 0.3),
                    Decision::ObjectStateUpdate => (OBJECT_STATE_USER, 40, 0.3),
                    Decision::IdentityRevision => (IDENTITY_REVISION_USER, 400, 0.7),
                    Decision::ReflectionFocus => (REFLECTION_FOCUS_USER, 200, 0.8),
                    Decision::ReflectionInsight => (REFLECTION_INSIGHT_USER, 500, 0.8),
                };
                (decision, PromptTemplate::builtin(user, max_tokens, temperature))
            })
            .collect();
        Self { templates }
    }

    /// The built-in set, overridden by any `{decision}.toml` found in `dir`.
    ///
    /// Unknown files are ignored. A file without `system` keeps the shared
    /// persona prompt.
    ///
    /// # Errors
    /// Returns an error if a matching file cannot be read or parsed.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref();
        let mut engine = Self::builtin();

        for decision in DECISIONS {
            let path = dir.join(format!("{decision}.toml"));
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            let parsed: TomlPromptFile =
                toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
            let d = parsed.prompt;
            engine.templates.insert(
                decision,
                PromptTemplate {
                    version: d.version,
                    max_tokens: d.max_tokens,
                    temperature: d.temperature,
                    system: d.system.unwrap_or_else(|| PERSONA_SYSTEM.to_string()),
                    user: d.user,
                },
            );
        }

        Ok(engine)
    }

    /// The template for `decision`.
    #[must_use]
    pub fn get(&self, decision: Decision) -> Option<&PromptTemplate> {
        self.templates.get(&decision)
    }

    /// Render `(system, user)` for `decision`.
    ///
    /// # Errors
    /// Returns an error if no template is loaded for `decision`.
    pub fn render(&self, decision: Decision, vars: &[(&str, &str)]) -> Result<(String, String), String> {
        let tpl = self
            .get(decision)
            .ok_or_else(|| format!("prompt template '{decision}' not loaded"))?;
        Ok((render_template(&tpl.system, vars), render_template(&tpl.user, vars)))
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_works() {
        let rendered = render_template(
            "Hello {name}, you are {activity}.",
            &[("name", "Klaus"), ("activity", "reading")],
        );
        assert_eq!(rendered, "Hello Klaus, you are reading.");
    }

    #[test]
    fn template_handles_missing_vars() {
        let rendered = render_template("Hello {name}, {unknown}.", &[("name", "Klaus")]);
        assert_eq!(rendered, "Hello Klaus, {unknown}.");
    }

    #[test]
    fn builtin_engine_covers_every_decision() {
        let engine = PromptEngine::builtin();
        assert_eq!(engine.len(), DECISIONS.len());
        for decision in DECISIONS {
            let tpl = engine.get(decision).expect("template");
            assert!(tpl.user.contains("Respond with JSON"), "{decision}");
            assert!(tpl.max_tokens > 0);
        }
    }

    #[test]
    fn directory_overrides_single_decision() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("poignancy.toml"),
            "[prompt]\nversion = \"2\"\nmax_tokens = 10\ntemperature = 0.1\nuser = \"Rate {description}\"\n",
        )
        .expect("write");
        std::fs::write(dir.path().join("unrelated.toml"), "not = [valid").expect("write");

        let engine = PromptEngine::from_directory(dir.path()).expect("load");
        let tpl = engine.get(Decision::Poignancy).expect("poignancy");
        assert_eq!(tpl.version, "2");
        assert_eq!(tpl.system, PERSONA_SYSTEM);
        assert_eq!(engine.get(Decision::WakeHour).expect("wake").version, "builtin");
    }

    #[test]
    fn directory_with_bad_toml_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("wake_hour.toml"), "[prompt\n").expect("write");
        assert!(PromptEngine::from_directory(dir.path()).is_err());
    }
}
