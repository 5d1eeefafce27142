//! Prompt golden set.
//!
//! Curated template/variable pairs checking that every decision prompt
//! renders into a well-formed, fully substituted request.
//!
//! ## Usage
//!
//! - **Offline:** `cargo test -p reverie-llm --test eval_golden` checks
//!   rendering only.
//! - **Online (requires Ollama):** set `REVERIE_EVAL_LLM=1` to send a few
//!   decisions to the configured model and check the parsed answers.

use reverie_core::config::AgentConfig;
use reverie_core::oracle::{CognitionOracle, Decision, PoignancyKind};
use reverie_core::{AgentState, ReverieConfig};
use reverie_llm::prompt::{self, PromptEngine};
use reverie_llm::LlmOracle;

/// A golden test case for prompt evaluation.
struct GoldenCase {
    /// Human-readable name for the test case.
    name: &'static str,
    /// Which prompt template constant to use.
    template: &'static str,
    /// Template variables to fill in.
    vars: Vec<(&'static str, &'static str)>,
    /// Strings that MUST appear in the rendered prompt.
    prompt_must_contain: Vec<&'static str>,
    /// Strings that MUST NOT appear in the rendered prompt.
    prompt_must_not_contain: Vec<&'static str>,
}

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        // ---------------------------------------------------------------
        // 1. Persona framing
        // ---------------------------------------------------------------
        GoldenCase {
            name: "persona_system",
            template: prompt::PERSONA_SYSTEM,
            vars: vec![
                ("name", "Isabella Rodriguez"),
                ("identity", "Name: Isabella Rodriguez\nAge: 34\nInnate traits: friendly, outgoing, hospitable\n"),
            ],
            prompt_must_contain: vec!["You are Isabella Rodriguez", "hospitable", "JSON"],
            prompt_must_not_contain: vec!["{name}", "{identity}"],
        },
        // ---------------------------------------------------------------
        // 2. Morning planning
        // ---------------------------------------------------------------
        GoldenCase {
            name: "wake_hour",
            template: prompt::WAKE_HOUR_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("lifestyle", "goes to bed around 11pm, wakes up around 7am"),
            ],
            prompt_must_contain: vec!["Klaus Mueller", "wakes up around 7am", "wake_hour"],
            prompt_must_not_contain: vec!["{lifestyle}"],
        },
        GoldenCase {
            name: "daily_plan",
            template: prompt::DAILY_PLAN_USER,
            vars: vec![("name", "Klaus Mueller"), ("wake_hour", "7")],
            prompt_must_contain: vec!["wakes up at 7:00", "items"],
            prompt_must_not_contain: vec!["{wake_hour}", "{name}"],
        },
        GoldenCase {
            name: "hourly_schedule",
            template: prompt::HOURLY_SCHEDULE_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("hour", "9"),
                ("so_far", "1. sleeping\n2. sleeping\n"),
            ],
            prompt_must_contain: vec!["from 9:00 to 9:59", "2. sleeping"],
            prompt_must_not_contain: vec!["{hour}", "{so_far}"],
        },
        GoldenCase {
            name: "task_decomposition",
            template: prompt::TASK_DECOMPOSITION_USER,
            vars: vec![
                ("name", "Maria Lopez"),
                ("task", "working on her physics homework"),
                ("minutes", "120"),
                ("schedule", "08:00 ~ 10:00 -- working on her physics homework\n"),
            ],
            prompt_must_contain: vec!["physics homework", "(120 minutes)", "add up to 120"],
            prompt_must_not_contain: vec!["{task}", "{minutes}", "{schedule}"],
        },
        // ---------------------------------------------------------------
        // 3. Acting in the world
        // ---------------------------------------------------------------
        GoldenCase {
            name: "action_target",
            template: prompt::ACTION_TARGET_USER,
            vars: vec![
                ("name", "Isabella Rodriguez"),
                ("activity", "brewing coffee"),
                ("level", "object"),
                ("parent", "the Ville:Hobbs Cafe:cafe"),
                ("options", "- coffee machine\n- counter\n"),
            ],
            prompt_must_contain: vec!["brewing coffee", "Hobbs Cafe", "- coffee machine", "choice"],
            prompt_must_not_contain: vec!["{options}", "{level}"],
        },
        GoldenCase {
            name: "object_action",
            template: prompt::OBJECT_ACTION_USER,
            vars: vec![
                ("name", "Isabella Rodriguez"),
                ("object", "coffee machine"),
                ("activity", "brewing coffee"),
            ],
            prompt_must_contain: vec!["using the coffee machine", "state"],
            prompt_must_not_contain: vec!["{object}"],
        },
        GoldenCase {
            name: "poignancy",
            template: prompt::POIGNANCY_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("kind", "event"),
                ("description", "stove is on fire"),
            ],
            prompt_must_contain: vec!["this event is for Klaus Mueller", "stove is on fire", "score"],
            prompt_must_not_contain: vec!["{kind}", "{description}"],
        },
        // ---------------------------------------------------------------
        // 4. Meeting people
        // ---------------------------------------------------------------
        GoldenCase {
            name: "decide_to_talk",
            template: prompt::DECIDE_TO_TALK_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("target", "Maria Lopez"),
                ("target_activity", "reading at the library"),
                ("focus", "Maria Lopez is reading at the library"),
                ("memories", "- Maria Lopez is a physics student\n"),
            ],
            prompt_must_contain: vec!["Maria Lopez is currently reading", "physics student", "answer"],
            prompt_must_not_contain: vec!["{target}", "{memories}"],
        },
        GoldenCase {
            name: "decide_to_react",
            template: prompt::DECIDE_TO_REACT_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("activity", "using the bathroom"),
                ("target", "Maria Lopez"),
                ("target_activity", "taking a shower"),
                ("focus", "Maria Lopez is taking a shower"),
                ("memories", "(nothing)\n"),
            ],
            prompt_must_contain: vec!["\"wait\"", "\"do_other\"", "\"keep\"", "taking a shower"],
            prompt_must_not_contain: vec!["{activity}", "{target_activity}"],
        },
        GoldenCase {
            name: "conversation",
            template: prompt::CONVERSATION_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("target", "Maria Lopez"),
                ("target_identity", "Name: Maria Lopez\nAge: 21\n"),
                ("focus", "Maria Lopez is studying"),
                ("memories", "- Maria Lopez likes streaming games\n"),
                ("location", "the Ville:Hobbs Cafe:cafe"),
            ],
            prompt_must_contain: vec!["meet at the Ville:Hobbs Cafe:cafe", "Age: 21", "utterances", "summary"],
            prompt_must_not_contain: vec!["{target_identity}", "{location}"],
        },
        // ---------------------------------------------------------------
        // 5. Accidents
        // ---------------------------------------------------------------
        GoldenCase {
            name: "accident_response",
            template: prompt::ACCIDENT_RESPONSE_USER,
            vars: vec![
                ("name", "Isabella Rodriguez"),
                ("hazard", "stove is on fire"),
                ("address", "the Ville:Hobbs Cafe:cafe:cafe customer seating"),
            ],
            prompt_must_contain: vec!["emergency: stove is on fire", "(5-15)", "minutes"],
            prompt_must_not_contain: vec!["{hazard}", "{address}"],
        },
        GoldenCase {
            name: "object_state",
            template: prompt::OBJECT_STATE_USER,
            vars: vec![
                ("name", "Isabella Rodriguez"),
                ("object", "stove"),
                ("current_state", "on fire"),
                ("activity", "putting out the fire"),
            ],
            prompt_must_contain: vec!["The stove was on fire", "extinguished"],
            prompt_must_not_contain: vec!["{current_state}"],
        },
        // ---------------------------------------------------------------
        // 6. Reflection
        // ---------------------------------------------------------------
        GoldenCase {
            name: "identity_revision",
            template: prompt::IDENTITY_REVISION_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("currently", "writing a research paper on gentrification"),
                ("memories", "- Klaus Mueller talked to Maria Lopez about her research\n"),
            ],
            prompt_must_contain: vec!["gentrification", "daily_plan_req"],
            prompt_must_not_contain: vec!["{currently}"],
        },
        GoldenCase {
            name: "reflection_focus",
            template: prompt::REFLECTION_FOCUS_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("statements", "- Klaus Mueller is reading\n- Klaus Mueller is writing\n"),
                ("count", "3"),
            ],
            prompt_must_contain: vec!["the 3 most salient", "Klaus Mueller is writing"],
            prompt_must_not_contain: vec!["{statements}", "{count}"],
        },
        GoldenCase {
            name: "reflection_insight",
            template: prompt::REFLECTION_INSIGHT_USER,
            vars: vec![
                ("name", "Klaus Mueller"),
                ("statements", "1. Klaus Mueller is reading\n2. Klaus Mueller is writing\n"),
                ("count", "5"),
            ],
            prompt_must_contain: vec!["1. Klaus Mueller is reading", "What 5 high-level insights", "evidence"],
            prompt_must_not_contain: vec!["{statements}"],
        },
    ]
}

// ---------------------------------------------------------------------------
// Offline Tests: Template Rendering Validation
// ---------------------------------------------------------------------------

#[test]
fn golden_prompts_render_without_unresolved_vars() {
    for case in &golden_cases() {
        let rendered = prompt::render_template(case.template, &case.vars);

        for needle in &case.prompt_must_contain {
            assert!(
                rendered.contains(needle),
                "Golden case '{}': rendered prompt must contain '{}' but doesn't.\nRendered:\n{}",
                case.name,
                needle,
                &rendered[..rendered.len().min(500)]
            );
        }

        for needle in &case.prompt_must_not_contain {
            assert!(
                !rendered.contains(needle),
                "Golden case '{}': rendered prompt must NOT contain '{}' but does.\nRendered:\n{}",
                case.name,
                needle,
                &rendered[..rendered.len().min(500)]
            );
        }
    }
}

#[test]
fn golden_set_has_minimum_coverage() {
    let cases = golden_cases();
    assert!(
        cases.len() >= 10,
        "Golden set must have at least 10 test cases, got {}",
        cases.len()
    );
}

#[test]
fn engine_render_fills_persona_and_decision_vars() {
    let engine = PromptEngine::builtin();
    let (system, user) = engine
        .render(
            Decision::Pronunciatio,
            &[("name", "Klaus Mueller"), ("identity", "Age: 20\n"), ("activity", "sleeping")],
        )
        .expect("render");
    assert!(system.starts_with("You are Klaus Mueller"));
    assert!(system.contains("Age: 20"));
    assert!(user.contains("emoji: sleeping"));
    assert!(!system.contains("{name}"));
}

#[test]
fn every_user_prompt_names_its_json_shape() {
    let engine = PromptEngine::builtin();
    for decision in prompt::DECISIONS {
        let tpl = engine.get(decision).expect("template");
        let tail = tpl.user.rsplit("Respond with JSON:").next().unwrap_or_default();
        assert!(tail.trim_start().starts_with('{'), "{decision}: {tail}");
    }
}

// ---------------------------------------------------------------------------
// Online Tests: opt-in, require a running model
// ---------------------------------------------------------------------------

#[test]
fn online_poignancy_is_in_range() {
    if std::env::var("REVERIE_EVAL_LLM").as_deref() != Ok("1") {
        return;
    }
    let oracle = LlmOracle::from_config(&ReverieConfig::default()).expect("oracle");
    let agent = AgentState::new("Klaus Mueller", &AgentConfig::default());

    let mundane = oracle
        .poignancy(&agent, PoignancyKind::Event, "Klaus Mueller is brushing his teeth")
        .expect("mundane");
    let dramatic = oracle
        .poignancy(&agent, PoignancyKind::Event, "the apartment kitchen is on fire")
        .expect("dramatic");
    assert!((1..=10).contains(&mundane));
    assert!(dramatic >= mundane);

    let hour = oracle.wake_up_hour(&agent).expect("wake hour");
    assert!(hour < 24);
}
