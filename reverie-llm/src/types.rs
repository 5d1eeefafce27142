//! Core types for LLM requests and responses.
//!
//! Every prompt asks for a single JSON object. The `*Reply` structs below
//! are the shapes the model is told to produce, one per decision kind.

use serde::{Deserialize, Serialize};

/// A request to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (persona, rules, constraints).
    pub system: String,
    /// User prompt (context, memories, instructions).
    pub user: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Ask the backend for JSON-only output.
    pub json_mode: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// A JSON-mode request with default sampling.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 400,
            temperature: 0.7,
            json_mode: true,
            timeout_ms: 30_000,
        }
    }

    /// Set the token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// Generated text.
    pub text: String,
    /// Tokens generated.
    pub tokens_generated: u32,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// Model that produced it.
    pub model: String,
}

// ---------------------------------------------------------------------------
// Structured replies
// ---------------------------------------------------------------------------

/// `{"wake_hour": 7}`
#[derive(Debug, Clone, Deserialize)]
pub struct WakeHourReply {
    /// Hour of the day, 0..=23.
    pub wake_hour: u32,
}

/// `{"items": ["...", "..."]}`
#[derive(Debug, Clone, Deserialize)]
pub struct ListReply {
    /// Ordered entries.
    pub items: Vec<String>,
}

/// `{"activity": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityReply {
    /// Activity phrase.
    pub activity: String,
}

/// One row of a schedule reply.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotReply {
    /// Activity phrase.
    pub activity: String,
    /// Minutes.
    pub minutes: u32,
}

/// `{"slots": [{"activity": "...", "minutes": 15}]}`
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleReply {
    /// Ordered slots.
    pub slots: Vec<SlotReply>,
}

/// `{"choice": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceReply {
    /// The selected option.
    pub choice: String,
}

/// `{"emoji": "☕"}`
#[derive(Debug, Clone, Deserialize)]
pub struct EmojiReply {
    /// One to three emoji.
    pub emoji: String,
}

/// `{"predicate": "is", "object": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct TripleReply {
    /// Verb phrase.
    pub predicate: String,
    /// Object of the verb.
    pub object: String,
}

/// `{"description": "...", "predicate": "is", "state": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectActionReply {
    /// What the object is doing.
    pub description: String,
    /// Verb phrase.
    pub predicate: String,
    /// Resulting object state.
    pub state: String,
}

/// `{"score": 4}`
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreReply {
    /// Salience, 1..=10.
    pub score: u32,
}

/// `{"answer": true}`
#[derive(Debug, Clone, Deserialize)]
pub struct YesNoReply {
    /// The decision.
    pub answer: bool,
}

/// One spoken line.
#[derive(Debug, Clone, Deserialize)]
pub struct UtteranceReply {
    /// Who speaks.
    pub speaker: String,
    /// What is said.
    pub line: String,
}

/// `{"utterances": [...], "summary": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationReply {
    /// The exchange in order.
    pub utterances: Vec<UtteranceReply>,
    /// One-line summary.
    pub summary: String,
}

/// `{"activity": "...", "minutes": 10}`
#[derive(Debug, Clone, Deserialize)]
pub struct AccidentReply {
    /// Corrective activity.
    pub activity: String,
    /// Minutes.
    pub minutes: u32,
}

/// `{"state": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct StateReply {
    /// New object state.
    pub state: String,
}

/// `{"currently": "...", "daily_plan_req": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityReply {
    /// Status paragraph.
    pub currently: String,
    /// What today's plan must include.
    pub daily_plan_req: String,
}

/// One reflected insight.
#[derive(Debug, Clone, Deserialize)]
pub struct InsightReply {
    /// The thought.
    pub insight: String,
    /// Numbers of the statements it rests on.
    #[serde(default)]
    pub evidence: Vec<usize>,
}

/// `{"insights": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct InsightsReply {
    /// Ordered insights.
    pub insights: Vec<InsightReply>,
}
