//! Configuration for the simulation engine.
//!
//! Maps directly to `reverie.toml`. Every field has a default so a partial
//! file (or an empty one) is always valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReverieConfig {
    /// Clock, storage and mover settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Per-agent cognitive defaults (copied into each agent's scratch).
    #[serde(default)]
    pub agent: AgentConfig,
    /// Retrieval scoring settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Oracle retry budget.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// LLM backend settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Scheduled accident injections.
    #[serde(default)]
    pub accidents: Vec<AccidentConfig>,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::ReverieError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Clock and storage settings for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Name of this run; keys saved snapshots.
    #[serde(default = "default_sim_code")]
    pub sim_code: String,
    /// World seconds advanced per tick.
    #[serde(default = "default_10_i64")]
    pub sec_per_step: i64,
    /// World clock at step 0, `"%B %d, %Y, %H:%M:%S"`.
    #[serde(default = "default_start_time")]
    pub start_time: String,
    /// Sleep between polls while waiting for the mover.
    #[serde(default = "default_100")]
    pub poll_interval_ms: u64,
    /// Give up waiting for the mover after this long. `None` waits forever.
    #[serde(default)]
    pub mover_timeout_ms: Option<u64>,
    /// Directory for environment / movement exchange files.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Seed for focus selection and random tile picks.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_code: default_sim_code(),
            sec_per_step: 10,
            start_time: default_start_time(),
            poll_interval_ms: 100,
            mover_timeout_ms: None,
            storage_dir: default_storage_dir(),
            seed: None,
        }
    }
}

/// Cognitive defaults for an agent. Individual agents may override these
/// in their scratch snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Perception radius in tiles.
    #[serde(default = "default_4")]
    pub vision_r: usize,
    /// How many percepts are attended per tick.
    #[serde(default = "default_3")]
    pub att_bandwidth: usize,
    /// How many recent events suppress a duplicate percept.
    #[serde(default = "default_5")]
    pub retention: usize,
    /// Retrieval weight for recency.
    #[serde(default = "default_1_0")]
    pub recency_w: f64,
    /// Retrieval weight for relevance.
    #[serde(default = "default_1_0")]
    pub relevance_w: f64,
    /// Retrieval weight for importance.
    #[serde(default = "default_1_0")]
    pub importance_w: f64,
    /// Per-rank recency decay.
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,
    /// Poignancy budget that triggers a reflection when spent.
    #[serde(default = "default_150")]
    pub importance_trigger_max: i64,
    /// Thoughts generated per reflection.
    #[serde(default = "default_5")]
    pub thought_count: usize,
    /// Days before unused concepts are forgotten.
    #[serde(default = "default_100_usize")]
    pub concept_forget: usize,
    /// Minute of day of the daily reflection.
    #[serde(default = "default_180")]
    pub daily_reflection_time: u32,
    /// Statements considered by the daily reflection.
    #[serde(default = "default_5")]
    pub daily_reflection_size: usize,
    /// Overlap threshold for reflection.
    #[serde(default = "default_2")]
    pub overlap_reflect_th: usize,
    /// Keyword strength threshold for event reflection.
    #[serde(default = "default_4")]
    pub kw_strg_event_reflect_th: usize,
    /// Keyword strength threshold for thought reflection.
    #[serde(default = "default_4")]
    pub kw_strg_thought_reflect_th: usize,
    /// Ticks before an agent may chat with the same partner again.
    #[serde(default = "default_800")]
    pub chat_buffer: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            vision_r: 4,
            att_bandwidth: 3,
            retention: 5,
            recency_w: 1.0,
            relevance_w: 1.0,
            importance_w: 1.0,
            recency_decay: 0.99,
            importance_trigger_max: 150,
            thought_count: 5,
            concept_forget: 100,
            daily_reflection_time: 180,
            daily_reflection_size: 5,
            overlap_reflect_th: 2,
            kw_strg_event_reflect_th: 4,
            kw_strg_thought_reflect_th: 4,
            chat_buffer: 800,
        }
    }
}

/// Retrieval scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Nodes returned per focal point.
    #[serde(default = "default_30")]
    pub top_n: usize,
    /// Fixed multiplier on the recency term.
    #[serde(default = "default_0_5")]
    pub recency_factor: f64,
    /// Fixed multiplier on the relevance term.
    #[serde(default = "default_2_0")]
    pub relevance_factor: f64,
    /// Fixed multiplier on the importance term.
    #[serde(default = "default_3_0")]
    pub importance_factor: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: 30,
            recency_factor: 0.5,
            relevance_factor: 2.0,
            importance_factor: 3.0,
        }
    }
}

/// How hard to retry the cognition oracle before taking the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_2_u32")]
    pub max_retries: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

/// LLM integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for memory embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Sampling temperature.
    #[serde(default = "default_0_7")]
    pub temperature: f32,
    /// Maximum tokens to generate per call.
    #[serde(default = "default_800_u32")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_ollama(),
            base_url: default_ollama_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            request_timeout_ms: 30_000,
            temperature: 0.7,
            max_tokens: 800,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite file for agent snapshots, tile events and movements.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Number of save backups to keep.
    #[serde(default = "default_3_u32")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            wal_mode: true,
            checksum_enabled: true,
            backup_count: 3,
        }
    }
}

/// One scheduled accident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccidentConfig {
    /// Full `world:sector:arena:object` address of the burning object.
    pub object_address: String,
    /// Seconds after the simulation start at which it ignites.
    pub at_seconds: i64,
    /// Description placed on the fire event.
    #[serde(default = "default_fire_description")]
    pub description: String,
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_sim_code() -> String { "base_the_ville".to_string() }
fn default_start_time() -> String { "February 13, 2023, 00:00:00".to_string() }
fn default_storage_dir() -> String { "storage".to_string() }
fn default_db_path() -> String { "reverie.db".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_embedding_model() -> String { "nomic-embed-text".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_fire_description() -> String { "on fire".to_string() }
fn default_0_5() -> f64 { 0.5 }
fn default_0_7() -> f32 { 0.7 }
fn default_1_0() -> f64 { 1.0 }
fn default_2_0() -> f64 { 2.0 }
fn default_3_0() -> f64 { 3.0 }
fn default_recency_decay() -> f64 { 0.99 }
fn default_2() -> usize { 2 }
fn default_2_u32() -> u32 { 2 }
fn default_3() -> usize { 3 }
fn default_3_u32() -> u32 { 3 }
fn default_4() -> usize { 4 }
fn default_5() -> usize { 5 }
fn default_10_i64() -> i64 { 10 }
fn default_30() -> usize { 30 }
fn default_100() -> u64 { 100 }
fn default_100_usize() -> usize { 100 }
fn default_150() -> i64 { 150 }
fn default_180() -> u32 { 180 }
fn default_800_u32() -> u32 { 800 }
fn default_800() -> i64 { 800 }
fn default_30000() -> u64 { 30_000 }
