//! SQLite persistence for a running simulation.
//!
//! One database per simulation holds four tables:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS sim_meta    (id INTEGER PRIMARY KEY CHECK (id = 1), data BLOB NOT NULL, updated_at TEXT NOT NULL, checksum TEXT);
//! CREATE TABLE IF NOT EXISTS agents      (name TEXT PRIMARY KEY, data BLOB NOT NULL, updated_at TEXT NOT NULL, checksum TEXT);
//! CREATE TABLE IF NOT EXISTS tile_events (step INTEGER PRIMARY KEY, data BLOB NOT NULL, updated_at TEXT NOT NULL, checksum TEXT);
//! CREATE TABLE IF NOT EXISTS movements   (step INTEGER PRIMARY KEY, data BLOB NOT NULL, updated_at TEXT NOT NULL, checksum TEXT);
//! ```
//!
//! Every payload is JSON in a BLOB column, so the schema does not change
//! when the snapshot types do. WAL mode lets a renderer read movements while
//! the tick loop writes them. An optional CRC-32 per row flags corruption.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, ToSql, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentSnapshot};
use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::types::{SimTime, serde_time};
use crate::world::TileEvents;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sim_meta (
        id         INTEGER PRIMARY KEY CHECK (id = 1),
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );
    CREATE TABLE IF NOT EXISTS agents (
        name       TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );
    CREATE TABLE IF NOT EXISTS tile_events (
        step       INTEGER PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );
    CREATE TABLE IF NOT EXISTS movements (
        step       INTEGER PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );";

// ---------------------------------------------------------------------------
// Simulation meta
// ---------------------------------------------------------------------------

/// Simulation-level state saved next to the agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMeta {
    /// Simulation this one was forked from, if any.
    #[serde(default)]
    pub fork_sim_code: Option<String>,
    /// World time at step 0.
    #[serde(with = "serde_time::scratch")]
    pub start_date: SimTime,
    /// World time of the next step.
    #[serde(with = "serde_time::scratch")]
    pub curr_time: SimTime,
    /// World seconds per step.
    pub sec_per_step: u32,
    /// Name of the world map.
    pub maze_name: String,
    /// Agents in the simulation, in processing order.
    pub persona_names: Vec<String>,
    /// Steps taken so far.
    pub step: u64,
}

impl SimMeta {
    /// Write as `meta.json`-style JSON.
    ///
    /// # Errors
    /// Returns an I/O or serialization error.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read JSON written by [`SimMeta::save_json`].
    ///
    /// # Errors
    /// Returns an I/O or serialization error.
    pub fn load_json(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

fn step_key(step: u64) -> i64 {
    i64::try_from(step).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Handle to an open simulation database.
///
/// ```no_run
/// # use reverie_core::persistence::PersistenceEngine;
/// # use reverie_core::config::{AgentConfig, PersistenceConfig};
/// # use reverie_core::agent::{Agent, AgentState};
/// let store = PersistenceEngine::open("base_the_ville.db", &PersistenceConfig::default())?;
/// let agent = Agent::new(AgentState::new("Isabella Rodriguez", &AgentConfig::default()));
/// store.save_agent(&agent)?;
/// let loaded = store.load_agent("Isabella Rodriguez")?;
/// # Ok::<(), reverie_core::error::ReverieError>(())
/// ```
pub struct PersistenceEngine {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// # Errors
    /// Returns `ReverieError::Database` on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Simulation store opened"
        );
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// An in-memory database.
    ///
    /// # Errors
    /// Returns `ReverieError::Database` on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------

    fn write_row<T: Serialize + ?Sized>(&self, table: &str, key_col: &str, key: &dyn ToSql, value: &T) -> Result<usize> {
        let json = serde_json::to_vec(value)?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            &format!(
                "INSERT INTO {table} ({key_col}, data, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT({key_col}) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at,
                    checksum = excluded.checksum"
            ),
            params![key, json, now, checksum],
        )?;
        Ok(json.len())
    }

    fn read_row<T: DeserializeOwned>(&self, table: &str, key_col: &str, key: &dyn ToSql) -> Result<Option<T>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT data, checksum FROM {table} WHERE {key_col} = ?1"))?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        let Some((data, stored)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled
            && let Some(expected) = stored
        {
            let actual = crc32_hex(&data);
            if expected != actual {
                warn!(table, expected = %expected, actual = %actual, "Checksum mismatch, save may be corrupt");
            }
        }
        Ok(Some(serde_json::from_slice(&data)?))
    }

    // ------------------------------------------------------------------
    // Meta
    // ------------------------------------------------------------------

    /// Save (upsert) the simulation meta.
    ///
    /// # Errors
    /// Returns a serialization or database error.
    pub fn save_meta(&self, meta: &SimMeta) -> Result<()> {
        self.write_row("sim_meta", "id", &1_i64, meta)?;
        debug!(step = meta.step, curr_time = %meta.curr_time, "Saved simulation meta");
        Ok(())
    }

    /// Load the simulation meta, if saved.
    ///
    /// # Errors
    /// Returns a serialization or database error.
    pub fn load_meta(&self) -> Result<Option<SimMeta>> {
        self.read_row("sim_meta", "id", &1_i64)
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Save (upsert) one agent.
    ///
    /// # Errors
    /// Returns a serialization or database error.
    pub fn save_agent(&self, agent: &Agent) -> Result<()> {
        let start = Instant::now();
        let bytes = self.write_row("agents", "name", &agent.name(), &agent.snapshot())?;
        debug!(
            agent = %agent.name(),
            nodes = agent.memory.len(),
            bytes,
            elapsed_us = start.elapsed().as_micros(),
            "Saved agent"
        );
        Ok(())
    }

    /// Save every agent in one transaction.
    ///
    /// # Errors
    /// Returns a serialization or database error; nothing is written then.
    pub fn save_agents(&self, agents: &[Agent]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for agent in agents {
            self.save_agent(agent)?;
        }
        tx.commit()?;
        info!(agents = agents.len(), "Saved all agents");
        Ok(())
    }

    /// Load one agent by name.
    ///
    /// # Errors
    /// Returns a serialization or database error, or
    /// `ReverieError::NodeNotFound` for a malformed memory snapshot.
    pub fn load_agent(&self, name: &str) -> Result<Option<Agent>> {
        let start = Instant::now();
        let Some(snapshot) = self.read_row::<AgentSnapshot>("agents", "name", &name)? else {
            return Ok(None);
        };
        let agent = Agent::from_snapshot(snapshot)?;
        debug!(
            agent = %name,
            nodes = agent.memory.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded agent"
        );
        Ok(Some(agent))
    }

    /// Names of all saved agents, sorted.
    ///
    /// # Errors
    /// Returns a database error.
    pub fn list_agents(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT name FROM agents ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Delete one agent. Returns `true` if a row was removed.
    ///
    /// # Errors
    /// Returns a database error.
    pub fn delete_agent(&self, name: &str) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM agents WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    // ------------------------------------------------------------------
    // Per-step records
    // ------------------------------------------------------------------

    /// Save the tile-event snapshot taken at `step`.
    ///
    /// # Errors
    /// Returns a serialization or database error.
    pub fn save_tile_events(&self, step: u64, tiles: &[TileEvents]) -> Result<()> {
        let bytes = self.write_row("tile_events", "step", &step_key(step), tiles)?;
        debug!(step, tiles = tiles.len(), bytes, "Saved tile events");
        Ok(())
    }

    /// Load the tile-event snapshot of `step`.
    ///
    /// # Errors
    /// Returns a serialization or database error.
    pub fn load_tile_events(&self, step: u64) -> Result<Option<Vec<TileEvents>>> {
        self.read_row("tile_events", "step", &step_key(step))
    }

    /// Save the movement record emitted at `step`.
    ///
    /// # Errors
    /// Returns a serialization or database error.
    pub fn save_movement<T: Serialize>(&self, step: u64, record: &T) -> Result<()> {
        self.write_row("movements", "step", &step_key(step), record)?;
        Ok(())
    }

    /// Load the movement record of `step`.
    ///
    /// # Errors
    /// Returns a serialization or database error.
    pub fn load_movement<T: DeserializeOwned>(&self, step: u64) -> Result<Option<T>> {
        self.read_row("movements", "step", &step_key(step))
    }

    /// Highest step with a movement record.
    ///
    /// # Errors
    /// Returns a database error.
    pub fn latest_movement_step(&self) -> Result<Option<u64>> {
        let step: Option<i64> = self
            .conn
            .query_row("SELECT MAX(step) FROM movements", [], |row| row.get(0))?;
        Ok(step.and_then(|s| u64::try_from(s).ok()))
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    /// Returns a database or I/O error.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Database backup completed"
        );
        Ok(())
    }

    /// Back up to `{db}.bak.1`, shifting older backups up and keeping at
    /// most `backup_count`. In-memory databases are skipped.
    ///
    /// # Errors
    /// Returns a database or I/O error.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }

        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))?;
        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Path of the database file, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Whether `PRAGMA integrity_check` passes.
    ///
    /// # Errors
    /// Returns a database error if the check itself fails to run.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
