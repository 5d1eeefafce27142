//! The tick loop.
//!
//! ```text
//! wait for mover ─▶ inject accidents ─▶ for each agent:
//!                                         move, place events, step
//!                ─▶ idle stale object events ─▶ snapshot ─▶ advance clock
//!                ─▶ publish movement record
//! ```
//!
//! Ticks never overlap and agents are processed one at a time, so every
//! world mutation happens on this task.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use reverie_core::types::{SCRATCH_TIME_FORMAT, format_scratch_time};
use reverie_core::world::TileEvents;
use reverie_core::{
    Agent, CognitionEngine, Coord, Event, PersistenceEngine, ReverieConfig, ReverieError, SimMeta, SimTime, WorldMap,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::accidents::AccidentSchedule;
use crate::error::{Result, SimError};
use crate::movement::{AgentMovement, MovementRecord};
use crate::mover::Mover;

/// A running simulation: the world, its agents and the clock.
pub struct Simulation {
    config: ReverieConfig,
    world: WorldMap,
    agents: Vec<Agent>,
    engine: CognitionEngine,
    accidents: AccidentSchedule,
    start_time: SimTime,
    curr_time: SimTime,
    sec_per_step: i64,
    step: u64,
    fork_sim_code: Option<String>,
    /// Object-action events placed this tick, idled next tick unless renewed.
    placed: Vec<(Event, Coord)>,
    store: Option<PersistenceEngine>,
    abort: Option<watch::Receiver<bool>>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("world", &self.world.name())
            .field("agents", &self.agents.len())
            .field("step", &self.step)
            .field("curr_time", &self.curr_time)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// A fresh run starting at `config.simulation.start_time`.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` for an unparsable start time, a
    /// non-positive step length or duplicate agent names.
    pub fn new(config: ReverieConfig, world: WorldMap, agents: Vec<Agent>, engine: CognitionEngine) -> Result<Self> {
        let start_time = NaiveDateTime::parse_from_str(&config.simulation.start_time, SCRATCH_TIME_FORMAT)
            .map_err(|e| config_error(format!("start_time '{}': {e}", config.simulation.start_time)))?;
        let sec_per_step = config.simulation.sec_per_step;
        if sec_per_step <= 0 {
            return Err(config_error(format!("sec_per_step must be positive, got {sec_per_step}")));
        }
        let mut names: Vec<&str> = agents.iter().map(Agent::name).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(config_error(format!("duplicate agent '{}'", pair[0])));
        }

        info!(
            world = %world.name(),
            agents = agents.len(),
            start = %format_scratch_time(start_time),
            sec_per_step,
            "Simulation created"
        );
        Ok(Self {
            accidents: AccidentSchedule::new(config.accidents.clone()),
            config,
            world,
            agents,
            engine,
            start_time,
            curr_time: start_time,
            sec_per_step,
            step: 0,
            fork_sim_code: None,
            placed: Vec::new(),
            store: None,
            abort: None,
        })
    }

    /// Continue a saved run described by `meta`.
    ///
    /// Agents are reordered to `meta.persona_names`; accidents that were
    /// due before `meta.curr_time` are not injected again.
    ///
    /// # Errors
    /// Returns `ReverieError::UnknownAgent` if a listed agent is missing,
    /// or any error of [`Simulation::new`].
    pub fn resume(
        mut config: ReverieConfig,
        world: WorldMap,
        mut agents: Vec<Agent>,
        engine: CognitionEngine,
        meta: SimMeta,
    ) -> Result<Self> {
        config.simulation.start_time = format_scratch_time(meta.start_date);
        config.simulation.sec_per_step = i64::from(meta.sec_per_step);

        let mut ordered = Vec::with_capacity(meta.persona_names.len());
        for name in &meta.persona_names {
            let pos = agents
                .iter()
                .position(|a| a.name() == name)
                .ok_or_else(|| ReverieError::UnknownAgent(name.clone()))?;
            ordered.push(agents.swap_remove(pos));
        }

        let mut sim = Self::new(config, world, ordered, engine)?;
        sim.curr_time = meta.curr_time;
        sim.step = meta.step;
        sim.fork_sim_code = meta.fork_sim_code;
        let skipped = sim
            .accidents
            .skip_due(sim.start_time, meta.curr_time - Duration::seconds(1));
        info!(step = sim.step, skipped_accidents = skipped, "Simulation resumed");
        Ok(sim)
    }

    /// Persist tile snapshots, movement records and saves to `store`.
    #[must_use]
    pub fn with_store(mut self, store: PersistenceEngine) -> Self {
        self.store = Some(store);
        self
    }

    /// Stop waiting for the mover once `abort` turns `true`.
    #[must_use]
    pub fn with_abort(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Mark this run as a fork of `sim_code`.
    #[must_use]
    pub fn forked_from(mut self, sim_code: impl Into<String>) -> Self {
        self.fork_sim_code = Some(sim_code.into());
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The shared world.
    #[must_use]
    pub fn world(&self) -> &WorldMap {
        &self.world
    }

    /// Mutable world, for setup and tests.
    pub fn world_mut(&mut self) -> &mut WorldMap {
        &mut self.world
    }

    /// All agents in processing order.
    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// The agent called `name`.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    /// The cognition engine.
    #[must_use]
    pub fn engine(&self) -> &CognitionEngine {
        &self.engine
    }

    /// World time of the next tick.
    #[must_use]
    pub fn curr_time(&self) -> SimTime {
        self.curr_time
    }

    /// Ticks completed.
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Accidents still to be injected.
    #[must_use]
    pub fn accidents(&self) -> &AccidentSchedule {
        &self.accidents
    }

    /// Save metadata for the current state.
    #[must_use]
    pub fn meta(&self) -> SimMeta {
        SimMeta {
            fork_sim_code: self.fork_sim_code.clone(),
            start_date: self.start_time,
            curr_time: self.curr_time,
            sec_per_step: u32::try_from(self.sec_per_step).unwrap_or(u32::MAX),
            maze_name: self.world.name().to_string(),
            persona_names: self.agents.iter().map(|a| a.name().to_string()).collect(),
            step: self.step,
        }
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    /// Run `steps` ticks, waiting on `mover` before each.
    ///
    /// Returns the number of ticks completed.
    ///
    /// # Errors
    /// Returns [`SimError::Aborted`] or [`SimError::MoverTimeout`] while
    /// waiting, or any error of [`Simulation::tick`] or the mover.
    pub async fn run(&mut self, mover: &mut dyn Mover, steps: u64) -> Result<u64> {
        for done in 1..=steps {
            let step = self.step;
            let moves = self.wait_for_moves(mover, step).await?;
            let record = self.tick(&moves)?;
            mover.publish(step, &record)?;
            info!(
                step,
                current_step = done,
                total_steps = steps,
                percent = done * 100 / steps,
                curr_time = %format_scratch_time(record.meta.curr_time),
                "Step complete"
            );
        }
        Ok(steps)
    }

    /// Poll `mover` until it has positions for `step`.
    async fn wait_for_moves(&mut self, mover: &mut dyn Mover, step: u64) -> Result<BTreeMap<String, Coord>> {
        let poll = std::time::Duration::from_millis(self.config.simulation.poll_interval_ms.max(1));
        let timeout = self.config.simulation.mover_timeout_ms.map(std::time::Duration::from_millis);
        let started = tokio::time::Instant::now();

        loop {
            if self.aborted() {
                return Err(SimError::Aborted { step });
            }
            if let Some(moves) = mover.poll(step)? {
                return Ok(moves);
            }
            if let Some(limit) = timeout
                && started.elapsed() >= limit
            {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                return Err(SimError::MoverTimeout { step, waited_ms });
            }

            let closed = match self.abort.as_mut() {
                Some(rx) => tokio::select! {
                    () = tokio::time::sleep(poll) => false,
                    changed = rx.changed() => changed.is_err(),
                },
                None => {
                    tokio::time::sleep(poll).await;
                    false
                }
            };
            if closed {
                debug!("Abort channel closed; waiting without it");
                self.abort = None;
            }
        }
    }

    fn aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Advance the world by one tick with agents standing on `moves`.
    ///
    /// An agent missing from `moves` stays on its current tile. Every
    /// position is checked before anything changes, so a failed tick leaves
    /// the world and the agents as they were.
    ///
    /// # Errors
    /// Returns [`SimError::MissingPosition`] for an agent with no tile at
    /// all, or [`SimError::Mover`] for a tile off the grid.
    pub fn tick(&mut self, moves: &BTreeMap<String, Coord>) -> Result<MovementRecord> {
        let tiles = self.resolve_moves(moves)?;
        let now = self.curr_time;
        self.accidents.inject_due(&mut self.world, self.start_time, now);

        let previous = std::mem::take(&mut self.placed);
        let mut record = MovementRecord::new(now);

        for (idx, tile) in tiles.into_iter().enumerate() {
            let name = self.agents[idx].name().to_string();
            self.place_agent(idx, tile);
            let outcome = self.engine.step(&mut self.agents, idx, &mut self.world, tile, now);
            record.persona.insert(
                name,
                AgentMovement {
                    movement: outcome.next_tile,
                    pronunciatio: outcome.pronunciatio,
                    description: outcome.description,
                    chat: self.agents[idx].scratch.chat.clone(),
                },
            );
        }

        for (event, tile) in previous {
            if !self.placed.iter().any(|(e, t)| *e == event && *t == tile) {
                self.world.idle_event(&event, tile);
            }
        }

        self.persist_step(&record);
        self.curr_time = now + Duration::seconds(self.sec_per_step);
        self.step += 1;
        Ok(record)
    }

    /// The tile each agent stands on this tick, in agent order.
    fn resolve_moves(&self, moves: &BTreeMap<String, Coord>) -> Result<Vec<Coord>> {
        self.agents
            .iter()
            .map(|agent| {
                let name = agent.name();
                let tile = match moves.get(name) {
                    Some(&tile) => tile,
                    None => {
                        let tile = agent
                            .scratch
                            .curr_tile
                            .ok_or_else(|| SimError::MissingPosition(name.to_string()))?;
                        warn!(agent = %name, tile = ?tile, "No movement input; staying put");
                        tile
                    }
                };
                if !self.world.contains(tile) {
                    return Err(SimError::Mover(format!("{name} placed off the grid at {tile:?}")));
                }
                Ok(tile)
            })
            .collect()
    }

    /// Move agent `idx` onto `tile` and put its events there.
    fn place_agent(&mut self, idx: usize, tile: Coord) {
        let scratch = &self.agents[idx].scratch;
        if let Some(old) = scratch.curr_tile {
            self.world.clear_subject_events(&scratch.name, old);
        }

        let event = scratch.curr_event_and_desc();
        if !event.describes_fire() {
            self.world.add_event(event, tile);
        }

        // At the destination the object shows what is being done with it.
        if scratch.planned_path.is_empty() {
            let object = scratch.curr_obj_event_and_desc();
            if !object.subject.is_empty() && !object.is_idle() {
                self.world.remove_event(&Event::idle(object.subject.clone()), tile);
                self.world.add_event(object.clone(), tile);
                self.placed.push((object, tile));
            }
        }
    }

    /// Store the tick's tile snapshot and movement record. Failures are
    /// logged and the run continues.
    fn persist_step(&self, record: &MovementRecord) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save_tile_events(self.step, &self.world.tile_events_snapshot()) {
            warn!(step = self.step, error = %e, "Failed to save tile events");
        }
        if let Err(e) = store.save_movement(self.step, record) {
            warn!(step = self.step, error = %e, "Failed to save movement record");
        }
    }

    /// Put saved tile events back on the world.
    ///
    /// Each event replaces its subject's idle placeholder on that tile.
    pub fn restore_tile_events(&mut self, snapshot: &[TileEvents]) {
        for tiles in snapshot {
            let coord = Coord(tiles.x, tiles.y);
            if !self.world.contains(coord) {
                warn!(tile = ?coord, "Saved tile is off the grid; skipping");
                continue;
            }
            for event in &tiles.events {
                self.world.remove_event(&Event::idle(event.subject.clone()), coord);
                self.world.add_event(event.clone(), coord);
            }
        }
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Write metadata and every agent to the attached store, then rotate
    /// the file backups.
    ///
    /// # Errors
    /// Returns a database or serialization error.
    pub fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            debug!("No store attached; nothing saved");
            return Ok(());
        };
        store.save_meta(&self.meta())?;
        store.save_agents(&self.agents)?;
        if let Err(e) = store.create_rotating_backup() {
            warn!(error = %e, "Backup rotation failed");
        }
        info!(step = self.step, agents = self.agents.len(), "Simulation saved");
        Ok(())
    }

    /// Write `meta.json` and `personas/{name}/` under `dir`.
    ///
    /// # Errors
    /// Returns an I/O or serialization error.
    pub fn save_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.meta().save_json(&dir.join("meta.json"))?;
        for agent in &self.agents {
            agent.save_dir(&dir.join("personas").join(agent.name()))?;
        }
        info!(dir = %dir.display(), step = self.step, "Simulation saved to directory");
        Ok(())
    }
}

/// Load `meta.json` and the listed agents written by [`Simulation::save_dir`].
///
/// # Errors
/// Returns an I/O error for missing files, or a serialization error.
pub fn load_dir(dir: &Path) -> Result<(SimMeta, Vec<Agent>)> {
    let meta = SimMeta::load_json(&dir.join("meta.json"))?;
    let agents = meta
        .persona_names
        .iter()
        .map(|name| Agent::load_dir(&dir.join("personas").join(name)))
        .collect::<reverie_core::Result<Vec<_>>>()?;
    Ok((meta, agents))
}

fn config_error(message: String) -> SimError {
    SimError::Core(ReverieError::Config(message))
}
