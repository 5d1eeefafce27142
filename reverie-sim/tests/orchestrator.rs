//! Integration tests: the tick loop against a small town with the
//! deterministic oracle.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tokio::sync::watch;

use reverie_core::cognition::CognitionEngine;
use reverie_core::config::{AccidentConfig, AgentConfig, PersistenceConfig, ReverieConfig};
use reverie_core::embedding::HashingEmbeddingProvider;
use reverie_core::oracle::{Decision, StubOracle};
use reverie_core::persistence::PersistenceEngine;
use reverie_core::types::{Coord, Event, SimTime, Triple};
use reverie_core::world::{Tile, WorldMap};
use reverie_core::{Agent, AgentState};
use reverie_sim::orchestrator::load_dir;
use reverie_sim::{FileMover, MovementRecord, PathFollower, SimError, Simulation};

const STOVE: &str = "the Ville:Hobbs Cafe:cafe:cooking area";

fn at(h: u32, m: u32, s: u32) -> SimTime {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .and_then(|d| d.and_hms_opt(h, m, s))
        .expect("valid time")
}

/// A 10×10 town: a bedroom on the left, a cafe on the right, walls top
/// and bottom.
fn town() -> WorldMap {
    let mut tiles = vec![vec![Tile::default(); 10]; 10];
    for (y, row) in tiles.iter_mut().enumerate() {
        for (x, tile) in row.iter_mut().enumerate() {
            tile.world = "the Ville".into();
            if x < 5 {
                tile.sector = "Lin family's house".into();
                tile.arena = "bedroom".into();
            } else {
                tile.sector = "Hobbs Cafe".into();
                tile.arena = "cafe".into();
            }
            tile.collision = y == 0 || y == 9;
        }
    }
    tiles[2][1].game_object = "bed".into();
    tiles[2][2].game_object = "bed".into();
    tiles[5][7].game_object = "cooking area".into();
    WorldMap::from_tiles("the Ville", 32, tiles)
}

fn persona(name: &str, tile: Coord) -> Agent {
    let mut agent = Agent::new(AgentState::new(name, &AgentConfig::default()));
    agent.scratch.curr_tile = Some(tile);
    agent.spatial.insert("the Ville", "Lin family's house", "bedroom", Some("bed"));
    agent.spatial.insert("the Ville", "Hobbs Cafe", "cafe", Some("cooking area"));
    agent
}

fn config(start: &str) -> ReverieConfig {
    let mut config = ReverieConfig::default();
    config.simulation.start_time = start.into();
    config.simulation.poll_interval_ms = 10;
    config.simulation.seed = Some(7);
    config
}

fn engine(oracle: Arc<StubOracle>, config: &ReverieConfig) -> CognitionEngine {
    CognitionEngine::new(oracle, Arc::new(HashingEmbeddingProvider::default()), config).with_seed(42)
}

fn simulation(config: ReverieConfig, agents: Vec<Agent>) -> Simulation {
    let engine = engine(Arc::new(StubOracle::new()), &config);
    Simulation::new(config, town(), agents, engine).expect("simulation")
}

fn stay(sim: &Simulation) -> BTreeMap<String, Coord> {
    sim.agents()
        .iter()
        .map(|a| (a.name().to_string(), a.scratch.curr_tile.expect("placed")))
        .collect()
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn duplicate_agents_are_rejected() {
    let config = config("February 13, 2023, 09:00:00");
    let engine = engine(Arc::new(StubOracle::new()), &config);
    let agents = vec![persona("Klaus Mueller", Coord(1, 3)), persona("Klaus Mueller", Coord(2, 3))];
    let err = Simulation::new(config, town(), agents, engine).expect_err("duplicate");
    assert!(err.to_string().contains("Klaus Mueller"));
}

#[test]
fn bad_clock_settings_are_rejected() {
    let bad_time = config("someday");
    let first = engine(Arc::new(StubOracle::new()), &bad_time);
    assert!(Simulation::new(bad_time, town(), Vec::new(), first).is_err());

    let mut bad_step = config("February 13, 2023, 09:00:00");
    bad_step.simulation.sec_per_step = 0;
    let second = engine(Arc::new(StubOracle::new()), &bad_step);
    assert!(Simulation::new(bad_step, town(), Vec::new(), second).is_err());
}

// ---------------------------------------------------------------------------
// Ticks
// ---------------------------------------------------------------------------

#[test]
fn tick_advances_the_clock_and_records_every_agent() {
    let mut sim = simulation(
        config("February 13, 2023, 09:00:00"),
        vec![persona("Klaus Mueller", Coord(1, 3)), persona("Maria Lopez", Coord(6, 6))],
    );

    let record = sim.tick(&stay(&sim)).expect("tick");
    assert_eq!(record.meta.curr_time, at(9, 0, 0));
    assert_eq!(record.persona.len(), 2);
    assert!(record.persona.values().all(|m| m.description.contains(" @ ")));
    assert_eq!(sim.step(), 1);
    assert_eq!(sim.curr_time(), at(9, 0, 10));

    for agent in sim.agents() {
        let tile = agent.scratch.curr_tile.expect("placed");
        assert!(
            sim.world().tile_at(tile).events.iter().any(|e| e.subject == agent.name()),
            "{} has an event on its tile",
            agent.name()
        );
    }
}

#[test]
fn missing_input_keeps_the_agent_in_place() {
    let mut sim = simulation(config("February 13, 2023, 09:00:00"), vec![persona("Klaus Mueller", Coord(1, 3))]);
    let record = sim.tick(&BTreeMap::new()).expect("tick");
    assert!(record.persona.contains_key("Klaus Mueller"));
}

#[test]
fn an_agent_with_no_tile_cannot_tick() {
    let mut lost = persona("Klaus Mueller", Coord(1, 3));
    lost.scratch.curr_tile = None;
    let mut sim = simulation(config("February 13, 2023, 09:00:00"), vec![lost]);
    assert!(matches!(sim.tick(&BTreeMap::new()), Err(SimError::MissingPosition(name)) if name == "Klaus Mueller"));
}

#[test]
fn off_grid_moves_are_rejected() {
    let mut sim = simulation(config("February 13, 2023, 09:00:00"), vec![persona("Klaus Mueller", Coord(1, 3))]);
    let moves: BTreeMap<String, Coord> = [("Klaus Mueller".to_string(), Coord(50, 50))].into_iter().collect();
    assert!(matches!(sim.tick(&moves), Err(SimError::Mover(_))));
    assert_eq!(sim.step(), 0);
}

#[test]
fn object_events_are_idled_once_the_agent_leaves() {
    let mut cook = persona("Isabella Rodriguez", Coord(7, 5));
    cook.scratch.act_address = Some(STOVE.into());
    cook.scratch.act_event = Some(Triple::new("Isabella Rodriguez", "is", "cooking"));
    cook.scratch.act_description = Some("cooking breakfast".into());
    cook.scratch.act_obj_event = Some(Triple::new(STOVE, "is", "being cooked on"));
    cook.scratch.act_obj_description = Some("being cooked on".into());
    let cooking = cook.scratch.curr_obj_event_and_desc();

    let mut sim = simulation(config("February 13, 2023, 09:00:00"), vec![cook]);
    sim.tick(&stay(&sim)).expect("first tick");
    let stove = &sim.world().tile_at(Coord(7, 5)).events;
    assert!(stove.contains(&cooking));
    assert!(!stove.contains(&Event::idle(STOVE)));

    // Somewhere else entirely; the stove goes back to idle.
    let moves: BTreeMap<String, Coord> = [("Isabella Rodriguez".to_string(), Coord(2, 6))].into_iter().collect();
    sim.tick(&moves).expect("second tick");
    let stove = &sim.world().tile_at(Coord(7, 5)).events;
    assert!(!stove.contains(&cooking));
    assert!(stove.contains(&Event::idle(STOVE)));
}

#[test]
fn a_rejected_tick_leaves_world_and_agents_untouched() {
    let mut cook = persona("Isabella Rodriguez", Coord(7, 5));
    cook.scratch.act_address = Some(STOVE.into());
    cook.scratch.act_event = Some(Triple::new("Isabella Rodriguez", "is", "cooking"));
    cook.scratch.act_description = Some("cooking breakfast".into());
    cook.scratch.act_obj_event = Some(Triple::new(STOVE, "is", "being cooked on"));
    cook.scratch.act_obj_description = Some("being cooked on".into());
    let cooking = cook.scratch.curr_obj_event_and_desc();

    let mut sim = simulation(
        config("February 13, 2023, 09:00:00"),
        vec![cook, persona("Klaus Mueller", Coord(1, 3))],
    );
    sim.tick(&stay(&sim)).expect("first tick");
    let world_before = sim.world().tile_events_snapshot();
    let isabella = sim.agent("Isabella Rodriguez").expect("agent");
    let (tile_before, clock_before) = (isabella.scratch.curr_tile, isabella.scratch.curr_time);

    // Isabella's move is fine, Klaus's is not; neither may take effect.
    let moves: BTreeMap<String, Coord> = [
        ("Isabella Rodriguez".to_string(), Coord(2, 6)),
        ("Klaus Mueller".to_string(), Coord(50, 50)),
    ]
    .into_iter()
    .collect();
    let err = sim.tick(&moves).expect_err("off the grid");
    assert!(matches!(err, SimError::Mover(_)));
    assert_eq!(sim.step(), 1);
    assert_eq!(sim.curr_time(), at(9, 0, 10));
    let isabella = sim.agent("Isabella Rodriguez").expect("agent");
    assert_eq!(isabella.scratch.curr_tile, tile_before);
    assert_eq!(isabella.scratch.curr_time, clock_before);
    assert_eq!(sim.world().tile_events_snapshot(), world_before);

    // The stove is still released once she really leaves.
    let moves: BTreeMap<String, Coord> = [("Isabella Rodriguez".to_string(), Coord(2, 6))].into_iter().collect();
    sim.tick(&moves).expect("second tick");
    sim.tick(&stay(&sim)).expect("third tick");
    let stove = &sim.world().tile_at(Coord(7, 5)).events;
    assert!(!stove.contains(&cooking));
    assert!(stove.contains(&Event::idle(STOVE)));
}

#[test]
fn accidents_ignite_on_schedule_and_are_noticed() {
    let mut config = config("February 13, 2023, 10:00:00");
    config.accidents = vec![AccidentConfig {
        object_address: STOVE.into(),
        at_seconds: 20,
        description: "the cooking area is on fire".into(),
    }];
    let oracle = Arc::new(StubOracle::new());
    let engine = engine(oracle.clone(), &config);
    let mut sim =
        Simulation::new(config, town(), vec![persona("Isabella Rodriguez", Coord(4, 4))], engine).expect("simulation");

    sim.tick(&stay(&sim)).expect("tick 0");
    sim.tick(&stay(&sim)).expect("tick 1");
    assert_eq!(sim.accidents().pending().len(), 1);
    assert_eq!(oracle.call_count(Decision::AccidentResponse), 0);

    sim.tick(&stay(&sim)).expect("tick 2");
    assert!(sim.accidents().pending().is_empty());
    let agent = sim.agent("Isabella Rodriguez").expect("agent");
    assert!(agent.memory.events().any(|n| n.description.contains("on fire")));
    assert_eq!(oracle.call_count(Decision::AccidentResponse), 1);
}

// ---------------------------------------------------------------------------
// Running against a mover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn headless_run_persists_every_step() {
    let store = PersistenceEngine::open_in_memory(&PersistenceConfig::default()).expect("store");
    let mut sim = simulation(
        config("February 13, 2023, 09:00:00"),
        vec![persona("Klaus Mueller", Coord(1, 3)), persona("Maria Lopez", Coord(6, 6))],
    )
    .with_store(store);
    let mut mover = PathFollower::from_agents(sim.agents(), sim.world()).expect("positions");

    let done = sim.run(&mut mover, 3).await.expect("run");
    assert_eq!(done, 3);
    assert_eq!(sim.step(), 3);
    assert_eq!(sim.curr_time(), at(9, 0, 0) + Duration::seconds(30));

    sim.save().expect("save");
    let dir = tempfile::tempdir().expect("tempdir");
    sim.save_dir(dir.path()).expect("save dir");
    let (meta, agents) = load_dir(dir.path()).expect("load dir");
    assert_eq!(meta.step, 3);
    assert_eq!(meta.persona_names, vec!["Klaus Mueller".to_string(), "Maria Lopez".to_string()]);
    assert_eq!(agents.len(), 2);
}

#[tokio::test]
async fn run_writes_movement_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut mover = FileMover::new(dir.path()).expect("mover");
    std::fs::write(mover.environment_path(0), r#"{"Klaus Mueller": {"maze": "the_ville", "x": 1, "y": 3}}"#)
        .expect("write");

    let mut sim = simulation(config("February 13, 2023, 09:00:00"), vec![persona("Klaus Mueller", Coord(1, 3))]);
    sim.run(&mut mover, 1).await.expect("run");

    let record: MovementRecord =
        serde_json::from_str(&std::fs::read_to_string(mover.movement_path(0)).expect("read")).expect("parse");
    assert_eq!(record.meta.curr_time, at(9, 0, 0));
    assert!(record.persona.contains_key("Klaus Mueller"));
}

#[tokio::test]
async fn abort_stops_the_wait() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut mover = FileMover::new(dir.path()).expect("mover");
    let (tx, rx) = watch::channel(false);
    let mut sim = simulation(config("February 13, 2023, 09:00:00"), vec![persona("Klaus Mueller", Coord(1, 3))])
        .with_abort(rx);

    tx.send(true).expect("send");
    let err = sim.run(&mut mover, 5).await.expect_err("aborted");
    assert!(matches!(err, SimError::Aborted { step: 0 }));
    assert_eq!(sim.step(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_silent_mover_times_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut mover = FileMover::new(dir.path()).expect("mover");
    let mut config = config("February 13, 2023, 09:00:00");
    config.simulation.mover_timeout_ms = Some(50);
    let mut sim = simulation(config, vec![persona("Klaus Mueller", Coord(1, 3))]);

    let err = sim.run(&mut mover, 1).await.expect_err("timeout");
    assert!(matches!(err, SimError::MoverTimeout { step: 0, waited_ms } if waited_ms >= 50));
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_picks_up_where_the_save_left_off() {
    let mut config = config("February 13, 2023, 09:00:00");
    config.accidents = vec![AccidentConfig {
        object_address: STOVE.into(),
        at_seconds: 10,
        description: "the cooking area is on fire".into(),
    }];
    let mut sim = simulation(
        config.clone(),
        vec![persona("Maria Lopez", Coord(6, 6)), persona("Klaus Mueller", Coord(1, 3))],
    );
    let mut mover = PathFollower::from_agents(sim.agents(), sim.world()).expect("positions");
    sim.run(&mut mover, 2).await.expect("run");

    let dir = tempfile::tempdir().expect("tempdir");
    sim.save_dir(dir.path()).expect("save");

    let (meta, mut agents) = load_dir(dir.path()).expect("load");
    agents.reverse();
    let engine = engine(Arc::new(StubOracle::new()), &config);
    let mut resumed = Simulation::resume(config, town(), agents, engine, meta).expect("resume");

    assert_eq!(resumed.step(), 2);
    assert_eq!(resumed.curr_time(), sim.curr_time());
    let order: Vec<&str> = resumed.agents().iter().map(Agent::name).collect();
    assert_eq!(order, vec!["Maria Lopez", "Klaus Mueller"]);
    assert!(resumed.accidents().pending().is_empty(), "the fire already happened");

    let mut mover = PathFollower::from_agents(resumed.agents(), resumed.world())
        .expect("positions")
        .starting_at(resumed.step());
    resumed.run(&mut mover, 1).await.expect("continue");
    assert_eq!(resumed.step(), 3);
}

#[test]
fn restored_events_replace_idle_placeholders() {
    let mut sim = simulation(config("February 13, 2023, 09:00:00"), vec![persona("Klaus Mueller", Coord(1, 3))]);
    let burning = reverie_core::cognition::fire_event(STOVE, "the cooking area is on fire");
    let mut source = town();
    source.remove_event(&Event::idle(STOVE), Coord(7, 5));
    source.add_event(burning.clone(), Coord(7, 5));

    sim.restore_tile_events(&source.tile_events_snapshot());
    let events = &sim.world().tile_at(Coord(7, 5)).events;
    assert!(events.contains(&burning));
    assert!(!events.contains(&Event::idle(STOVE)));
}
