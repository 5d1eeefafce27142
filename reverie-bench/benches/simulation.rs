//! Reverie benchmark suite.
//!
//! Rough targets on a laptop:
//!   retrieval_top30_from_500 ......... < 2ms
//!   world_event_churn_100_tiles ...... < 100μs
//!   tick_stub_oracle_5_agents ........ < 5ms

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use reverie_core::config::{AgentConfig, ReverieConfig};
use reverie_core::memory::{Filling, MemoryStore, NodeDraft};
use reverie_core::retrieval::{RetrievalEngine, RetrievalWeights};
use reverie_core::world::Tile;
use reverie_core::{
    Agent, AgentState, CognitionEngine, Coord, EmbeddingProvider, Event, HashingEmbeddingProvider, SimTime,
    StubOracle, Triple, WorldMap,
};
use reverie_sim::Simulation;

const ACTIVITIES: [&str; 6] = ["reading", "painting", "cooking", "writing", "walking", "sleeping"];

fn start() -> SimTime {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .expect("valid time")
}

fn town(size: usize) -> WorldMap {
    let mut tiles = vec![vec![Tile::default(); size]; size];
    for (y, row) in tiles.iter_mut().enumerate() {
        for (x, tile) in row.iter_mut().enumerate() {
            tile.world = "the Ville".into();
            let home = x < size / 2;
            tile.sector = (if home { "Lin family's house" } else { "Hobbs Cafe" }).into();
            tile.arena = (if home { "bedroom" } else { "cafe" }).into();
            if (x + y) % 7 == 0 {
                tile.game_object = (if home { "bed" } else { "cooking area" }).into();
            }
        }
    }
    WorldMap::from_tiles("the Ville", 32, tiles)
}

fn memory(nodes: usize, embedder: &HashingEmbeddingProvider) -> MemoryStore {
    let mut memory = MemoryStore::new();
    for i in 0..nodes {
        let activity = ACTIVITIES[i % ACTIVITIES.len()];
        let description = format!("Klaus is {activity} at the desk number {i}");
        memory.add_event(NodeDraft {
            created: start() + Duration::minutes(i64::try_from(i).expect("small")),
            expiration: None,
            spo: Triple::new("Klaus", "is", activity),
            description: description.clone(),
            keywords: ["Klaus".to_string(), activity.to_string()].into_iter().collect(),
            poignancy: u32::try_from(i % 10).expect("small") + 1,
            embedding_key: description.clone(),
            embedding: embedder.embed(&description).expect("embed"),
            filling: Filling::default(),
        });
    }
    memory
}

/// Benchmark: rank 500 nodes for one focal point.
fn bench_retrieval(c: &mut Criterion) {
    let embedder = HashingEmbeddingProvider::default();
    let memory = memory(500, &embedder);
    let engine = RetrievalEngine::default();
    let weights = RetrievalWeights::default();

    c.bench_function("retrieval_top30_from_500", |b| {
        b.iter(|| {
            let ranked = engine
                .rank(black_box(&memory), &embedder, weights, black_box("Klaus is painting"), 30)
                .expect("rank");
            black_box(ranked);
        });
    });
}

/// Benchmark: add, idle and clear events over 100 tiles.
fn bench_world_churn(c: &mut Criterion) {
    let mut world = town(10);
    let tiles: Vec<Coord> = (0..10).flat_map(|y| (0..10).map(move |x| Coord(x, y))).collect();

    c.bench_function("world_event_churn_100_tiles", |b| {
        b.iter(|| {
            for (i, &tile) in tiles.iter().enumerate() {
                let subject = format!("agent {}", i % 8);
                let event = Event::new(subject.as_str(), "is", "busy", "busy working");
                world.add_event(event.clone(), tile);
                world.idle_event(&event, tile);
                world.clear_subject_events(&subject, tile);
            }
            black_box(&world);
        });
    });
}

/// Benchmark: one full tick for five agents with the stub oracle.
fn bench_tick(c: &mut Criterion) {
    let mut config = ReverieConfig::default();
    config.simulation.start_time = "February 13, 2023, 08:00:00".into();
    let engine = CognitionEngine::new(
        Arc::new(StubOracle::new()),
        Arc::new(HashingEmbeddingProvider::default()),
        &config,
    )
    .with_seed(7);

    let agents: Vec<Agent> = (0..5)
        .map(|i| {
            let mut agent = Agent::new(AgentState::new(format!("Agent {i}"), &AgentConfig::default()));
            agent.scratch.curr_tile = Some(Coord(2 + i * 3, 5));
            agent.spatial.insert("the Ville", "Lin family's house", "bedroom", Some("bed"));
            agent.spatial.insert("the Ville", "Hobbs Cafe", "cafe", Some("cooking area"));
            agent
        })
        .collect();
    let mut sim = Simulation::new(config, town(20), agents, engine).expect("simulation");

    c.bench_function("tick_stub_oracle_5_agents", |b| {
        b.iter(|| {
            let moves: BTreeMap<String, Coord> = sim
                .agents()
                .iter()
                .filter_map(|a| a.scratch.curr_tile.map(|t| (a.name().to_string(), t)))
                .collect();
            let record = sim.tick(black_box(&moves)).expect("tick");
            black_box(record);
        });
    });
}

criterion_group!(benches, bench_retrieval, bench_world_churn, bench_tick);
criterion_main!(benches);
