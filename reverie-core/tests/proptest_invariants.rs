//! Property-based tests for the engine's structural invariants.
//!
//! Schedules always add up to their slot or their day, retrieval scores stay
//! normalized, world edits are idempotent and neighbourhoods stay on the
//! grid, whatever the inputs.

use std::collections::BTreeMap;

use proptest::prelude::*;

use chrono::NaiveDate;

use reverie_core::agent::schedule::{self, DAY_MINUTES, ScheduleEntry};
use reverie_core::embedding::{EmbeddingProvider, HashingEmbeddingProvider};
use reverie_core::memory::{Filling, MemoryStore, NodeDraft};
use reverie_core::retrieval::{RetrievalEngine, RetrievalResult};
use reverie_core::retrieval::scoring::{self, RetrievalWeights};
use reverie_core::types::{Coord, Event, SimTime, Triple};
use reverie_core::world::{Tile, WorldMap};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_entry(max_minutes: u32) -> impl Strategy<Value = ScheduleEntry> {
    ("[a-z]{3,10}( [a-z]{3,8})?", 0..=max_minutes).prop_map(|(a, m)| ScheduleEntry::new(a, m))
}

fn arb_schedule() -> impl Strategy<Value = Vec<ScheduleEntry>> {
    prop::collection::vec(arb_entry(400), 0..12)
}

fn grid(width: usize, height: usize) -> WorldMap {
    let mut tiles = vec![vec![Tile::default(); width]; height];
    for row in &mut tiles {
        for tile in row.iter_mut() {
            tile.world = "the Ville".into();
            tile.sector = "Hobbs Cafe".into();
            tile.arena = "cafe".into();
            tile.game_object = "counter".into();
        }
    }
    WorldMap::from_tiles("the Ville", 32, tiles)
}

fn minute(m: u32) -> SimTime {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .and_then(|d| d.and_hms_opt(m / 60, m % 60, 0))
        .expect("valid time")
}

// ---------------------------------------------------------------------------
// Property: a decomposition always sums to the slot it replaces
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn splice_preserves_slot_duration(
        mut day in prop::collection::vec(arb_entry(300), 1..8),
        index in 0..8usize,
        parts in prop::collection::vec(arb_entry(200), 0..6),
    ) {
        let index = index % day.len();
        let before_total = schedule::total_minutes(&day);
        let slot = day[index].duration();
        let len_before = day.len();
        let inserted = schedule::splice_decomposition(&mut day, index, parts);

        prop_assert_eq!(schedule::total_minutes(&day), before_total);
        prop_assert_eq!(day.len(), len_before - 1 + inserted);
        let replaced = &day[index..index + inserted];
        prop_assert_eq!(schedule::total_minutes(replaced), slot);
    }
}

// ---------------------------------------------------------------------------
// Property: fitting hits the target exactly
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn fit_to_duration_hits_target(parts in arb_schedule(), target in 1..1440u32) {
        let fitted = schedule::fit_to_duration(parts, target, "sleeping");
        prop_assert_eq!(schedule::total_minutes(&fitted), target);
        prop_assert!(!fitted.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Property: topping up always yields a whole day
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn top_up_yields_full_day(mut day in arb_schedule()) {
        schedule::top_up_day(&mut day);
        prop_assert_eq!(schedule::total_minutes(&day), DAY_MINUTES);
    }

    #[test]
    fn index_is_monotonic_in_the_minute(mut day in arb_schedule(), a in 0..1440u32, b in 0..1440u32) {
        schedule::top_up_day(&mut day);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(schedule::schedule_index(&day, lo) <= schedule::schedule_index(&day, hi));
        prop_assert!(schedule::schedule_index(&day, hi) < day.len());
    }
}

// ---------------------------------------------------------------------------
// Property: normalization stays in [0, 1]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn normalize_bounds(values in prop::collection::vec(-1000.0..1000.0f64, 1..50)) {
        let normalized = scoring::normalize(&values);
        prop_assert_eq!(normalized.len(), values.len());
        prop_assert!(normalized.iter().all(|v| (0.0..=1.0).contains(v)));

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max > min {
            let at_min = values.iter().position(|v| *v == min).expect("min present");
            let at_max = values.iter().position(|v| *v == max).expect("max present");
            prop_assert!(normalized[at_min].abs() < 1e-12);
            prop_assert!((normalized[at_max] - 1.0).abs() < 1e-12);
        } else {
            prop_assert!(normalized.iter().all(|v| (*v - 0.5).abs() < 1e-12));
        }
    }

    #[test]
    fn constant_maps_normalize_to_half(value in -50.0..50.0f64, n in 1..20usize) {
        prop_assert!(scoring::normalize(&vec![value; n]).iter().all(|v| (*v - 0.5).abs() < 1e-12));
    }
}

// ---------------------------------------------------------------------------
// Property: without a recency weight, access stamps do not feed back
// (distinct poignancies keep the cutoff free of ties)
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn back_to_back_retrieval_is_stable(
        poignancies in (2..15u32).prop_flat_map(|n| Just((1..=n).collect::<Vec<_>>()).prop_shuffle()),
        top_n in 1..10usize,
    ) {
        let embedder = HashingEmbeddingProvider::default();
        let mut memory = MemoryStore::new();
        for (i, p) in poignancies.iter().enumerate() {
            let desc = format!("Klaus is doing chore number {i}");
            let at = minute(u32::try_from(i).expect("small"));
            memory.add_event(NodeDraft {
                created: at,
                expiration: None,
                spo: Triple::new("Klaus", "is", format!("chore {i}")),
                description: desc.clone(),
                keywords: ["Klaus".to_string()].into_iter().collect(),
                poignancy: *p,
                embedding_key: desc.clone(),
                embedding: embedder.embed(&desc).expect("embed"),
                filling: Filling::default(),
            });
        }
        let engine = RetrievalEngine::default();
        let focal = vec!["chores at home".to_string()];
        let weights = RetrievalWeights { recency: 0.0, ..RetrievalWeights::default() };

        let first = engine
            .retrieve(&mut memory, &embedder, weights, &focal, top_n, minute(600))
            .expect("retrieve");
        let second = engine
            .retrieve(&mut memory, &embedder, weights, &focal, top_n, minute(610))
            .expect("retrieve");

        let ids = |r: &BTreeMap<String, Vec<RetrievalResult>>| {
            let mut ids: Vec<_> = r["chores at home"].iter().map(|x| x.node).collect();
            ids.sort();
            ids
        };
        prop_assert_eq!(ids(&first), ids(&second));
        prop_assert_eq!(ids(&first).len(), top_n.min(poignancies.len()));
    }
}

// ---------------------------------------------------------------------------
// Property: remove followed by idle is idempotent
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn remove_then_idle_idempotent(state in "[a-z]{3,12}", x in 0..6usize, y in 0..6usize) {
        let mut world = grid(6, 6);
        let c = Coord(x, y);
        let address = "the Ville:Hobbs Cafe:cafe:counter";
        let event = Event::new(address, "is", state.clone(), state);
        world.add_event(event.clone(), c);

        world.remove_event(&event, c);
        world.idle_event(&event, c);
        let once = world.tile_at(c).events.clone();
        world.remove_event(&event, c);
        world.idle_event(&event, c);
        prop_assert_eq!(&world.tile_at(c).events, &once);
        prop_assert!(once.contains(&Event::idle(address)));
    }
}

// ---------------------------------------------------------------------------
// Property: neighbourhoods are clamped rectangles
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn nearby_tiles_stay_in_bounds(
        width in 1..30usize,
        height in 1..30usize,
        cx in 0..30usize,
        cy in 0..30usize,
        radius in 0..8usize,
    ) {
        let world = grid(width, height);
        let center = Coord(cx % width, cy % height);
        let near = world.nearby_tiles(center, radius);

        prop_assert!(near.len() <= (2 * radius) * (2 * radius));
        for c in &near {
            prop_assert!(world.contains(*c));
            prop_assert!(c.x() + radius >= center.x() && c.x() < center.x() + radius);
            prop_assert!(c.y() + radius >= center.y() && c.y() < center.y() + radius);
        }
    }
}
