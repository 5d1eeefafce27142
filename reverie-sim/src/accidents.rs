//! Scheduled hazards.
//!
//! An accident sets an object on fire at a fixed offset from the start of
//! the run. Once placed, the fire is the engine's problem: agents who see
//! it respond, and only a resolved object state takes it off the tiles.

use chrono::Duration;
use reverie_core::cognition::fire_event;
use reverie_core::config::AccidentConfig;
use reverie_core::{SimTime, WorldMap};
use tracing::{info, warn};

/// Accidents not yet injected, earliest first.
#[derive(Debug, Clone, Default)]
pub struct AccidentSchedule {
    pending: Vec<AccidentConfig>,
}

impl AccidentSchedule {
    /// Schedule `accidents`. Offsets too large to be a duration are
    /// dropped with a warning.
    #[must_use]
    pub fn new(mut accidents: Vec<AccidentConfig>) -> Self {
        accidents.retain(|a| {
            let valid = Duration::try_seconds(a.at_seconds).is_some();
            if !valid {
                warn!(address = %a.object_address, at_seconds = a.at_seconds, "Accident offset out of range; dropping");
            }
            valid
        });
        accidents.sort_by_key(|a| a.at_seconds);
        Self { pending: accidents }
    }

    /// Accidents still to come.
    #[must_use]
    pub fn pending(&self) -> &[AccidentConfig] {
        &self.pending
    }

    /// Drop accidents already due at `now`, e.g. when resuming a run.
    pub fn skip_due(&mut self, start: SimTime, now: SimTime) -> usize {
        self.take_due(start, now).len()
    }

    /// Inject every accident due by `now` into `world`.
    ///
    /// Returns the addresses set on fire.
    pub fn inject_due(&mut self, world: &mut WorldMap, start: SimTime, now: SimTime) -> Vec<String> {
        self.take_due(start, now)
            .into_iter()
            .filter(|accident| inject(world, accident))
            .map(|accident| accident.object_address)
            .collect()
    }

    fn take_due(&mut self, start: SimTime, now: SimTime) -> Vec<AccidentConfig> {
        let split = self
            .pending
            .iter()
            .position(|a| match due_at(start, a.at_seconds) {
                Some(at) => at > now,
                // Past the end of the calendar in one direction or the other.
                None => a.at_seconds > 0,
            })
            .unwrap_or(self.pending.len());
        self.pending.drain(..split).collect()
    }
}

fn due_at(start: SimTime, at_seconds: i64) -> Option<SimTime> {
    Duration::try_seconds(at_seconds).and_then(|offset| start.checked_add_signed(offset))
}

/// Replace the object's events on every tile it covers with a fire event.
///
/// Returns `false` if the address is unknown to the world.
pub fn inject(world: &mut WorldMap, accident: &AccidentConfig) -> bool {
    let tiles = world.tiles_for_address(&accident.object_address);
    if tiles.is_empty() {
        warn!(address = %accident.object_address, "Accident target not found; skipping");
        return false;
    }
    let fire = fire_event(accident.object_address.as_str(), accident.description.as_str());
    for &tile in &tiles {
        world.clear_subject_events(&accident.object_address, tile);
        world.add_event(fire.clone(), tile);
    }
    info!(address = %accident.object_address, tiles = tiles.len(), "Accident injected");
    true
}
