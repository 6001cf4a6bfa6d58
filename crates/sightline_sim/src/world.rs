//! # Simulated World
//!
//! A seeded, single-lock population that plays the authoritative side.
//!
//! Every mutation and every capture take the same lock, so a capture always
//! sees a whole step and never a half-moved entity. Two worlds built from
//! the same [`WorldConfig`] and driven by the same calls evolve identically.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sightline_core::{
    CaptureBuffer, CaptureError, Disposition, EntityId, EntityKind, EntityRecord, Position,
    RegionId, StatusFlags, Timestamp,
};
use sightline_engine::{Authority, EntitySource};

/// Shape of the generated world.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldConfig {
    /// RNG seed.
    pub seed: u64,
    /// Regions `1..=regions` are populated.
    pub regions: u32,
    /// Entities spawned per region.
    pub entities_per_region: u32,
    /// Each region spans `[-arena/2, arena/2]` on both axes.
    pub arena: f32,
    /// Fastest movement, units per second.
    pub max_speed: f32,
    /// Share of hostile creatures.
    pub hostile_ratio: f64,
    /// Chance per entity per step of dying (and respawning elsewhere later).
    pub churn: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            regions: 4,
            entities_per_region: 1_000,
            arena: 1_024.0,
            max_speed: 8.0,
            hostile_ratio: 0.3,
            churn: 0.001,
        }
    }
}

struct WorldState {
    rng: ChaCha8Rng,
    now: Timestamp,
    next_id: u64,
    regions: HashMap<RegionId, Vec<EntityRecord>>,
    failing: HashSet<RegionId>,
}

/// Deterministic stand-in for the authoritative simulation.
pub struct SimWorld {
    config: WorldConfig,
    state: Mutex<WorldState>,
}

impl SimWorld {
    /// Spawns the initial population.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        let mut state = WorldState {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            now: Timestamp::ZERO,
            next_id: 1,
            regions: HashMap::new(),
            failing: HashSet::new(),
        };
        for raw in 1..=config.regions {
            let region = RegionId::new(raw);
            let mut records = Vec::with_capacity(config.entities_per_region as usize);
            for _ in 0..config.entities_per_region {
                records.push(random_entity(&mut state, &config));
            }
            state.regions.insert(region, records);
        }
        tracing::debug!(
            seed = config.seed,
            regions = config.regions,
            entities_per_region = config.entities_per_region,
            "world generated"
        );
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Generation parameters.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Regions with a population, ascending.
    #[must_use]
    pub fn regions(&self) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self.state.lock().regions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Simulation time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.state.lock().now
    }

    /// Advances time by `dt_ms`: living entities wander, some die, corpses
    /// are cleared.
    pub fn step(&self, dt_ms: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.now = state.now.add_millis(dt_ms);
        #[allow(clippy::cast_precision_loss)]
        let reach = self.config.max_speed * dt_ms as f32 / 1_000.0;
        let half = self.config.arena / 2.0;

        let mut ids: Vec<RegionId> = state.regions.keys().copied().collect();
        ids.sort_unstable();
        for region in ids {
            let Some(records) = state.regions.get_mut(&region) else {
                continue;
            };
            records.retain(|r| r.kind != EntityKind::Corpse);
            for record in records.iter_mut() {
                record.observed_at = state.now;
                if !record.flags.contains(StatusFlags::ALIVE) {
                    record.kind = EntityKind::Corpse;
                    continue;
                }
                if record.kind == EntityKind::StaticObject {
                    continue;
                }
                if state.rng.gen_bool(self.config.churn) {
                    record.flags = record.flags.without(StatusFlags::ALIVE);
                    continue;
                }
                let dx = state.rng.gen_range(-reach..=reach);
                let dy = state.rng.gen_range(-reach..=reach);
                record.position = Position::new(
                    (record.position.x + dx).clamp(-half, half),
                    (record.position.y + dy).clamp(-half, half),
                    record.position.z,
                );
            }
        }
    }

    /// Adds an entity and returns its id.
    pub fn spawn(&self, region: RegionId, kind: EntityKind, position: Position) -> EntityId {
        let mut state = self.state.lock();
        let id = EntityId::new(state.next_id);
        state.next_id += 1;
        let record = EntityRecord::new(id, kind, position, state.now);
        state.regions.entry(region).or_default().push(record);
        id
    }

    /// Clears the ALIVE flag. Returns false if the entity is unknown.
    pub fn kill(&self, region: RegionId, id: EntityId) -> bool {
        self.update(region, id, |record| {
            record.flags = record.flags.without(StatusFlags::ALIVE);
        })
    }

    /// Moves an entity instantly. Returns false if the entity is unknown.
    pub fn teleport(&self, region: RegionId, id: EntityId, to: Position) -> bool {
        self.update(region, id, |record| record.position = to)
    }

    /// The next capture of `region` fails with `SourceUnavailable`.
    pub fn fail_next_capture(&self, region: RegionId) {
        self.state.lock().failing.insert(region);
    }

    /// Live record of an entity.
    #[must_use]
    pub fn record(&self, region: RegionId, id: EntityId) -> Option<EntityRecord> {
        self.state
            .lock()
            .regions
            .get(&region)
            .and_then(|records| records.iter().find(|r| r.id == id).copied())
    }

    /// Entities currently in `region`, corpses included.
    #[must_use]
    pub fn population(&self, region: RegionId) -> usize {
        self.state.lock().regions.get(&region).map_or(0, Vec::len)
    }

    fn update(&self, region: RegionId, id: EntityId, apply: impl FnOnce(&mut EntityRecord)) -> bool {
        let mut state = self.state.lock();
        let now = state.now;
        let Some(record) = state
            .regions
            .get_mut(&region)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
        else {
            return false;
        };
        apply(record);
        record.observed_at = now;
        true
    }
}

fn random_entity(state: &mut WorldState, config: &WorldConfig) -> EntityRecord {
    let half = config.arena / 2.0;
    let id = EntityId::new(state.next_id);
    state.next_id += 1;

    let kind = match state.rng.gen_range(0..20) {
        0 => EntityKind::StaticObject,
        1 => EntityKind::TriggerVolume,
        2..=4 => EntityKind::Player,
        _ => EntityKind::Creature,
    };
    let disposition = if kind == EntityKind::Player {
        Disposition::Friendly
    } else if state.rng.gen_bool(config.hostile_ratio) {
        Disposition::Hostile
    } else {
        Disposition::Neutral
    };
    let position = Position::new(
        state.rng.gen_range(-half..=half),
        state.rng.gen_range(-half..=half),
        state.rng.gen_range(0.0..8.0),
    );

    let mut flags = StatusFlags::ALIVE;
    if kind == EntityKind::TriggerVolume || kind == EntityKind::StaticObject {
        flags |= StatusFlags::INTERACTABLE;
    }
    EntityRecord::new(id, kind, position, state.now)
        .with_disposition(disposition)
        .with_flags(flags)
        .with_radius(state.rng.gen_range(0.3..1.5))
}

impl EntitySource for SimWorld {
    fn capture(&self, region: RegionId, sink: &mut CaptureBuffer<'_>) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.failing.remove(&region) {
            return Err(CaptureError::unavailable(region, "injected capture failure"));
        }
        let Some(records) = state.regions.get(&region) else {
            return Err(CaptureError::unavailable(region, "region not loaded"));
        };
        sink.reserve(records.len());
        for record in records {
            sink.push(*record)?;
        }
        Ok(())
    }
}

impl Authority for SimWorld {
    type Error = std::convert::Infallible;

    fn confirm(&self, region: RegionId, id: EntityId) -> Result<Option<EntityRecord>, Self::Error> {
        Ok(self.record(region, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::Generation;

    fn small() -> WorldConfig {
        WorldConfig {
            regions: 2,
            entities_per_region: 50,
            churn: 0.0,
            ..WorldConfig::default()
        }
    }

    fn capture(world: &SimWorld, region: RegionId) -> Result<usize, CaptureError> {
        let mut sink = CaptureBuffer::new(region, Generation::new(1), world.now());
        world.capture(region, &mut sink)?;
        Ok(sink.finish()?.len())
    }

    #[test]
    fn test_same_seed_same_world() {
        let a = SimWorld::new(small());
        let b = SimWorld::new(small());
        for _ in 0..10 {
            a.step(100);
            b.step(100);
        }
        let region = RegionId::new(1);
        for raw in 1..=50 {
            let id = EntityId::new(raw);
            assert_eq!(a.record(region, id), b.record(region, id));
        }
    }

    #[test]
    fn test_movement_respects_speed_and_arena() {
        let world = SimWorld::new(small());
        let region = RegionId::new(2);
        let id = EntityId::new(51);
        let before = world.record(region, id).unwrap();
        world.step(1_000);
        let after = world.record(region, id).unwrap();

        let limit = world.config().max_speed * std::f32::consts::SQRT_2 + 1e-3;
        assert!(before.position.distance(after.position) <= limit);
        let half = world.config().arena / 2.0;
        assert!(after.position.x.abs() <= half && after.position.y.abs() <= half);
        assert_eq!(after.observed_at, Timestamp::from_millis(1_000));
    }

    #[test]
    fn test_capture_and_injected_failure() {
        let world = SimWorld::new(small());
        let region = RegionId::new(1);
        assert_eq!(capture(&world, region), Ok(50));

        world.fail_next_capture(region);
        assert!(matches!(
            capture(&world, region),
            Err(CaptureError::SourceUnavailable { .. })
        ));
        assert_eq!(capture(&world, region), Ok(50));
        assert!(capture(&world, RegionId::new(99)).is_err());
    }

    #[test]
    fn test_kill_leaves_corpse_then_clears() {
        let world = SimWorld::new(small());
        let region = RegionId::new(1);
        let id = world.spawn(region, EntityKind::Creature, Position::planar(0.0, 0.0));
        assert_eq!(world.population(region), 51);

        assert!(world.kill(region, id));
        world.step(10);
        assert_eq!(world.record(region, id).map(|r| r.kind), Some(EntityKind::Corpse));
        world.step(10);
        assert!(world.record(region, id).is_none());
        assert!(!world.teleport(region, id, Position::planar(1.0, 1.0)));
    }
}
