//! # Reader Soak
//!
//! M reader threads hammer the query surface while the world moves and the
//! engine rebuilds every region in the background.
//!
//! ```text
//!   sim thread ──step──► SimWorld ◄──capture── build pool ◄── RefreshDriver
//!        │                  ▲                      │
//!        └── clock.set ──┐  └──confirm── readers   └──commit──► regions
//!                        ▼                  │                      │
//!                  ManualClock              └────── query ◄────────┘
//! ```
//!
//! Every batch is checked for the properties readers rely on: one
//! generation per batch, generations never going backwards per region, and
//! no result outside the queried radius. Any violation is an anomaly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sightline_core::{EntityFilter, Generation, Position, QueryStatus, StatusFlags};
use sightline_engine::{
    ActionGate, EngineConfig, EngineResult, GridManager, ManualClock, RefreshDriver, RegionHandle,
};

use crate::world::{SimWorld, WorldConfig};

/// Soak run parameters.
#[derive(Clone, Debug)]
pub struct SoakConfig {
    /// World to simulate.
    pub world: WorldConfig,
    /// Engine settings.
    pub engine: EngineConfig,
    /// Concurrent reader threads.
    pub readers: usize,
    /// Wall-clock run time.
    pub duration: Duration,
    /// Simulated milliseconds per world step, also the real step period.
    pub step_ms: u64,
    /// Refresh driver period.
    pub tick: Duration,
    /// Radius of reader queries.
    pub query_radius: f32,
    /// Inject a capture failure every this many steps; zero disables.
    pub failure_every: u64,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            engine: EngineConfig::default(),
            readers: 8,
            duration: Duration::from_secs(10),
            step_ms: 16,
            tick: Duration::from_millis(10),
            query_radius: 40.0,
            failure_every: 0,
        }
    }
}

/// What a soak run observed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoakReport {
    /// Query batches answered with data.
    pub batches: u64,
    /// Queries answered before the first publish.
    pub no_data: u64,
    /// Property violations seen by readers.
    pub anomalies: u64,
    /// Actions run after authoritative confirmation.
    pub actions_confirmed: u64,
    /// Actions refused by the gate.
    pub actions_rejected: u64,
    /// World steps simulated.
    pub steps: u64,
    /// Generations published across all regions.
    pub published: u64,
    /// Failed or skipped cycles across all regions.
    pub skipped_cycles: u64,
    /// Latest generation per region, ordered by region id.
    pub generations: Vec<Generation>,
    /// Wall-clock run time.
    pub elapsed: Duration,
}

impl SoakReport {
    /// No anomaly was observed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.anomalies == 0
    }
}

#[derive(Default)]
struct Tally {
    batches: AtomicU64,
    no_data: AtomicU64,
    anomalies: AtomicU64,
    confirmed: AtomicU64,
    rejected: AtomicU64,
}

impl Tally {
    fn anomaly(&self, reader: usize, what: &str) {
        let seen = self.anomalies.fetch_add(1, Ordering::Relaxed);
        if seen < 16 {
            tracing::error!(reader, what, "reader anomaly");
        }
    }
}

/// Runs a soak and reports what the readers saw.
///
/// # Errors
///
/// Any [`EngineError`](sightline_engine::EngineError) from starting the
/// manager, registering regions or spawning threads.
pub fn run_soak(config: &SoakConfig) -> EngineResult<SoakReport> {
    let world = Arc::new(SimWorld::new(config.world.clone()));
    let clock = Arc::new(ManualClock::new(world.now()));
    let manager = Arc::new(GridManager::with_clock(
        config.engine.clone(),
        world.clone(),
        clock.clone(),
    )?);

    let handles = world
        .regions()
        .into_iter()
        .map(|region| manager.register_region(region))
        .collect::<EngineResult<Vec<RegionHandle>>>()?;

    let started = Instant::now();
    let mut driver = RefreshDriver::spawn(Arc::clone(&manager), config.tick)?;
    let stop = Arc::new(AtomicBool::new(false));
    let tally = Arc::new(Tally::default());

    let sim = spawn_sim(config, &world, &clock, &stop);
    let readers: Vec<JoinHandle<()>> = (0..config.readers)
        .map(|reader| spawn_reader(reader, config, &handles, &world, &tally, &stop))
        .collect();

    thread::sleep(config.duration);
    stop.store(true, Ordering::Relaxed);

    let steps = sim.join().unwrap_or(0);
    for reader in readers {
        if reader.join().is_err() {
            tally.anomaly(usize::MAX, "reader thread panicked");
        }
    }
    driver.stop();
    let elapsed = started.elapsed();

    let metrics = manager.metrics();
    manager.shutdown();

    Ok(SoakReport {
        batches: tally.batches.load(Ordering::Relaxed),
        no_data: tally.no_data.load(Ordering::Relaxed),
        anomalies: tally.anomalies.load(Ordering::Relaxed),
        actions_confirmed: tally.confirmed.load(Ordering::Relaxed),
        actions_rejected: tally.rejected.load(Ordering::Relaxed),
        steps,
        published: metrics.published_builds,
        skipped_cycles: metrics.per_region.iter().map(|m| m.skipped_cycle_count).sum(),
        generations: metrics.per_region.iter().map(|m| m.generation).collect(),
        elapsed,
    })
}

fn spawn_sim(
    config: &SoakConfig,
    world: &Arc<SimWorld>,
    clock: &Arc<ManualClock>,
    stop: &Arc<AtomicBool>,
) -> JoinHandle<u64> {
    let world = Arc::clone(world);
    let clock = Arc::clone(clock);
    let stop = Arc::clone(stop);
    let step_ms = config.step_ms;
    let failure_every = config.failure_every;
    let regions = world.regions();

    thread::spawn(move || {
        let mut steps = 0u64;
        while !stop.load(Ordering::Relaxed) {
            world.step(step_ms);
            clock.set(world.now());
            steps += 1;
            if failure_every > 0 && steps % failure_every == 0 && !regions.is_empty() {
                let victim = regions[usize::try_from(steps / failure_every).unwrap_or(0) % regions.len()];
                world.fail_next_capture(victim);
            }
            thread::sleep(Duration::from_millis(step_ms));
        }
        steps
    })
}

fn spawn_reader(
    reader: usize,
    config: &SoakConfig,
    handles: &[RegionHandle],
    world: &Arc<SimWorld>,
    tally: &Arc<Tally>,
    stop: &Arc<AtomicBool>,
) -> JoinHandle<()> {
    let handles = handles.to_vec();
    let world = Arc::clone(world);
    let tally = Arc::clone(tally);
    let stop = Arc::clone(stop);
    let radius = config.query_radius;
    let half = config.world.arena / 2.0;
    let seed = config.world.seed ^ (reader as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);

    thread::spawn(move || {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut last = vec![Generation::EMPTY; handles.len()];
        let hostile_alive = EntityFilter::hostile();
        let attackable = EntityFilter::alive().exclude_flags(StatusFlags::EVADING);

        while !stop.load(Ordering::Relaxed) {
            let index = rng.gen_range(0..handles.len().max(1));
            let Some(zone) = handles.get(index) else {
                return;
            };
            let origin = Position::planar(rng.gen_range(-half..=half), rng.gen_range(-half..=half));

            let result = zone.find_in_radius(origin, radius, &hostile_alive);
            if result.status() == QueryStatus::NoData {
                tally.no_data.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            tally.batches.fetch_add(1, Ordering::Relaxed);

            let generation = result.generation();
            if generation < last[index] {
                tally.anomaly(reader, "generation went backwards");
            }
            last[index] = generation;
            if result.value().iter().any(|s| s.generation() != generation) {
                tally.anomaly(reader, "batch mixes generations");
            }
            if result.value().iter().any(|s| s.position().distance(origin) > radius) {
                tally.anomaly(reader, "result outside query radius");
            }

            if let Some(target) = result.value().first() {
                let outcome = ActionGate::new(zone, world.as_ref())
                    .act_on(target, &attackable, |live| live.id);
                if outcome.is_ok() {
                    tally.confirmed.fetch_add(1, Ordering::Relaxed);
                } else {
                    tally.rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    })
}
