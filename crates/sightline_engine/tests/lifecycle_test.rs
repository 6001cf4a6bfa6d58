//! Region lifecycle: teardown, background refresh and the action gate.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{creature, inline_config, TestWorld};
use sightline_core::{
    CaptureError, EntityFilter, EntityId, EntityRecord, GridState, Position, RegionId, StatusFlags,
    Timestamp,
};
use sightline_engine::{
    ActionGate, ActionRejected, Authority, BuildOutcome, EngineConfig, GridManager, ManualClock,
    RefreshDriver, Teardown, Validation,
};

const REGION: RegionId = RegionId::new(3);

#[test]
fn test_unregister_idle_region_quiesces() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    let manager = GridManager::new(inline_config(), world.clone()).unwrap();
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    assert_eq!(manager.unregister_region(REGION).unwrap(), Teardown::Quiesced);
    assert_eq!(zone.state(), GridState::Retired);
    assert!(!zone.get_by_identity(EntityId::new(1)).has_data());
    assert!(manager.region(REGION).is_none());
}

#[test]
fn test_unregister_during_build_times_out_and_forces() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    let config = EngineConfig {
        unregister_timeout_ms: 30,
        ..inline_config()
    };
    let manager = Arc::new(GridManager::new(config, world.clone()).unwrap());
    manager.register_region(REGION).unwrap();

    world.block_next_capture();
    let builder = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.refresh_region(REGION, Timestamp::ZERO))
    };
    world.wait_capture_started();

    let started = Instant::now();
    let teardown = manager.unregister_region(REGION).unwrap();
    assert!(matches!(teardown, Teardown::Forced { waited } if waited >= Duration::from_millis(30)));
    assert!(started.elapsed() < Duration::from_secs(5));

    world.release_capture();
    let outcome = builder.join().unwrap().unwrap();
    assert!(matches!(
        outcome,
        BuildOutcome::Failed(CaptureError::RegionUnloading(_))
    ));
    assert!(manager.regions().is_empty());
}

#[test]
fn test_worker_pool_publishes() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    let config = EngineConfig {
        worker_threads: 2,
        build_timeout_ms: 5_000,
        ..EngineConfig::default()
    };
    let clock = Arc::new(ManualClock::default());
    let manager = GridManager::with_clock(config, world.clone(), clock).unwrap();
    let zone = manager.register_region(REGION).unwrap();

    let report = manager.tick_now();
    assert_eq!(report.due, 1);
    assert_eq!(report.dispatched, 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while zone.generation().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(zone.generation().get(), 1);
    assert_eq!(manager.metrics().dispatched_jobs, 1);

    manager.shutdown();
    assert_eq!(zone.state(), GridState::Retired);
}

#[test]
fn test_driver_ticks_until_stopped() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    let config = EngineConfig {
        refresh_interval_ms: 50,
        ..inline_config()
    };
    let manager = Arc::new(GridManager::new(config, world.clone()).unwrap());
    let zone = manager.register_region(REGION).unwrap();

    let mut driver = RefreshDriver::spawn(Arc::clone(&manager), Duration::from_millis(5)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while zone.generation().get() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    driver.stop();

    assert!(zone.generation().get() >= 2);
    assert!(driver.ticks() > 0);
    let stopped_at = world.captures();
    thread::sleep(Duration::from_millis(120));
    assert_eq!(world.captures(), stopped_at);
}

const HEALTHY: RegionId = RegionId::new(4);

fn wait_for(what: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !what() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    what()
}

#[test]
fn test_panicking_capture_is_contained_inline() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    world.set(HEALTHY, vec![creature(2, 0.0, 0.0)]);
    let clock = Arc::new(ManualClock::default());
    let manager = GridManager::with_clock(inline_config(), world.clone(), clock).unwrap();
    let broken = manager.register_region(REGION).unwrap();
    let healthy = manager.register_region(HEALTHY).unwrap();

    world.panic_next_capture(REGION);
    let report = manager.tick(Timestamp::ZERO);
    assert_eq!(report.ran_inline, 2);
    assert_eq!(report.published, 1);
    assert_eq!(healthy.generation().get(), 1);
    assert!(broken.generation().is_empty());

    let metrics = manager.region_metrics(REGION).unwrap();
    assert_eq!(metrics.failed_builds, 1);
    assert_eq!(metrics.skipped_cycle_count, 1);
    assert!(metrics.current_interval_ms > EngineConfig::default().refresh_interval_ms);

    // Past any backoff both regions refresh again.
    let report = manager.tick(Timestamp::from_millis(60_000));
    assert_eq!(report.published, 2);
    assert_eq!(broken.generation().get(), 1);
    assert_eq!(healthy.generation().get(), 2);

    let outcome = {
        world.panic_next_capture(HEALTHY);
        manager.refresh_region(HEALTHY, Timestamp::from_millis(60_001)).unwrap()
    };
    assert!(matches!(outcome, BuildOutcome::Failed(CaptureError::SourceUnavailable { .. })));
    assert_eq!(healthy.generation().get(), 2);
}

#[test]
fn test_panicking_capture_is_contained_in_pool() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    world.set(HEALTHY, vec![creature(2, 0.0, 0.0)]);
    let config = EngineConfig {
        worker_threads: 1,
        build_timeout_ms: 5_000,
        ..EngineConfig::default()
    };
    let clock = Arc::new(ManualClock::default());
    let manager = GridManager::with_clock(config, world.clone(), clock).unwrap();
    let broken = manager.register_region(REGION).unwrap();
    let healthy = manager.register_region(HEALTHY).unwrap();

    world.panic_next_capture(REGION);
    assert_eq!(manager.tick(Timestamp::ZERO).dispatched, 2);
    assert!(wait_for(|| !healthy.generation().is_empty()));
    assert!(wait_for(|| manager.region_metrics(REGION).unwrap().failed_builds == 1));
    assert!(broken.generation().is_empty());

    // The single worker survived the panic and keeps serving both regions.
    assert_eq!(manager.tick(Timestamp::from_millis(60_000)).dispatched, 2);
    assert!(wait_for(|| broken.generation().get() == 1 && healthy.generation().get() == 2));

    let metrics = manager.metrics();
    assert_eq!(metrics.dropped_jobs, 0);
    assert_eq!(metrics.published_builds, 3);
    assert_eq!(manager.region_metrics(HEALTHY).unwrap().skipped_cycle_count, 0);
    manager.shutdown();
}

#[test]
fn test_driver_survives_panicking_capture() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    world.set(HEALTHY, vec![creature(2, 0.0, 0.0)]);
    let config = EngineConfig {
        refresh_interval_ms: 20,
        max_interval_ms: 100,
        ..inline_config()
    };
    let manager = Arc::new(GridManager::new(config, world.clone()).unwrap());
    let broken = manager.register_region(REGION).unwrap();
    let healthy = manager.register_region(HEALTHY).unwrap();

    world.panic_next_capture(REGION);
    let mut driver = RefreshDriver::spawn(Arc::clone(&manager), Duration::from_millis(5)).unwrap();
    assert!(wait_for(|| healthy.generation().get() >= 2 && broken.generation().get() >= 1));
    let ticks = driver.ticks();
    assert!(wait_for(|| driver.ticks() > ticks));
    driver.stop();

    assert_eq!(manager.region_metrics(REGION).unwrap().failed_builds, 1);
}

struct LiveWorld {
    record: Option<EntityRecord>,
}

impl Authority for LiveWorld {
    type Error = &'static str;

    fn confirm(&self, _region: RegionId, id: EntityId) -> Result<Option<EntityRecord>, Self::Error> {
        Ok(self.record.filter(|r| r.id == id))
    }
}

#[test]
fn test_action_gate_confirms_before_acting() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0)]);
    let clock = Arc::new(ManualClock::default());
    let manager = GridManager::with_clock(inline_config(), world.clone(), clock.clone()).unwrap();
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    let target = zone
        .find_nearest(Position::planar(0.0, 0.0), &EntityFilter::alive(), 10.0)
        .into_value()
        .unwrap();

    let alive = LiveWorld {
        record: Some(creature(1, 0.5, 0.0)),
    };
    let hit = ActionGate::new(&zone, &alive)
        .act_on(&target, &EntityFilter::alive(), |live| live.position)
        .unwrap();
    assert_eq!(hit, Position::planar(0.5, 0.0));

    let dead = LiveWorld {
        record: Some(creature(1, 0.5, 0.0).with_flags(StatusFlags::empty())),
    };
    assert!(matches!(
        ActionGate::new(&zone, &dead).act_on(&target, &EntityFilter::alive(), |_| ()),
        Err(ActionRejected::NoLongerMatches(_))
    ));

    let gone = LiveWorld { record: None };
    assert!(matches!(
        ActionGate::new(&zone, &gone).act_on(&target, &EntityFilter::alive(), |_| ()),
        Err(ActionRejected::Gone(_))
    ));

    clock.advance(5_000);
    assert!(matches!(
        ActionGate::new(&zone, &alive)
            .with_max_staleness(1_000)
            .act_on(&target, &EntityFilter::alive(), |_| ()),
        Err(ActionRejected::Implausible(Validation::Stale { .. }))
    ));
}
