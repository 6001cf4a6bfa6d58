//! End-to-end behaviour of a single region through capture, build and query.

mod common;

use std::sync::Arc;

use common::{creature, inline_config, TestWorld};
use sightline_core::{
    CaptureError, EntityFilter, EntityId, Generation, Position, QueryStatus, RegionId, StatusFlags,
    Timestamp,
};
use sightline_engine::{BuildOutcome, GridManager, ManualClock};

const REGION: RegionId = RegionId::new(1);

fn setup(world: &Arc<TestWorld>) -> (GridManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let manager =
        GridManager::with_clock(inline_config(), world.clone(), clock.clone()).unwrap();
    (manager, clock)
}

#[test]
fn test_radius_query_excludes_far_entity() {
    let world = Arc::new(TestWorld::new());
    world.set(
        REGION,
        vec![creature(1, 0.0, 0.0), creature(2, 10.0, 0.0), creature(3, 100.0, 100.0)],
    );
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    let result = zone.find_in_radius(Position::planar(0.0, 0.0), 15.0, &EntityFilter::alive());
    assert_eq!(result.status(), QueryStatus::Complete);
    let mut ids: Vec<u64> = result.value().iter().map(|s| s.id().raw()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_pinned_generation_keeps_old_position() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(7, 5.0, 5.0)]);
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    let pinned = zone.snapshot().unwrap();
    world.move_entity(REGION, EntityId::new(7), Position::planar(5_000.0, 5_000.0));
    manager.refresh_region(REGION, Timestamp::from_millis(100)).unwrap();

    let old = pinned.get_by_identity(EntityId::new(7));
    assert_eq!(old.generation(), pinned.generation());
    assert_eq!(old.value().unwrap().position(), Position::planar(5.0, 5.0));

    let live = zone.get_by_identity(EntityId::new(7));
    assert_eq!(live.generation(), pinned.generation().next());
    assert_eq!(live.value().unwrap().position(), Position::planar(5_000.0, 5_000.0));

    // The next build targets the pinned slot and must not recycle it.
    assert_eq!(zone.metrics().retained_buffers, 0);
    manager.refresh_region(REGION, Timestamp::from_millis(200)).unwrap();
    assert_eq!(zone.metrics().retained_buffers, 1);
    assert_eq!(
        pinned.get_by_identity(EntityId::new(7)).value().unwrap().position(),
        Position::planar(5.0, 5.0)
    );
}

#[test]
fn test_back_to_back_commits_advance_by_two() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 1.0, 1.0)]);
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();
    let before = zone.generation();

    for now in [10, 20] {
        let outcome = manager.refresh_region(REGION, Timestamp::from_millis(now)).unwrap();
        assert!(outcome.is_published());
    }

    assert_eq!(zone.generation().get(), before.get() + 2);
    let result = zone.find_in_radius(Position::planar(0.0, 0.0), 5.0, &EntityFilter::any());
    assert!(result.value().iter().all(|s| s.generation() == result.generation()));
    assert_eq!(result.value().len(), 1);
}

#[test]
fn test_failed_capture_keeps_last_good_generation() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 1.0, 1.0)]);
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    let good = zone.generation();
    let skipped_before = zone.metrics().skipped_cycle_count;

    world.fail_next_capture();
    world.set(REGION, vec![creature(2, 1.0, 1.0)]);
    let outcome = manager.refresh_region(REGION, Timestamp::from_millis(100)).unwrap();
    assert!(matches!(
        outcome,
        BuildOutcome::Failed(CaptureError::SourceUnavailable { .. })
    ));

    assert_eq!(zone.generation(), good);
    let hit = zone.get_by_identity(EntityId::new(1));
    assert_eq!(hit.generation(), good);
    assert!(hit.value().is_some());
    assert!(zone.get_by_identity(EntityId::new(2)).value().is_none());

    let metrics = zone.metrics();
    assert_eq!(metrics.skipped_cycle_count, skipped_before + 1);
    assert_eq!(metrics.failed_builds, 1);
    assert_eq!(metrics.consecutive_skips, 1);
    assert!(metrics.current_interval_ms > inline_config().refresh_interval_ms);
}

#[test]
fn test_identity_absent_after_two_cycles() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, vec![creature(1, 0.0, 0.0), creature(2, 3.0, 0.0)]);
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();
    let last_seen = zone.generation();

    world.remove_entity(REGION, EntityId::new(2));
    for now in [100, 200] {
        manager.refresh_region(REGION, Timestamp::from_millis(now)).unwrap();
    }

    let gone = zone.get_by_identity(EntityId::new(2));
    assert!(gone.has_data());
    assert!(gone.value().is_none());

    let present = zone.get_by_identity(EntityId::new(1));
    assert!(present.value().unwrap().generation() >= last_seen);
}

#[test]
fn test_empty_region_reports_no_data() {
    let world = Arc::new(TestWorld::new());
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();

    let before = zone.find_in_radius(Position::planar(0.0, 0.0), 10.0, &EntityFilter::any());
    assert_eq!(before.status(), QueryStatus::NoData);
    assert_eq!(before.generation(), Generation::EMPTY);

    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();
    let after = zone.find_in_radius(Position::planar(0.0, 0.0), 10.0, &EntityFilter::any());
    assert_eq!(after.status(), QueryStatus::Complete);
    assert!(after.value().is_empty());
}

#[test]
fn test_dead_entities_filtered_and_radius_zero_empty() {
    let world = Arc::new(TestWorld::new());
    let corpse = creature(2, 1.0, 0.0).with_flags(StatusFlags::empty());
    world.set(REGION, vec![creature(1, 0.0, 0.0), corpse]);
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    let origin = Position::planar(0.0, 0.0);
    assert_eq!(zone.find_in_radius(origin, 5.0, &EntityFilter::alive()).value().len(), 1);
    assert_eq!(zone.find_in_radius(origin, 5.0, &EntityFilter::any()).value().len(), 2);
    assert!(zone.find_in_radius(origin, 0.0, &EntityFilter::any()).value().is_empty());

    let nearest = zone.find_nearest(Position::planar(0.9, 0.0), &EntityFilter::alive(), 5.0);
    assert_eq!(nearest.value().map(|s| s.id()), Some(EntityId::new(1)));
}

#[test]
fn test_predicate_error_returns_partial_results() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, (0..10).map(|i| creature(i, 0.0, 0.0)).collect());
    let (manager, _clock) = setup(&world);
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    let mut seen = 0;
    let result = zone.find_in_radius_where(
        Position::planar(0.0, 0.0),
        5.0,
        &EntityFilter::any(),
        |_| {
            seen += 1;
            if seen > 3 {
                Err("predicate exploded")
            } else {
                Ok(true)
            }
        },
    );
    assert_eq!(result.status(), QueryStatus::Aborted);
    assert_eq!(result.value().len(), 3);
}
