//! Many readers against a continuously rebuilding region.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{inline_config, TestWorld};
use sightline_core::{
    EntityFilter, EntityId, EntityKind, EntityRecord, Position, RegionId, Timestamp,
};
use sightline_engine::GridManager;

const REGION: RegionId = RegionId::new(9);
const READERS: usize = 6;
const ENTITIES: u64 = 400;

fn population(step: u64) -> Vec<EntityRecord> {
    (0..ENTITIES)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let x = ((i * 7 + step * 3) % 200) as f32 - 100.0;
            #[allow(clippy::cast_precision_loss)]
            let y = ((i * 13 + step) % 200) as f32 - 100.0;
            EntityRecord::new(
                EntityId::new(i),
                EntityKind::Creature,
                Position::planar(x, y),
                Timestamp::from_millis(step),
            )
        })
        .collect()
}

#[test]
fn test_readers_never_see_torn_or_regressing_generations() {
    let world = Arc::new(TestWorld::new());
    world.set(REGION, population(0));
    let manager = Arc::new(GridManager::new(inline_config(), world.clone()).unwrap());
    let zone = manager.register_region(REGION).unwrap();
    manager.refresh_region(REGION, Timestamp::ZERO).unwrap();

    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|r| {
            let zone = zone.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut last = 0u64;
                let mut batches = 0u64;
                #[allow(clippy::cast_precision_loss)]
                let origin = Position::planar(r as f32 * 10.0 - 30.0, 0.0);
                while !stop.load(Ordering::Relaxed) {
                    let result = zone.find_in_radius(origin, 40.0, &EntityFilter::alive());
                    let generation = result.generation().get();
                    assert!(generation >= last, "generation went backwards");
                    assert!(
                        result.value().iter().all(|s| s.generation() == result.generation()),
                        "mixed generations in one batch"
                    );
                    assert!(result
                        .value()
                        .iter()
                        .all(|s| s.position().distance(origin) <= 40.0));

                    let nearest = zone.find_nearest(origin, &EntityFilter::any(), 500.0);
                    assert!(nearest.generation().get() >= generation);
                    if let Some(hit) = nearest.value() {
                        assert_eq!(hit.generation(), nearest.generation());
                    }
                    last = nearest.generation().get();
                    batches += 1;
                }
                batches
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_millis(400);
    let mut step = 1;
    while Instant::now() < deadline {
        world.set(REGION, population(step));
        let outcome = manager
            .refresh_region(REGION, Timestamp::from_millis(step))
            .unwrap();
        assert!(outcome.is_published());
        step += 1;
    }
    stop.store(true, Ordering::Relaxed);

    let total: u64 = readers.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
    assert_eq!(zone.generation().get(), step);
    assert_eq!(zone.metrics().published_builds, step);
}
