//! # Engine Query Benchmark
//!
//! TARGETS:
//! - A full refresh cycle (capture + build + commit) of 5,000 entities well
//!   inside the default 50ms build timeout
//! - Handle queries unaffected by a builder publishing in the background
//!
//! Run with: `cargo bench --package sightline_engine`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sightline_core::{
    CaptureBuffer, CaptureError, EntityFilter, EntityId, EntityKind, EntityRecord, Position,
    RegionId, Timestamp,
};
use sightline_engine::{EngineConfig, EntitySource, GridManager};

const POPULATION: u64 = 5_000;
const WORLD: f32 = 1_024.0;

/// Stateless source: the same deterministic scatter every capture.
fn scatter(_region: RegionId, sink: &mut CaptureBuffer<'_>) -> Result<(), CaptureError> {
    sink.reserve(POPULATION as usize);
    for i in 0..POPULATION {
        let h = i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let x = (h & 0xFFFF) as f32 / 65_535.0 * WORLD;
        let y = ((h >> 16) & 0xFFFF) as f32 / 65_535.0 * WORLD;
        sink.push(EntityRecord::new(
            EntityId::new(i),
            EntityKind::Creature,
            Position::planar(x, y),
            Timestamp::ZERO,
        ))?;
    }
    Ok(())
}

fn manager() -> Arc<GridManager> {
    let config = EngineConfig {
        worker_threads: 0,
        ..EngineConfig::default()
    };
    let source: Arc<dyn EntitySource> = Arc::new(scatter);
    Arc::new(GridManager::new(config, source).unwrap())
}

/// Benchmark: one inline refresh cycle.
fn bench_refresh_cycle(c: &mut Criterion) {
    let manager = manager();
    let region = RegionId::new(1);
    manager.register_region(region).unwrap();
    let mut now = 0;

    c.bench_function("refresh_cycle_5k", |b| {
        b.iter(|| {
            now += 1;
            black_box(manager.refresh_region(region, Timestamp::from_millis(now)).unwrap())
        });
    });
}

/// Benchmark: radius query through a handle while a builder publishes.
fn bench_query_under_rebuild(c: &mut Criterion) {
    let manager = manager();
    let region = RegionId::new(1);
    let zone = manager.register_region(region).unwrap();
    manager.refresh_region(region, Timestamp::ZERO).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let builder = {
        let manager = Arc::clone(&manager);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut now = 0;
            while !stop.load(Ordering::Relaxed) {
                now += 1;
                let _ = manager.refresh_region(region, Timestamp::from_millis(now));
            }
        })
    };

    let origin = Position::planar(WORLD / 2.0, WORLD / 2.0);
    let filter = EntityFilter::alive();
    let mut group = c.benchmark_group("query_under_rebuild");
    group.bench_function("radius_32", |b| {
        b.iter(|| black_box(zone.find_in_radius(origin, 32.0, &filter)).value().len());
    });
    group.bench_function("nearest", |b| {
        b.iter(|| black_box(zone.find_nearest(origin, &filter, 128.0)).value().is_some());
    });
    group.finish();

    stop.store(true, Ordering::Relaxed);
    let _ = builder.join();
}

criterion_group!(benches, bench_refresh_cycle, bench_query_under_rebuild);
criterion_main!(benches);
