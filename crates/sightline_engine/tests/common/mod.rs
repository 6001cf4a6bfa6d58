//! Shared in-memory entity source for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use sightline_core::{
    CaptureBuffer, CaptureError, EntityId, EntityKind, EntityRecord, Position, RegionId,
    Timestamp,
};
use sightline_engine::{EngineConfig, EntitySource};

/// A hand-driven population, one entity list per region.
pub struct TestWorld {
    regions: Mutex<HashMap<RegionId, Vec<EntityRecord>>>,
    fail_next: AtomicBool,
    panic_next: Mutex<Option<RegionId>>,
    block_next: AtomicBool,
    started: (Sender<()>, Receiver<()>),
    release: (Sender<()>, Receiver<()>),
    captures: AtomicU64,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            regions: Mutex::new(HashMap::new()),
            fail_next: AtomicBool::new(false),
            panic_next: Mutex::new(None),
            block_next: AtomicBool::new(false),
            started: bounded(1),
            release: bounded(1),
            captures: AtomicU64::new(0),
        }
    }

    pub fn set(&self, region: RegionId, records: Vec<EntityRecord>) {
        self.regions.lock().insert(region, records);
    }

    pub fn move_entity(&self, region: RegionId, id: EntityId, to: Position) {
        if let Some(records) = self.regions.lock().get_mut(&region) {
            for record in records.iter_mut().filter(|r| r.id == id) {
                record.position = to;
            }
        }
    }

    pub fn remove_entity(&self, region: RegionId, id: EntityId) {
        if let Some(records) = self.regions.lock().get_mut(&region) {
            records.retain(|r| r.id != id);
        }
    }

    /// The next capture returns `SourceUnavailable`.
    pub fn fail_next_capture(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The next capture of `region` panics.
    pub fn panic_next_capture(&self, region: RegionId) {
        *self.panic_next.lock() = Some(region);
    }

    /// The next capture parks until [`TestWorld::release_capture`].
    pub fn block_next_capture(&self) {
        self.block_next.store(true, Ordering::SeqCst);
    }

    pub fn wait_capture_started(&self) {
        self.started.1.recv().unwrap();
    }

    pub fn release_capture(&self) {
        self.release.0.send(()).unwrap();
    }

    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }
}

impl EntitySource for TestWorld {
    fn capture(&self, region: RegionId, sink: &mut CaptureBuffer<'_>) -> Result<(), CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::unavailable(region, "simulated outage"));
        }
        let panics = {
            let mut next = self.panic_next.lock();
            let hit = *next == Some(region);
            if hit {
                *next = None;
            }
            hit
        };
        if panics {
            panic!("entity table for {region} is corrupt");
        }
        if self.block_next.swap(false, Ordering::SeqCst) {
            let _ = self.started.0.send(());
            let _ = self.release.1.recv();
        }
        let records = self.regions.lock().get(&region).cloned().unwrap_or_default();
        sink.extend(records)
    }
}

pub fn creature(id: u64, x: f32, y: f32) -> EntityRecord {
    EntityRecord::new(
        EntityId::new(id),
        EntityKind::Creature,
        Position::planar(x, y),
        Timestamp::ZERO,
    )
}

/// Builds run on the calling thread; results are deterministic.
pub fn inline_config() -> EngineConfig {
    EngineConfig {
        worker_threads: 0,
        build_timeout_ms: 5_000,
        ..EngineConfig::default()
    }
}
