//! Short soak runs against the simulated world.

use std::time::Duration;

use sightline_engine::EngineConfig;
use sightline_sim::{run_soak, SoakConfig, WorldConfig};

fn short(failure_every: u64) -> SoakConfig {
    SoakConfig {
        world: WorldConfig {
            regions: 3,
            entities_per_region: 300,
            arena: 256.0,
            ..WorldConfig::default()
        },
        engine: EngineConfig {
            refresh_interval_ms: 50,
            worker_threads: 2,
            build_timeout_ms: 1_000,
            ..EngineConfig::default()
        },
        readers: 4,
        duration: Duration::from_millis(600),
        step_ms: 10,
        tick: Duration::from_millis(5),
        query_radius: 32.0,
        failure_every,
    }
}

#[test]
fn test_soak_is_clean() {
    let report = run_soak(&short(0)).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert!(report.batches > 0);
    assert!(report.published >= 3);
    assert_eq!(report.generations.len(), 3);
    assert!(report.generations.iter().all(|g| !g.is_empty()));
}

#[test]
fn test_soak_survives_capture_failures() {
    let report = run_soak(&short(5)).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert!(report.skipped_cycles > 0);
    assert!(report.published > 0);
}
