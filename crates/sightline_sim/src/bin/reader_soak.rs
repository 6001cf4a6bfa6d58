//! # Reader Soak
//!
//! Runs M readers against a continuously rebuilding grid manager and prints
//! what they saw. Exits with status 1 if any reader observed a torn batch, a
//! regressing generation or an out-of-radius result.
//!
//! ```text
//! reader_soak [--readers N] [--seconds S] [--regions R] [--entities E]
//!             [--workers W] [--seed X] [--fail-every K]
//! ```

use std::process::ExitCode;
use std::time::Duration;

use sightline_sim::{run_soak, SoakConfig};

fn parse_args() -> Result<SoakConfig, String> {
    let mut config = SoakConfig::default();
    let mut args = std::env::args().skip(1);

    while let Some(flag) = args.next() {
        let value = args
            .next()
            .ok_or_else(|| format!("{flag} needs a value"))?;
        let number = |what: &str| -> Result<u64, String> {
            value
                .parse::<u64>()
                .map_err(|err| format!("{what}: {value:?} is not a number ({err})"))
        };
        match flag.as_str() {
            "--readers" => config.readers = usize::try_from(number("--readers")?).map_err(|e| e.to_string())?,
            "--seconds" => config.duration = Duration::from_secs(number("--seconds")?),
            "--regions" => config.world.regions = u32::try_from(number("--regions")?).map_err(|e| e.to_string())?,
            "--entities" => {
                config.world.entities_per_region =
                    u32::try_from(number("--entities")?).map_err(|e| e.to_string())?;
            }
            "--workers" => {
                config.engine.worker_threads =
                    usize::try_from(number("--workers")?).map_err(|e| e.to_string())?;
            }
            "--seed" => config.world.seed = number("--seed")?,
            "--fail-every" => config.failure_every = number("--fail-every")?,
            other => return Err(format!("unknown flag {other}")),
        }
    }
    Ok(config)
}

fn main() -> ExitCode {
    let config = match parse_args() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("reader_soak: {message}");
            return ExitCode::from(2);
        }
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                 SIGHTLINE - READER SOAK                          ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Readers:            {}", config.readers);
    println!("│ Duration:           {} s", config.duration.as_secs());
    println!("│ Regions:            {}", config.world.regions);
    println!("│ Entities / region:  {}", config.world.entities_per_region);
    println!("│ Build workers:      {}", config.engine.worker_threads);
    println!("│ Seed:               {:#x}", config.world.seed);
    println!("│ Failure injection:  every {} steps", config.failure_every);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let report = match run_soak(&config) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("reader_soak: {err}");
            return ExitCode::from(2);
        }
    };

    let secs = report.elapsed.as_secs_f64().max(f64::EPSILON);
    #[allow(clippy::cast_precision_loss)]
    let rate = report.batches as f64 / secs;

    println!("┌─ RESULTS ───────────────────────────────────────────────────────┐");
    println!("│ Elapsed:            {secs:.2} s");
    println!("│ World steps:        {}", report.steps);
    println!("│ Query batches:      {} ({rate:.0}/s)", report.batches);
    println!("│ No-data answers:    {}", report.no_data);
    println!("│ Published builds:   {}", report.published);
    println!("│ Skipped cycles:     {}", report.skipped_cycles);
    println!("│ Actions confirmed:  {}", report.actions_confirmed);
    println!("│ Actions rejected:   {}", report.actions_rejected);
    for (index, generation) in report.generations.iter().enumerate() {
        println!("│ Region {:<3}         {generation}", index + 1);
    }
    println!("│ Anomalies:          {}", report.anomalies);
    if report.is_clean() {
        println!("│ Status:             ✓ CLEAN");
    } else {
        println!("│ Status:             ✗ ANOMALIES DETECTED");
    }
    println!("└──────────────────────────────────────────────────────────────────┘");

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
