//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every key is optional.
//!
//! ```toml
//! cell_size = 32.0
//! refresh_interval_ms = 100
//! adaptive_refresh = true
//! min_interval_ms = 50
//! max_interval_ms = 1000
//! worker_threads = 2
//!
//! [[regions]]
//! id = 7
//! cell_size = 16.0
//! bounds = [-512.0, -512.0, 512.0, 512.0]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sightline_core::{Bounds, RegionId};

use crate::error::ConfigError;
use crate::validation::MotionBound;

/// Engine-wide settings with optional per-region overrides.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Cell edge in world units. Should sit near the typical query radius.
    pub cell_size: f32,
    /// Fixed refresh interval.
    pub refresh_interval_ms: u64,
    /// Scale the interval by entity density.
    pub adaptive_refresh: bool,
    /// Fastest adaptive interval.
    pub min_interval_ms: u64,
    /// Slowest adaptive interval, also the failure backoff cap.
    pub max_interval_ms: u64,
    /// Entity count at which a region refreshes at `min_interval_ms`.
    pub hot_entity_threshold: u32,
    /// Captures above this size log a warning.
    pub max_entities_per_region: u32,
    /// Capture deadline.
    pub build_timeout_ms: u64,
    /// How long unregistering waits for a running build.
    pub unregister_timeout_ms: u64,
    /// Build pool size. Zero runs builds on the ticking thread.
    pub worker_threads: usize,
    /// Pending build jobs before new ones are skipped.
    pub job_queue_capacity: usize,
    /// Consecutive skipped cycles before an operational alert.
    pub alert_after_skipped_cycles: u32,
    /// Fastest plausible entity movement, units per second.
    pub max_entity_speed: f32,
    /// Slack added to the movement allowance.
    pub position_tolerance: f32,
    /// Per-region overrides.
    pub regions: Vec<RegionOverride>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cell_size: 32.0,
            refresh_interval_ms: 100,
            adaptive_refresh: false,
            min_interval_ms: 50,
            max_interval_ms: 1_000,
            hot_entity_threshold: 500,
            max_entities_per_region: 5_000,
            build_timeout_ms: 50,
            unregister_timeout_ms: 250,
            worker_threads: 2,
            job_queue_capacity: 256,
            alert_after_skipped_cycles: 5,
            max_entity_speed: 12.0,
            position_tolerance: 1.0,
            regions: Vec::new(),
        }
    }
}

/// Settings for one region that differ from the engine defaults.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionOverride {
    /// Region the override applies to.
    pub id: u32,
    /// Cell edge for this region.
    #[serde(default)]
    pub cell_size: Option<f32>,
    /// Fixed refresh interval for this region.
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,
    /// Adaptive refresh for this region.
    #[serde(default)]
    pub adaptive_refresh: Option<bool>,
    /// Region extents `[min_x, min_y, max_x, max_y]`; captures outside are rejected.
    #[serde(default)]
    pub bounds: Option<[f32; 4]>,
}

/// Effective settings of one region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionOptions {
    /// Cell edge in world units.
    pub cell_size: f32,
    /// Fixed refresh interval.
    pub refresh_interval_ms: u64,
    /// Scale the interval by entity density.
    pub adaptive_refresh: bool,
    /// Region extents, if any.
    pub bounds: Option<Bounds>,
}

impl RegionOptions {
    /// Replaces the cell size.
    #[must_use]
    pub const fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Replaces the refresh interval.
    #[must_use]
    pub const fn with_refresh_interval_ms(mut self, interval_ms: u64) -> Self {
        self.refresh_interval_ms = interval_ms;
        self
    }

    /// Enables or disables adaptive refresh.
    #[must_use]
    pub const fn with_adaptive_refresh(mut self, adaptive: bool) -> Self {
        self.adaptive_refresh = adaptive;
        self
    }

    /// Sets the region extents.
    #[must_use]
    pub const fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML or unknown keys,
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks every value range.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_cell_size("cell_size", self.cell_size)?;
        if self.min_interval_ms == 0 {
            return invalid("min_interval_ms must be > 0");
        }
        if self.min_interval_ms > self.max_interval_ms {
            return invalid(format!(
                "min_interval_ms ({}) exceeds max_interval_ms ({})",
                self.min_interval_ms, self.max_interval_ms
            ));
        }
        self.check_interval("refresh_interval_ms", self.refresh_interval_ms)?;
        if self.job_queue_capacity == 0 {
            return invalid("job_queue_capacity must be > 0");
        }
        check_non_negative("max_entity_speed", self.max_entity_speed)?;
        check_non_negative("position_tolerance", self.position_tolerance)?;

        let mut seen = std::collections::HashSet::new();
        for region in &self.regions {
            if !seen.insert(region.id) {
                return invalid(format!("region {} is listed twice", region.id));
            }
            if let Some(size) = region.cell_size {
                check_cell_size(&format!("regions[{}].cell_size", region.id), size)?;
            }
            if let Some(interval) = region.refresh_interval_ms {
                self.check_interval(&format!("regions[{}].refresh_interval_ms", region.id), interval)?;
            }
            if let Some(bounds) = region.bounds {
                if !Bounds::from_array(bounds).is_finite() {
                    return invalid(format!("regions[{}].bounds must be finite", region.id));
                }
            }
        }
        Ok(())
    }

    /// Effective settings for `region`: the defaults merged with its override.
    #[must_use]
    pub fn region_options(&self, region: RegionId) -> RegionOptions {
        let base = RegionOptions {
            cell_size: self.cell_size,
            refresh_interval_ms: self.refresh_interval_ms,
            adaptive_refresh: self.adaptive_refresh,
            bounds: None,
        };
        let Some(over) = self.regions.iter().find(|r| r.id == region.raw()) else {
            return base;
        };
        RegionOptions {
            cell_size: over.cell_size.unwrap_or(base.cell_size),
            refresh_interval_ms: over.refresh_interval_ms.unwrap_or(base.refresh_interval_ms),
            adaptive_refresh: over.adaptive_refresh.unwrap_or(base.adaptive_refresh),
            bounds: over.bounds.map(Bounds::from_array),
        }
    }

    /// Movement bound used by snapshot validation.
    #[must_use]
    pub const fn motion_bound(&self) -> MotionBound {
        MotionBound {
            max_speed: self.max_entity_speed,
            tolerance: self.position_tolerance,
        }
    }

    /// Capture deadline.
    #[must_use]
    pub const fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    /// Quiescence wait bound for unregistering.
    #[must_use]
    pub const fn unregister_timeout(&self) -> Duration {
        Duration::from_millis(self.unregister_timeout_ms)
    }

    fn check_interval(&self, key: &str, interval: u64) -> Result<(), ConfigError> {
        if interval < self.min_interval_ms || interval > self.max_interval_ms {
            return invalid(format!(
                "{key} ({interval}) must lie within [{}, {}]",
                self.min_interval_ms, self.max_interval_ms
            ));
        }
        Ok(())
    }
}

fn check_cell_size(key: &str, size: f32) -> Result<(), ConfigError> {
    if size.is_finite() && size > 0.0 {
        Ok(())
    } else {
        invalid(format!("{key} must be finite and > 0, got {size}"))
    }
}

fn check_non_negative(key: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        invalid(format!("{key} must be finite and >= 0, got {value}"))
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}
